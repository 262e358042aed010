//! Declarative instruction tables (spec §4.2, "Instructions are data: a
//! mnemonic maps to an ordered list of code-parts").
//!
//! This is a representative cross-section, not an exhaustive opcode map —
//! enough ARM and Thumb forms to exercise every [`crate::codepart::PartKind`]
//! variant and to drive the worked examples in spec §8. A full assembler
//! would grow this table; the shape (plain functions returning
//! `Vec<CodePart>`, parameterized by the fixed bits a mnemonic/condition/size
//! suffix already pins down) is what extends.

pub mod arm;
pub mod thumb;
