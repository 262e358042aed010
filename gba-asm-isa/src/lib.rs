//! ARM7TDMI + Thumb instruction encoding.
//!
//! This crate is a pure function from (operation descriptor, resolved
//! operand values, instruction address) to a fixed-width opcode word
//! (spec §4.1-§4.3). It knows nothing about symbols, scopes, or sections:
//! `gba-asm-core` resolves every expression an instruction references
//! before calling in here, so the only "not ready" this crate can report is
//! "the instruction's own address isn't known yet".

mod bitvec;
mod codepart;
mod encode;
mod error;
pub mod tables;
mod typed_mem;

pub use bitvec::BitFieldEncoder;
pub use codepart::{CodePart, Isa, Operands, PartKind};
pub use encode::{encode, EncodeOutcome};
pub use error::EncodeError;
pub use typed_mem::{resolve_typed_mem, DataType, MemKind, TypedMemOp};
