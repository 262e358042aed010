//! Atomic types shared by every `gba-asm` crate.
//!
//! Kept deliberately small, the way the teacher's own primitives crate is:
//! numeric newtypes, a source position, and the leaf `Error` type. Nothing
//! in here knows about sections, scopes, or the ISA.

mod error;
mod pos;
mod types;

pub use error::{Error, Result};
pub use pos::SourcePos;
pub use types::{Reg, Value, VirtAddr};
