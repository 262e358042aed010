use thiserror::Error;

use crate::SourcePos;

/// Result alias used throughout the low-level crates.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can arise parsing or converting the atomic types in this
/// crate. Higher crates (`gba-asm-core`) define their own, larger error
/// enums that wrap this one where relevant.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{pos}: value {value} does not fit in {bits}-bit field")]
    Overflow {
        pos: SourcePos,
        value: i64,
        bits: u32,
    },

    #[error("{pos}: invalid numeric literal {text:?}")]
    InvalidLiteral { pos: SourcePos, text: String },
}
