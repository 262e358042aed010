use gba_asm_types::SourcePos;
use thiserror::Error;

/// Expression lexing, parsing, and evaluation failures (spec §7 "Naming
/// errors" / parse errors pass through from this layer unchanged).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("{pos}: unexpected character {ch:?}")]
    UnexpectedChar { pos: SourcePos, ch: char },

    #[error("{pos}: unterminated string literal")]
    UnterminatedString { pos: SourcePos },

    #[error("{pos}: unexpected end of expression")]
    UnexpectedEof { pos: SourcePos },

    #[error("{pos}: expected {expected}, found {found:?}")]
    UnexpectedToken {
        pos: SourcePos,
        expected: &'static str,
        found: String,
    },

    #[error("{pos}: division by zero")]
    DivisionByZero { pos: SourcePos },

    #[error("{pos}: undefined symbol {path:?}")]
    NotFound { pos: SourcePos, path: String },
}
