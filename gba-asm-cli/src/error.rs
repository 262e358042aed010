use gba_asm_core::CoreError;
use gba_asm_expr::ExprError;
use gba_asm_isa::EncodeError;
use gba_asm_types::SourcePos;
use thiserror::Error;

/// Errors raised by the lexer/parser layer itself (spec §3 "External
/// collaborators": lexical and parse errors belong to the caller, not to
/// `gba-asm-core`). Every variant carries the position it was raised at so
/// [`CliError::pos`] never has to guess, and so a `?` on a
/// [`gba_asm_core::SourceParser::parse`] call surfaces one consistent
/// position regardless of which layer actually failed.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{pos}: unexpected character {ch:?}")]
    UnexpectedChar { pos: SourcePos, ch: char },

    #[error("{pos}: unexpected end of line")]
    UnexpectedEol { pos: SourcePos },

    #[error("{pos}: expected {expected}, found {found:?}")]
    Unexpected {
        pos: SourcePos,
        expected: &'static str,
        found: String,
    },

    #[error("{pos}: unknown directive '.{name}'")]
    UnknownDirective { pos: SourcePos, name: String },

    #[error("{pos}: unknown mnemonic '{name}'")]
    UnknownMnemonic { pos: SourcePos, name: String },

    #[error("{pos}: '{name}' is not a register")]
    NotARegister { pos: SourcePos, name: String },

    #[error("{pos}: no operand form of '{mnemonic}' matches these operands")]
    NoMatchingForm { pos: SourcePos, mnemonic: String },

    #[error("{pos}: unknown struct '{name}'")]
    UnknownStruct { pos: SourcePos, name: String },

    #[error("{pos}: unknown member '{member}' of struct '{name}'")]
    UnknownMember {
        pos: SourcePos,
        name: String,
        member: String,
    },

    #[error("{pos}: unterminated string literal")]
    UnterminatedString { pos: SourcePos },

    #[error("{pos}: {source}")]
    Expr {
        pos: SourcePos,
        #[source]
        source: ExprError,
    },

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{pos}: {source}")]
    Encode {
        pos: SourcePos,
        #[source]
        source: EncodeError,
    },

    #[error("{pos}: failed to read '{path}': {source}")]
    Io {
        pos: SourcePos,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{pos}: '{path}' could not be found in any include directory")]
    NotFound { pos: SourcePos, path: String },
}

impl CliError {
    /// The position to blame for this error, used by [`From<CliError> for
    /// CoreError`] so the core's build log always points somewhere in source.
    pub fn pos(&self) -> SourcePos {
        match self {
            CliError::UnexpectedChar { pos, .. }
            | CliError::UnexpectedEol { pos }
            | CliError::Unexpected { pos, .. }
            | CliError::UnknownDirective { pos, .. }
            | CliError::UnknownMnemonic { pos, .. }
            | CliError::NotARegister { pos, .. }
            | CliError::NoMatchingForm { pos, .. }
            | CliError::UnknownStruct { pos, .. }
            | CliError::UnknownMember { pos, .. }
            | CliError::UnterminatedString { pos }
            | CliError::Expr { pos, .. }
            | CliError::Encode { pos, .. }
            | CliError::Io { pos, .. }
            | CliError::NotFound { pos, .. } => pos.clone(),
            CliError::Core(CoreError::Redefinition { pos, .. })
            | CliError::Core(CoreError::ReservedWord { pos, .. })
            | CliError::Core(CoreError::RegisterNameCollision { pos, .. })
            | CliError::Core(CoreError::ReservedUnderscorePrefix { pos, .. })
            | CliError::Core(CoreError::Misaligned { pos, .. })
            | CliError::Core(CoreError::StructArrayMisaligned { pos, .. })
            | CliError::Core(CoreError::MemoryExhausted { pos, .. })
            | CliError::Core(CoreError::Encode { pos, .. })
            | CliError::Core(CoreError::PoolTooFar { pos, .. })
            | CliError::Core(CoreError::Expr { pos, .. })
            | CliError::Core(CoreError::UnresolvedInFinalPass { pos })
            | CliError::Core(CoreError::Io { pos, .. })
            | CliError::Core(CoreError::StructMemberNotFound { pos, .. })
            | CliError::Core(CoreError::AssertionFailed { pos, .. })
            | CliError::Core(CoreError::Parse { pos, .. }) => pos.clone(),
            CliError::Core(CoreError::CrcUnavailable) => SourcePos::synthetic("crc"),
            CliError::Core(CoreError::CircularInclude { .. }) => SourcePos::synthetic("include"),
        }
    }
}

/// Every [`CliError`] becomes a [`CoreError::Parse`] when it crosses back
/// into the core, except one already wrapping a [`CoreError`] — that one
/// passes through unchanged so the original variant (and its `source` chain)
/// survives.
impl From<CliError> for CoreError {
    fn from(err: CliError) -> CoreError {
        match err {
            CliError::Core(core_err) => core_err,
            other => {
                let pos = other.pos();
                CoreError::Parse {
                    pos,
                    message: other.to_string(),
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
