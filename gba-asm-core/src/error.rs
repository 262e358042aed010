use gba_asm_expr::ExprError;
use gba_asm_isa::EncodeError;
use gba_asm_types::SourcePos;
use thiserror::Error;

/// The core's error taxonomy (spec §7). Lexical/parse errors are raised and
/// owned entirely by the external parser layer and never constructed here;
/// every other category in the spec's list has a variant below.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    // -- naming errors --------------------------------------------------
    #[error("{pos}: '{name}' is already defined in this scope")]
    Redefinition { pos: SourcePos, name: String },

    #[error("{pos}: '{name}' is a reserved word and cannot be redefined")]
    ReservedWord { pos: SourcePos, name: String },

    #[error("{pos}: '{name}' collides with a register alias")]
    RegisterNameCollision { pos: SourcePos, name: String },

    #[error("{pos}: names beginning with '_' followed by a lowercase letter are reserved")]
    ReservedUnderscorePrefix { pos: SourcePos, name: String },

    // -- layout errors ----------------------------------------------------
    #[error("{pos}: misaligned {what}: offset {offset} is not a multiple of {align}")]
    Misaligned {
        pos: SourcePos,
        what: &'static str,
        offset: i64,
        align: u32,
    },

    #[error("{pos}: struct array element size {element_size} misaligns against alignment {alignment} starting at base {base}")]
    StructArrayMisaligned {
        pos: SourcePos,
        base: i64,
        element_size: i64,
        alignment: u32,
    },

    #[error("{pos}: static memory exhausted: {requested} bytes requested, {available} available in {region}")]
    MemoryExhausted {
        pos: SourcePos,
        region: &'static str,
        requested: u32,
        available: u32,
    },

    // -- encoding errors --------------------------------------------------
    #[error("{pos}: {source}")]
    Encode {
        pos: SourcePos,
        #[source]
        source: EncodeError,
    },

    #[error("{pos}: pool load is too far from its instruction (offset {offset}, max {max})")]
    PoolTooFar { pos: SourcePos, offset: i64, max: i64 },

    #[error("CRC is not computable: a byte in range [0xa0, 0xbd) was never written")]
    CrcUnavailable,

    #[error("'{path}' includes/imports itself, directly or transitively")]
    CircularInclude { path: String },

    // -- resolution errors ------------------------------------------------
    #[error("{pos}: {source}")]
    Expr {
        pos: SourcePos,
        #[source]
        source: ExprError,
    },

    #[error("{pos}: pending write could not be resolved in the final pass")]
    UnresolvedInFinalPass { pos: SourcePos },

    // -- I/O errors ---------------------------------------------------------
    #[error("{pos}: failed to read '{path}': {message}")]
    Io {
        pos: SourcePos,
        path: String,
        message: String,
    },

    #[error("{pos}: member '{name}' not found in struct")]
    StructMemberNotFound { pos: SourcePos, name: String },

    #[error("{pos}: assertion failed: {message}")]
    AssertionFailed { pos: SourcePos, message: String },

    // -- external parser errors --------------------------------------------
    /// The seam through which the external lexer/parser (spec §3 "External
    /// collaborators") reports a lexical or syntax failure. The core never
    /// constructs this itself — it exists only so [`crate::project::SourceParser`]
    /// implementations have somewhere to put a parse error without the core
    /// needing an opinion on what a token or a grammar rule is.
    #[error("{pos}: {message}")]
    Parse { pos: SourcePos, message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
