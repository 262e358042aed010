//! Assembly-time expression language: lexing, recursive-descent parsing, and
//! scope-aware evaluation against an injected [`Context`].
//!
//! `gba-asm-core` owns the actual scope chain; this crate only defines the
//! contract it evaluates against, so the expression grammar has no
//! dependency on section/import machinery.

mod ast;
mod context;
mod error;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, Mode, Path, PathSegment, UnaryOp};
pub use context::{Context, LookupResult, ResolvedPath, ResolvedSegment};
pub use error::ExprError;
pub use eval::{value, ExprValue};
pub use parser::parse;
