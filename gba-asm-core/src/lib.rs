//! Code-generation engine: sections, pending writes, literal pools, scopes,
//! and multi-pass project orchestration.
//!
//! This crate has no lexer or parser of its own (spec §3 "External
//! collaborators") — it exposes [`Import`] as the surface a parser drives
//! one directive at a time, and [`Project`] as the driver that discovers,
//! caches, and runs the multi-pass build (spec §4.9/§4.10) across every file
//! an assembly reaches transitively.

mod addr;
mod error;
mod import;
mod logger;
mod pending;
mod pool;
mod project;
mod rewrite;
mod scope;
mod section;
mod struct_layout;

pub use addr::{BaseFrame, BaseStack};
pub use error::{CoreError, Result};
pub use import::Import;
pub use logger::{Logger, TracingLogger};
pub use pending::{Operand, OperandSet, PendingKind, PendingWrite, PendingWriteId};
pub use pool::PoolLoad;
pub use project::{BuildOutput, Project, ProjectIo, SourceParser};
pub use rewrite::RewriteHandle;
pub use scope::{Def, ImportResolver, ScopeChain};
pub use section::{AlignFill, BytesSection, MemoryRegion, PoolEntry, PoolSection, Section};
pub use struct_layout::{StructLayout, StructMember};
