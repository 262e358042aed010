use crate::ast::Mode;

/// One segment of a path after any `[index]` sub-expressions have been
/// evaluated down to plain integers.
#[derive(Debug, Clone)]
pub enum ResolvedSegment {
    Name(String),
    Index(i64),
}

/// A dotted identifier path ready for [`Context::lookup`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedPath(pub Vec<ResolvedSegment>);

/// Outcome of looking a name up in the enclosing scope chain (spec §4.7,
/// §6 "Unresolved" in the glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    /// The name resolved to a concrete value.
    Found(i64),
    /// The name is defined but its address/value is not yet known (a label
    /// whose section hasn't been flattened, for instance).
    Unresolved,
    /// No definition of this name exists in any enclosing scope.
    NotFound,
}

/// The scope-aware lookup surface `gba-asm-core` hands to every expression
/// evaluation, snapshotted at the moment the owning pending write was
/// queued (spec §6 "Expression-layer contract").
///
/// Implemented by `gba-asm-core`'s scope chain; this crate only depends on
/// the trait, never on the concrete section/import types, to keep the
/// expression grammar free of layout concerns.
pub trait Context {
    /// Resolves a dotted path against the scope chain, `importAll`/
    /// `importName` forwarding, and struct member lookup.
    fn lookup(&self, path: &ResolvedPath) -> LookupResult;

    /// `-name`, `--name`, … — the `count`-th nearest preceding label named
    /// `name` in the same or an enclosing scope.
    fn reverse_label(&self, name: &str, count: u32) -> LookupResult;

    /// `+name`, `++name`, … — the `count`-th next label named `name`.
    /// `use_id` is stable per source occurrence so repeated evaluations of
    /// the same reference keep resolving to the same forward target.
    fn forward_label(&self, name: &str, count: u32, use_id: u64) -> LookupResult;

    /// The address of the statement the expression was captured from.
    fn current_addr(&self) -> LookupResult;

    /// The CPU mode active at the statement, if any.
    fn mode(&self) -> Option<Mode>;
}
