use std::fmt;
use std::rc::Rc;

/// A position in a source file, carried alongside every error and every
/// deferred pending write so diagnostics can point back at the statement
/// that created them (spec §7, "Propagation").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourcePos {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<Rc<str>>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }

    /// A placeholder position for synthetic statements (e.g. `.stdlib`
    /// entries) that were never lexed from a real file.
    pub fn synthetic(label: &'static str) -> Self {
        Self {
            file: Rc::from(label),
            line: 0,
            col: 0,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}
