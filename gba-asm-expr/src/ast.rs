//! Expression AST (spec §6 "Expression-layer contract").

/// CPU mode a [`Context`](crate::Context) reports for the statement an
/// expression was captured from; `None` for directives with no ambient mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Arm,
    Thumb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One segment of a dotted identifier path: `foo.bar[2].baz`.
#[derive(Debug, Clone)]
pub enum PathSegment {
    Name(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Default)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![PathSegment::Name(name.into())])
    }
}

/// A parsed assembly-time expression, ready for [`crate::value`].
#[derive(Debug, Clone)]
pub enum Expr {
    Number(i64),
    Ident(Path),
    /// `-name`/`--name` (`forward = false`) or `+name`/`++name`
    /// (`forward = true`); `count` is the number of leading `-`/`+`
    /// characters. `use_id` distinguishes distinct source occurrences of the
    /// same forward reference so repeated lookups resolve to the same
    /// target label even if intervening labels share its name (spec §4.7).
    RelativeLabel {
        name: String,
        forward: bool,
        count: u32,
        use_id: u64,
    },
    /// The statement's own address (`$` in most gbadev dialects).
    CurrentAddr,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}
