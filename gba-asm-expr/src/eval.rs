use gba_asm_types::SourcePos;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::context::{Context, LookupResult, ResolvedPath, ResolvedSegment};
use crate::error::ExprError;

/// Outcome of evaluating an expression (spec §6: "returns either a number
/// or the unresolved sentinel").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprValue {
    Resolved(i64),
    Unresolved,
}

impl ExprValue {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ExprValue::Resolved(_))
    }
}

/// Evaluates `expr` against `ctx` (spec §6 `expr.value(context,
/// failIfNotFound, ...)`).
///
/// `fail_if_not_found` mirrors the pending-write contract (spec §4.4): when
/// `false`, a symbol whose address is not yet known yields
/// `Ok(ExprValue::Unresolved)` so the caller can retry later; when `true`,
/// the same situation is a fatal [`ExprError::NotFound`] (the terminal
/// pass). A symbol that plain doesn't exist in any scope is always fatal,
/// regardless of pass — that's a naming error, not an ordering one.
pub fn value(
    expr: &Expr,
    ctx: &dyn Context,
    fail_if_not_found: bool,
    pos: &SourcePos,
) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Number(n) => Ok(ExprValue::Resolved(*n)),

        Expr::CurrentAddr => from_lookup(ctx.current_addr(), fail_if_not_found, pos, "$"),

        Expr::RelativeLabel {
            name,
            forward,
            count,
            use_id,
        } => {
            let result = if *forward {
                ctx.forward_label(name, *count, *use_id)
            } else {
                ctx.reverse_label(name, *count)
            };
            from_lookup(result, fail_if_not_found, pos, name)
        }

        Expr::Ident(path) => {
            let mut resolved = Vec::with_capacity(path.0.len());
            for segment in &path.0 {
                match segment {
                    crate::ast::PathSegment::Name(name) => {
                        resolved.push(ResolvedSegment::Name(name.clone()));
                    }
                    crate::ast::PathSegment::Index(index_expr) => {
                        match value(index_expr, ctx, fail_if_not_found, pos)? {
                            ExprValue::Resolved(i) => resolved.push(ResolvedSegment::Index(i)),
                            ExprValue::Unresolved => return Ok(ExprValue::Unresolved),
                        }
                    }
                }
            }
            let result = ctx.lookup(&ResolvedPath(resolved));
            from_lookup(result, fail_if_not_found, pos, &path_display(path))
        }

        Expr::Unary(op, inner) => {
            let v = value(inner, ctx, fail_if_not_found, pos)?;
            let ExprValue::Resolved(n) = v else {
                return Ok(ExprValue::Unresolved);
            };
            let result = match op {
                UnaryOp::Neg => n.wrapping_neg(),
                UnaryOp::Not => (n == 0) as i64,
                UnaryOp::BitNot => !n,
            };
            Ok(ExprValue::Resolved(result))
        }

        Expr::Binary(BinaryOp::LogAnd, lhs, rhs) => {
            match value(lhs, ctx, fail_if_not_found, pos)? {
                ExprValue::Resolved(0) => Ok(ExprValue::Resolved(0)),
                ExprValue::Resolved(_) => match value(rhs, ctx, fail_if_not_found, pos)? {
                    ExprValue::Resolved(n) => Ok(ExprValue::Resolved((n != 0) as i64)),
                    ExprValue::Unresolved => Ok(ExprValue::Unresolved),
                },
                ExprValue::Unresolved => Ok(ExprValue::Unresolved),
            }
        }

        Expr::Binary(BinaryOp::LogOr, lhs, rhs) => {
            match value(lhs, ctx, fail_if_not_found, pos)? {
                ExprValue::Resolved(n) if n != 0 => Ok(ExprValue::Resolved(1)),
                ExprValue::Resolved(_) => match value(rhs, ctx, fail_if_not_found, pos)? {
                    ExprValue::Resolved(n) => Ok(ExprValue::Resolved((n != 0) as i64)),
                    ExprValue::Unresolved => Ok(ExprValue::Unresolved),
                },
                ExprValue::Unresolved => Ok(ExprValue::Unresolved),
            }
        }

        Expr::Binary(op, lhs, rhs) => {
            let l = value(lhs, ctx, fail_if_not_found, pos)?;
            let r = value(rhs, ctx, fail_if_not_found, pos)?;
            let (ExprValue::Resolved(a), ExprValue::Resolved(b)) = (l, r) else {
                return Ok(ExprValue::Unresolved);
            };
            eval_binary(*op, a, b, pos).map(ExprValue::Resolved)
        }

        Expr::Ternary(cond, t, f) => match value(cond, ctx, fail_if_not_found, pos)? {
            ExprValue::Resolved(0) => value(f, ctx, fail_if_not_found, pos),
            ExprValue::Resolved(_) => value(t, ctx, fail_if_not_found, pos),
            ExprValue::Unresolved => Ok(ExprValue::Unresolved),
        },
    }
}

fn from_lookup(
    result: LookupResult,
    fail_if_not_found: bool,
    pos: &SourcePos,
    name: &str,
) -> Result<ExprValue, ExprError> {
    match result {
        LookupResult::Found(v) => Ok(ExprValue::Resolved(v)),
        LookupResult::Unresolved if fail_if_not_found => Err(ExprError::NotFound {
            pos: pos.clone(),
            path: name.to_string(),
        }),
        LookupResult::Unresolved => Ok(ExprValue::Unresolved),
        LookupResult::NotFound => Err(ExprError::NotFound {
            pos: pos.clone(),
            path: name.to_string(),
        }),
    }
}

fn eval_binary(op: BinaryOp, a: i64, b: i64, pos: &SourcePos) -> Result<i64, ExprError> {
    use BinaryOp::*;
    Ok(match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        Div => {
            if b == 0 {
                return Err(ExprError::DivisionByZero { pos: pos.clone() });
            }
            a.wrapping_div(b)
        }
        Mod => {
            if b == 0 {
                return Err(ExprError::DivisionByZero { pos: pos.clone() });
            }
            a.wrapping_rem(b)
        }
        Shl => a.wrapping_shl(b as u32),
        Shr => a.wrapping_shr(b as u32),
        BitAnd => a & b,
        BitOr => a | b,
        BitXor => a ^ b,
        Eq => (a == b) as i64,
        Ne => (a != b) as i64,
        Lt => (a < b) as i64,
        Le => (a <= b) as i64,
        Gt => (a > b) as i64,
        Ge => (a >= b) as i64,
        LogAnd | LogOr => unreachable!("short-circuited above"),
    })
}

fn path_display(path: &crate::ast::Path) -> String {
    use crate::ast::PathSegment;
    path.0
        .iter()
        .map(|s| match s {
            PathSegment::Name(n) => n.clone(),
            PathSegment::Index(_) => "[..]".to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    struct FakeContext {
        vars: std::collections::HashMap<&'static str, LookupResult>,
    }

    impl Context for FakeContext {
        fn lookup(&self, path: &ResolvedPath) -> LookupResult {
            let ResolvedSegment::Name(name) = &path.0[0] else {
                return LookupResult::NotFound;
            };
            self.vars.get(name.as_str()).copied().unwrap_or(LookupResult::NotFound)
        }
        fn reverse_label(&self, _name: &str, _count: u32) -> LookupResult {
            LookupResult::NotFound
        }
        fn forward_label(&self, _name: &str, _count: u32, _use_id: u64) -> LookupResult {
            LookupResult::NotFound
        }
        fn current_addr(&self) -> LookupResult {
            LookupResult::Found(0x0800_0000)
        }
        fn mode(&self) -> Option<crate::ast::Mode> {
            None
        }
    }

    fn pos() -> SourcePos {
        SourcePos::synthetic("test")
    }

    #[test]
    fn arithmetic_with_precedence_evaluates_correctly() {
        let expr = parse("1 + 2 * 3", "t", 1, 0).unwrap();
        let ctx = FakeContext { vars: Default::default() };
        assert_eq!(value(&expr, &ctx, true, &pos()).unwrap(), ExprValue::Resolved(7));
    }

    #[test]
    fn unresolved_symbol_short_circuits_in_early_pass() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("label", LookupResult::Unresolved);
        let expr = parse("label + 1", "t", 1, 0).unwrap();
        let ctx = FakeContext { vars };
        assert_eq!(value(&expr, &ctx, false, &pos()).unwrap(), ExprValue::Unresolved);
    }

    #[test]
    fn unresolved_symbol_is_fatal_in_final_pass() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("label", LookupResult::Unresolved);
        let expr = parse("label + 1", "t", 1, 0).unwrap();
        let ctx = FakeContext { vars };
        assert!(value(&expr, &ctx, true, &pos()).is_err());
    }

    #[test]
    fn undefined_symbol_is_always_fatal() {
        let expr = parse("nope", "t", 1, 0).unwrap();
        let ctx = FakeContext { vars: Default::default() };
        assert!(value(&expr, &ctx, false, &pos()).is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let expr = parse("1 / 0", "t", 1, 0).unwrap();
        let ctx = FakeContext { vars: Default::default() };
        assert!(matches!(
            value(&expr, &ctx, true, &pos()),
            Err(ExprError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn ternary_short_circuits_unresolved_branch() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("unresolved_branch", LookupResult::Unresolved);
        let expr = parse("1 ? 5 : unresolved_branch", "t", 1, 0).unwrap();
        let ctx = FakeContext { vars };
        assert_eq!(value(&expr, &ctx, true, &pos()).unwrap(), ExprValue::Resolved(5));
    }
}
