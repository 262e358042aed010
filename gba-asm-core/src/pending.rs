use std::collections::HashMap;
use std::rc::Rc;

use gba_asm_expr::Context as ExprContext;
use gba_asm_isa::{encode, CodePart, EncodeOutcome, Isa, Operands};
use gba_asm_types::{Reg, SourcePos, Value};

use crate::error::{CoreError, Result};
use crate::logger::Logger;
use crate::rewrite::RewriteHandle;
use crate::scope::{PendingContext, ScopeChain};
use crate::section::Section;

/// Stable id for one entry in an Import's pending-write list (spec §9
/// "Cyclic references ... stable handles, not ... ownership cycles"). A
/// `Pool` section captures pool-load writes by id rather than by index, so
/// the list can grow and shrink without invalidating a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingWriteId(pub u64);

/// One deferred operand: an unresolved expression, or the number it was
/// memoised to once resolved (spec §4.4 "Caching policy": "an expression
/// that resolves to a number replaces the expression in the pending
/// write").
#[derive(Debug, Clone)]
pub enum Operand {
    Expr(gba_asm_expr::Expr),
    Value(Value),
}

impl Operand {
    pub fn expr(expr: gba_asm_expr::Expr) -> Self {
        Operand::Expr(expr)
    }

    pub fn number(value: Value) -> Self {
        Operand::Value(value)
    }

    pub fn resolved(&self) -> Option<Value> {
        match self {
            Operand::Value(v) => Some(*v),
            Operand::Expr(_) => None,
        }
    }

    /// Resolves against `ctx`, latching the result in place on success
    /// (spec §4.4). `Ok(None)` means "still unresolved, try again later".
    pub fn resolve(
        &mut self,
        ctx: &dyn ExprContext,
        fail_if_not_found: bool,
        pos: &SourcePos,
    ) -> Result<Option<Value>> {
        if let Operand::Value(v) = self {
            return Ok(Some(*v));
        }
        let Operand::Expr(expr) = self else {
            unreachable!()
        };
        match gba_asm_expr::value(expr, ctx, fail_if_not_found, pos)
            .map_err(|source| CoreError::Expr { pos: pos.clone(), source })?
        {
            gba_asm_expr::ExprValue::Resolved(n) => {
                *self = Operand::Value(n);
                Ok(Some(n))
            }
            gba_asm_expr::ExprValue::Unresolved => Ok(None),
        }
    }
}

/// Named operands for one instruction-shaped pending write (spec §4.2
/// "Input": "a mapping from operand symbol to integer value"), each
/// resolved and memoised independently.
#[derive(Debug, Clone, Default)]
pub struct OperandSet(pub HashMap<&'static str, Operand>);

impl OperandSet {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn set(&mut self, name: &'static str, operand: Operand) -> &mut Self {
        self.0.insert(name, operand);
        self
    }
}

/// Spec §2's pending-write kinds. ARM and Thumb instruction/pool-load pairs
/// are collapsed into one variant each, carrying an [`Isa`] tag — see
/// `DESIGN.md`'s "Pending-write ISA variants" note; resolution for either
/// ISA already dispatches to the same [`gba_asm_isa::encode`] entry point
/// with a different code-part table selected by the caller.
#[derive(Debug, Clone)]
pub enum PendingKind {
    /// An ARM/Thumb instruction, or a typed load/store already lowered to
    /// its concrete code-parts by the directive that queued it (spec §4.3:
    /// the struct-member offset the typed form needs is a compile-time
    /// constant, so it is folded into `operands` before queueing rather
    /// than re-resolved here).
    Instruction {
        isa: Isa,
        parts: Rc<Vec<CodePart>>,
        operands: OperandSet,
        rewrite: RewriteHandle,
    },
    /// `.i8`/`.i16`/`.i32`/`.str` (`writeData`): one little-endian value of
    /// `width` bytes.
    DataLiteral {
        value: Operand,
        width: u32,
        rewrite: RewriteHandle,
    },
    /// `writeDataFill(type, count, fill)`: one resolved fill value
    /// replicated `count` times.
    DataFill {
        fill: Operand,
        width: u32,
        count: usize,
        rewrite: RewriteHandle,
    },
    /// `.printf`.
    Printf {
        fmt: String,
        args: Vec<Operand>,
        as_error: bool,
    },
    /// `.debugLog`, gated by `Import::debug_log_disabled` (`.debugExit`)
    /// rather than by anything in this variant.
    DebugLog { fmt: String, args: Vec<Operand> },
    /// `.assert msg, expr` — fatal if `expr` resolves to zero.
    Assert { msg: String, expr: Operand },
    /// `ldr rd, =value` (spec §4.5). Resolution of the *instruction* word
    /// happens once, inside the owning `Pool` section's `flatten` (the
    /// pool address and the instruction's own address are both available
    /// then); the generic retry loop only memoises `target` early and,
    /// once `captured`, skips the write entirely (spec §3 "Ownership":
    /// "the Import still owns them for lifecycle purposes but does not
    /// resolve them").
    PoolLoad {
        isa: Isa,
        width: u32,
        signed: bool,
        reg: Reg,
        /// ARM condition-code nibble (`0b1110` for the always-suffix);
        /// ignored for Thumb, whose pool-load format carries no condition
        /// field.
        cond: u32,
        target: Operand,
        rewrite: RewriteHandle,
        captured: bool,
    },
}

/// One deferred encoding or diagnostic task (spec §3 "PendingWrite", §4.4
/// "Pending-write engine").
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub id: PendingWriteId,
    pub pos: SourcePos,
    /// The scope chain as it existed when this statement was parsed (spec
    /// §9 "Scope-snapshot for deferred resolution") — a cheap `Rc` clone,
    /// not a deep copy.
    pub scope: Rc<ScopeChain>,
    pub kind: PendingKind,
}

impl PendingWrite {
    /// Spec §4.4 "Contract": `Ok(true)` once fully applied, `Ok(false)` if
    /// still missing an input (only possible when `fail_if_not_found` is
    /// `false`) and a fatal [`CoreError`] if it can never succeed.
    pub fn attempt_write(
        &mut self,
        sections: &mut [Section],
        logger: &dyn Logger,
        fail_if_not_found: bool,
    ) -> Result<bool> {
        let own_addr = match &self.kind {
            PendingKind::Instruction { rewrite, .. }
            | PendingKind::DataLiteral { rewrite, .. }
            | PendingKind::DataFill { rewrite, .. }
            | PendingKind::PoolLoad { rewrite, .. } => rewrite.addr(sections),
            PendingKind::Printf { .. } | PendingKind::DebugLog { .. } | PendingKind::Assert { .. } => None,
        };
        let ctx = PendingContext {
            scope: &self.scope,
            own_addr,
        };
        let pos = self.pos.clone();

        match &mut self.kind {
            PendingKind::Instruction { isa, parts, operands, rewrite } => {
                attempt_instruction(*isa, parts, operands, rewrite, own_addr, &ctx, sections, fail_if_not_found, &pos)
            }
            PendingKind::DataLiteral { value, width, rewrite } => {
                match value.resolve(&ctx, fail_if_not_found, &pos)? {
                    Some(n) => {
                        rewrite.write(sections, &n.to_le_bytes()[..*width as usize]);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            PendingKind::DataFill { fill, width, count, rewrite } => {
                match fill.resolve(&ctx, fail_if_not_found, &pos)? {
                    Some(n) => {
                        let w = *width as usize;
                        let le = n.to_le_bytes();
                        let mut buf = Vec::with_capacity(w * *count);
                        for _ in 0..*count {
                            buf.extend_from_slice(&le[..w]);
                        }
                        rewrite.write(sections, &buf);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            PendingKind::Printf { fmt, args, as_error } => {
                attempt_diagnostic(fmt, args, &ctx, fail_if_not_found, &pos)?
                    .map(|msg| logger.log(&msg, *as_error))
                    .map_or(Ok(false), |()| Ok(true))
            }
            PendingKind::DebugLog { fmt, args } => attempt_diagnostic(fmt, args, &ctx, fail_if_not_found, &pos)?
                .map(|msg| logger.log(&msg, false))
                .map_or(Ok(false), |()| Ok(true)),
            PendingKind::Assert { msg, expr } => match expr.resolve(&ctx, fail_if_not_found, &pos)? {
                Some(0) => Err(CoreError::AssertionFailed {
                    pos,
                    message: msg.clone(),
                }),
                Some(_) => Ok(true),
                None => Ok(false),
            },
            // Only the owning Pool section's flatten resolves these (see
            // the variant's doc comment); the generic loop just memoises
            // the constant so it's ready by the time that happens.
            PendingKind::PoolLoad { captured, target, .. } => {
                if *captured {
                    return Ok(false);
                }
                target.resolve(&ctx, fail_if_not_found, &pos)?;
                if fail_if_not_found {
                    Err(CoreError::UnresolvedInFinalPass { pos })
                } else {
                    Ok(false)
                }
            }
        }
    }
}

fn attempt_instruction(
    isa: Isa,
    parts: &[CodePart],
    operands: &mut OperandSet,
    rewrite: &mut RewriteHandle,
    own_addr: Option<gba_asm_types::VirtAddr>,
    ctx: &PendingContext<'_>,
    sections: &mut [Section],
    fail_if_not_found: bool,
    pos: &SourcePos,
) -> Result<bool> {
    let mut all_resolved = true;
    for operand in operands.0.values_mut() {
        if operand.resolve(ctx, fail_if_not_found, pos)?.is_none() {
            all_resolved = false;
        }
    }
    if !all_resolved {
        return Ok(false);
    }
    let mut built = Operands::new();
    for (name, operand) in operands.0.iter() {
        if let Some(v) = operand.resolved() {
            built.set(name, v);
        }
    }
    match encode(isa, parts, &built, own_addr).map_err(|source| CoreError::Encode { pos: pos.clone(), source })? {
        EncodeOutcome::Word(w) => {
            let bytes = match rewrite.width {
                2 => (w as u16).to_le_bytes().to_vec(),
                4 => w.to_le_bytes().to_vec(),
                other => unreachable!("instruction rewrite width must be 2 or 4, was {other}"),
            };
            rewrite.write(sections, &bytes);
            Ok(true)
        }
        EncodeOutcome::NotReady => {
            if fail_if_not_found {
                Err(CoreError::UnresolvedInFinalPass { pos: pos.clone() })
            } else {
                Ok(false)
            }
        }
    }
}

/// Shared by `.printf`/`.debugLog`: resolves every argument, and only then
/// renders the format string. `Ok(None)` means "still waiting on an
/// argument".
fn attempt_diagnostic(
    fmt: &str,
    args: &mut [Operand],
    ctx: &PendingContext<'_>,
    fail_if_not_found: bool,
    pos: &SourcePos,
) -> Result<Option<String>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args.iter_mut() {
        match arg.resolve(ctx, fail_if_not_found, pos)? {
            Some(v) => values.push(v),
            None => return Ok(None),
        }
    }
    Ok(Some(render_format(fmt, &values)))
}

/// Minimal `{}`-placeholder substitution — `.printf`/`.debugLog` format
/// strings are plain text with positional `{}` slots, not a full `format!`
/// grammar.
fn render_format(fmt: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut values = values.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'}') {
            chars.next();
            match values.next() {
                Some(v) => out.push_str(&v.to_string()),
                None => out.push_str("{}"),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::BytesSection;
    use gba_asm_types::VirtAddr;

    struct NullLogger;
    impl Logger for NullLogger {
        fn log(&self, _message: &str, _as_error: bool) {}
    }

    fn flattened_bytes_section(width: usize) -> Vec<Section> {
        let mut bytes = BytesSection::default();
        bytes.reserve(width);
        bytes.flatten(crate::addr::BaseFrame::rom_default(), 0);
        vec![Section::Bytes(bytes)]
    }

    #[test]
    fn data_literal_writes_once_resolved() {
        let mut sections = flattened_bytes_section(4);
        let rewrite = RewriteHandle::new(0, 0, 4);
        let mut write = PendingWrite {
            id: PendingWriteId(0),
            pos: SourcePos::synthetic("t"),
            scope: ScopeChain::new(),
            kind: PendingKind::DataLiteral {
                value: Operand::number(0x1234_5678),
                width: 4,
                rewrite,
            },
        };
        let done = write.attempt_write(&mut sections, &NullLogger, false).unwrap();
        assert!(done);
        let Section::Bytes(b) = &sections[0] else { unreachable!() };
        assert_eq!(b.buf, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn render_format_substitutes_positional_placeholders() {
        assert_eq!(render_format("r0={} r1={}", &[1, 2]), "r0=1 r1=2");
    }

    #[test]
    fn assert_false_is_a_fatal_error() {
        let mut sections: Vec<Section> = vec![];
        let mut write = PendingWrite {
            id: PendingWriteId(0),
            pos: SourcePos::synthetic("t"),
            scope: ScopeChain::new(),
            kind: PendingKind::Assert {
                msg: "oops".to_string(),
                expr: Operand::number(0),
            },
        };
        assert!(matches!(
            write.attempt_write(&mut sections, &NullLogger, false),
            Err(CoreError::AssertionFailed { .. })
        ));
    }

    #[test]
    fn uncaptured_poolload_is_unresolved_in_final_pass() {
        let mut sections = flattened_bytes_section(4);
        let rewrite = RewriteHandle::new(0, 0, 4);
        let mut write = PendingWrite {
            id: PendingWriteId(0),
            pos: SourcePos::synthetic("t"),
            scope: ScopeChain::new(),
            kind: PendingKind::PoolLoad {
                isa: Isa::Arm,
                width: 4,
                signed: false,
                reg: Reg(0),
                cond: 0b1110,
                target: Operand::number(0x1234),
                rewrite,
                captured: false,
            },
        };
        assert!(matches!(
            write.attempt_write(&mut sections, &NullLogger, true),
            Err(CoreError::UnresolvedInFinalPass { .. })
        ));
        let _ = VirtAddr::new(0);
    }
}
