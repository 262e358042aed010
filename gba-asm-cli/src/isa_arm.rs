//! ARM (32-bit) mnemonic dispatch: turns a statement's mnemonic + operand
//! text into one of `gba_asm_isa::tables::arm`'s code-part shapes plus a
//! resolved operand list, and queues it via `Import::write_inst`/
//! `write_pool`/`write_typed_mem`.
//!
//! Covers one mnemonic family per `tables::arm` function — a representative
//! cross-section, not the full ARM7TDMI set (see `tables::arm`'s own doc
//! comment).

use std::collections::HashMap;

use gba_asm_core::Import;
use gba_asm_expr::Expr;
use gba_asm_isa::{tables, CodePart, Isa};
use gba_asm_types::{Reg, SourcePos};

use crate::cond::Cond;
use crate::error::{CliError, Result};
use crate::expr_helper::ExprParser;
use crate::operand::{parse_reg, parse_reglist, split_top_level_commas};
use crate::regs;

fn num(v: i64) -> Expr {
    Expr::Number(v)
}

/// Either a register operand or a general expression, for data-processing
/// operand2 positions that accept both.
enum Op2 {
    Reg(Reg),
    Expr(Expr),
}

fn resolve_op2(pos: &SourcePos, text: &str, aliases: &HashMap<String, Reg>, exprp: &ExprParser) -> Result<Op2> {
    let text = text.trim();
    if let Some(reg) = regs::resolve(text, aliases) {
        return Ok(Op2::Reg(reg));
    }
    Ok(Op2::Expr(exprp.parse(pos, text)?))
}

fn emit(import: &mut Import, pos: &SourcePos, parts: Vec<CodePart>, operands: Vec<(&'static str, Expr)>) {
    import.write_inst(pos.clone(), Isa::Arm, parts, operands);
}

/// Attempts to assemble one ARM statement. Returns `Ok(true)` if `mnemonic`
/// was recognised (whether or not its operands were well-formed — a
/// malformed operand list for a *known* mnemonic is still this ISA's
/// error to report), `Ok(false)` if the mnemonic is unknown here (the
/// caller should try Thumb, or report "unknown mnemonic" if that also
/// fails).
pub fn assemble(
    mnemonic: &str,
    cond: Cond,
    rest: &str,
    pos: &SourcePos,
    aliases: &HashMap<String, Reg>,
    exprp: &ExprParser,
    import: &mut Import,
) -> Result<bool> {
    let cond_val = cond.nibble() as i64;
    let ops: Vec<&str> = split_top_level_commas(rest);

    // data-processing: mnemonic{s}{cond} rd, rn, op2 | mnemonic{s}{cond} rd, op2
    let (dp_opcode, two_operand, settable) = match mnemonic.strip_suffix('s').unwrap_or(mnemonic) {
        "mov" => (tables::arm::opcode::MOV, true, true),
        "mvn" => (tables::arm::opcode::MVN, true, true),
        "add" => (tables::arm::opcode::ADD, false, true),
        "sub" => (tables::arm::opcode::SUB, false, true),
        "and" => (tables::arm::opcode::AND, false, true),
        "eor" => (tables::arm::opcode::EOR, false, true),
        "orr" => (tables::arm::opcode::ORR, false, true),
        "cmp" => (tables::arm::opcode::CMP, false, false),
        _ => (0, false, false),
    };
    let is_dp = matches!(
        mnemonic.strip_suffix('s').unwrap_or(mnemonic),
        "mov" | "mvn" | "add" | "sub" | "and" | "eor" | "orr" | "cmp"
    );
    if is_dp {
        let set_flags = mnemonic.ends_with('s') && settable || mnemonic.strip_suffix('s').unwrap_or(mnemonic) == "cmp";
        let (rd_text, rn_text, op2_text) = if mnemonic.strip_suffix('s').unwrap_or(mnemonic) == "cmp" {
            let [rn, op2] = take2(pos, &ops)?;
            ("r0", rn, op2)
        } else if two_operand && ops.len() == 2 {
            let [rd, op2] = take2(pos, &ops)?;
            (rd, "r0", op2)
        } else {
            let [rd, rn, op2] = take3(pos, &ops)?;
            (rd, rn, op2)
        };
        let rd = parse_reg(pos, rd_text, aliases)?;
        let rn = parse_reg(pos, rn_text, aliases)?;
        let op2 = resolve_op2(pos, op2_text, aliases, exprp)?;
        let parts = match &op2 {
            Op2::Reg(_) => tables::arm::data_proc_reg(dp_opcode, set_flags),
            Op2::Expr(_) => tables::arm::data_proc_imm(dp_opcode, set_flags),
        };
        let mut operands = vec![("cond", num(cond_val)), ("rd", num(rd.0 as i64)), ("rn", num(rn.0 as i64))];
        match op2 {
            Op2::Reg(r) => operands.push(("rm", num(r.0 as i64))),
            Op2::Expr(e) => operands.push(("op2", e)),
        }
        emit(import, pos, parts, operands);
        return Ok(true);
    }

    match mnemonic {
        "b" | "bl" => {
            let [target] = take1(pos, &ops)?;
            let target = exprp.parse(pos, target)?;
            emit(import, pos, tables::arm::b_bl(mnemonic == "bl"), vec![("cond", num(cond_val)), ("target", target)]);
            Ok(true)
        }
        "bx" => {
            let [rm] = take1(pos, &ops)?;
            let rm = parse_reg(pos, rm, aliases)?;
            emit(import, pos, tables::arm::bx(), vec![("cond", num(cond_val)), ("rm", num(rm.0 as i64))]);
            Ok(true)
        }
        "ldr" | "str" | "ldrb" | "strb" => {
            let load = mnemonic.starts_with("ldr");
            let byte = mnemonic.ends_with('b');
            let [rd_text, mem] = take2(pos, &ops)?;
            let rd = parse_reg(pos, rd_text, aliases)?;
            if load {
                if let Some(lit) = mem.trim().strip_prefix('=') {
                    let target = exprp.parse(pos, lit)?;
                    let width = if byte { 1 } else { 4 };
                    import.write_pool(pos.clone(), Isa::Arm, width, false, rd, cond_val as u32, target);
                    return Ok(true);
                }
            }
            let inner = crate::operand::strip_wrap(mem, '[', ']').ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a bracketed memory operand",
                found: mem.to_string(),
            })?;
            let inner_ops: Vec<&str> = split_top_level_commas(inner);
            let base_text = inner_ops.first().copied().unwrap_or("");
            if base_text.trim() == "pc" {
                let offset_text = inner_ops.get(1).copied().unwrap_or("0");
                let target = exprp.parse(pos, offset_text)?;
                emit(import, pos, tables::arm::ldr_pc(byte), vec![("cond", num(cond_val)), ("rd", num(rd.0 as i64)), ("target", target)]);
                return Ok(true);
            }
            let base = parse_reg(pos, base_text, aliases)?;
            let offset_text = inner_ops.get(1).copied().unwrap_or("#0");
            let offset = exprp.parse(pos, offset_text)?;
            emit(
                import,
                pos,
                tables::arm::ldr_str_imm(load, byte),
                vec![("cond", num(cond_val)), ("rd", num(rd.0 as i64)), ("rn", num(base.0 as i64)), ("offset", offset)],
            );
            Ok(true)
        }
        "ldrh" | "strh" | "ldrsh" | "ldrsb" => {
            let load = mnemonic.starts_with('l');
            let (sign_extend, halfword) = match mnemonic {
                "ldrh" | "strh" => (false, true),
                "ldrsh" => (true, true),
                "ldrsb" => (true, false),
                _ => unreachable!(),
            };
            let [rd_text, mem] = take2(pos, &ops)?;
            let rd = parse_reg(pos, rd_text, aliases)?;
            if load {
                if let Some(lit) = mem.trim().strip_prefix('=') {
                    let target = exprp.parse(pos, lit)?;
                    let width = if halfword { 2 } else { 1 };
                    import.write_pool(pos.clone(), Isa::Arm, width, sign_extend, rd, cond_val as u32, target);
                    return Ok(true);
                }
            }
            let inner = crate::operand::strip_wrap(mem, '[', ']').ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a bracketed memory operand",
                found: mem.to_string(),
            })?;
            let inner_ops: Vec<&str> = split_top_level_commas(inner);
            let base_text = inner_ops.first().copied().unwrap_or("");
            if base_text.trim() == "pc" {
                let offset_text = inner_ops.get(1).copied().unwrap_or("0");
                let target = exprp.parse(pos, offset_text)?;
                emit(import, pos, tables::arm::ldrh_pc(sign_extend, halfword), vec![("cond", num(cond_val)), ("rd", num(rd.0 as i64)), ("target", target)]);
                return Ok(true);
            }
            let base = parse_reg(pos, base_text, aliases)?;
            let offset_text = inner_ops.get(1).copied().unwrap_or("#0");
            let offset = exprp.parse(pos, offset_text)?;
            emit(
                import,
                pos,
                tables::arm::ldrh_strh(load, sign_extend, halfword),
                vec![("cond", num(cond_val)), ("rd", num(rd.0 as i64)), ("rn", num(base.0 as i64)), ("offset", offset)],
            );
            Ok(true)
        }
        "push" | "pop" => {
            let [list] = take1(pos, &ops)?;
            let mask = parse_reglist(pos, list, aliases)?;
            emit(import, pos, tables::arm::push_pop(mnemonic == "pop"), vec![("cond", num(cond_val)), ("reglist", num(mask as i64))]);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn take1<'a>(pos: &SourcePos, ops: &[&'a str]) -> Result<[&'a str; 1]> {
    match ops {
        [a] => Ok([a]),
        _ => Err(wrong_arity(pos, 1, ops.len())),
    }
}

fn take2<'a>(pos: &SourcePos, ops: &[&'a str]) -> Result<[&'a str; 2]> {
    match ops {
        [a, b] => Ok([a, b]),
        _ => Err(wrong_arity(pos, 2, ops.len())),
    }
}

fn take3<'a>(pos: &SourcePos, ops: &[&'a str]) -> Result<[&'a str; 3]> {
    match ops {
        [a, b, c] => Ok([a, b, c]),
        _ => Err(wrong_arity(pos, 3, ops.len())),
    }
}

fn wrong_arity(pos: &SourcePos, expected: usize, found: usize) -> CliError {
    CliError::Unexpected {
        pos: pos.clone(),
        expected: match expected {
            1 => "exactly one operand",
            2 => "exactly two operands",
            3 => "exactly three operands",
            _ => "a different number of operands",
        },
        found: format!("{found} operands"),
    }
}
