//! Thumb (16-bit, plus the `bl` 32-bit pair) mnemonic dispatch — the Thumb
//! counterpart of `isa_arm`, covering one mnemonic family per
//! `gba_asm_isa::tables::thumb` function.

use std::collections::HashMap;

use gba_asm_core::Import;
use gba_asm_expr::Expr;
use gba_asm_isa::{tables, CodePart, Isa};
use gba_asm_types::{Reg, SourcePos};

use crate::cond::Cond;
use crate::error::{CliError, Result};
use crate::expr_helper::ExprParser;
use crate::operand::{parse_reg, parse_reglist, split_top_level_commas, strip_wrap};
use crate::regs;

fn num(v: i64) -> Expr {
    Expr::Number(v)
}

fn emit(import: &mut Import, pos: &SourcePos, parts: Vec<CodePart>, operands: Vec<(&'static str, Expr)>) {
    import.write_inst(pos.clone(), Isa::Thumb, parts, operands);
}

fn alu_opcode(mnemonic: &str) -> Option<u32> {
    Some(match mnemonic {
        "and" => 0b0000,
        "eor" => 0b0001,
        "lsl" => 0b0010,
        "lsr" => 0b0011,
        "asr" => 0b0100,
        "adc" => 0b0101,
        "sbc" => 0b0110,
        "ror" => 0b0111,
        "tst" => 0b1000,
        "neg" => 0b1001,
        "cmn" => 0b1011,
        "orr" => 0b1100,
        "mul" => 0b1101,
        "bic" => 0b1110,
        "mvn" => 0b1111,
        _ => return None,
    })
}

pub fn assemble(
    mnemonic: &str,
    cond: Cond,
    rest: &str,
    pos: &SourcePos,
    aliases: &HashMap<String, Reg>,
    exprp: &ExprParser,
    import: &mut Import,
) -> Result<bool> {
    let ops: Vec<&str> = split_top_level_commas(rest);

    match mnemonic {
        "bx" => {
            let [rs] = take1(pos, &ops)?;
            let rs = parse_reg(pos, rs, aliases)?;
            emit(import, pos, tables::thumb::bx(), vec![("rs", num(rs.0 as i64))]);
            return Ok(true);
        }
        "push" | "pop" => {
            let [list] = take1(pos, &ops)?;
            let mask = parse_reglist(pos, list, aliases)?;
            emit(import, pos, tables::thumb::push_pop(mnemonic == "pop"), vec![("reglist", num(mask as i64))]);
            return Ok(true);
        }
        "ldmia" | "stmia" | "ldm" | "stm" => {
            let load = mnemonic.starts_with('l');
            let [rb_text, list] = take2(pos, &ops)?;
            let rb_text = rb_text.trim().strip_suffix('!').unwrap_or(rb_text.trim());
            let rb = parse_reg(pos, rb_text, aliases)?;
            let mask = parse_reglist(pos, list, aliases)?;
            emit(import, pos, tables::thumb::ldm_stm(load), vec![("rb", num(rb.0 as i64)), ("reglist", num(mask as i64))]);
            return Ok(true);
        }
        "b" => {
            let [target] = take1(pos, &ops)?;
            let target = exprp.parse(pos, target)?;
            if crate::cond::is_always(cond) {
                emit(import, pos, tables::thumb::b_uncond(), vec![("target", target)]);
            } else {
                emit(import, pos, tables::thumb::b_cond(), vec![("cond", num(cond.nibble() as i64)), ("target", target)]);
            }
            return Ok(true);
        }
        "bl" => {
            let [target] = take1(pos, &ops)?;
            let target = exprp.parse(pos, target)?;
            emit(import, pos, tables::thumb::bl_hi(), vec![("target", target.clone())]);
            emit(import, pos, tables::thumb::bl_lo(), vec![("target", target)]);
            return Ok(true);
        }
        _ => {}
    }

    if mnemonic == "ldr" || mnemonic == "str" || mnemonic.starts_with("ldr") || mnemonic.starts_with("str") {
        if let Some(handled) = assemble_mem(mnemonic, &ops, pos, aliases, exprp, import)? {
            return Ok(handled);
        }
    }

    if mnemonic == "add" || mnemonic == "sub" {
        return assemble_add_sub(mnemonic, &ops, pos, aliases, exprp, import);
    }

    if mnemonic == "mov" || mnemonic == "cmp" {
        return assemble_mov_cmp(mnemonic, &ops, pos, aliases, exprp, import);
    }

    if let Some(op) = alu_opcode(mnemonic) {
        let [rd, rs] = take2(pos, &ops)?;
        let rd = parse_reg(pos, rd, aliases)?;
        let rs = parse_reg(pos, rs, aliases)?;
        emit(import, pos, tables::thumb::alu(op), vec![("rd", num(rd.0 as i64)), ("rs", num(rs.0 as i64))]);
        return Ok(true);
    }

    Ok(false)
}

fn assemble_mem(
    mnemonic: &str,
    ops: &[&str],
    pos: &SourcePos,
    aliases: &HashMap<String, Reg>,
    exprp: &ExprParser,
    import: &mut Import,
) -> Result<Option<bool>> {
    let load = mnemonic.starts_with("ldr");
    let (byte, halfword, sign_extend) = match mnemonic {
        "ldr" | "str" => (false, false, false),
        "ldrb" | "strb" => (true, false, false),
        "ldrh" | "strh" => (false, true, false),
        "ldrsh" => (false, true, true),
        "ldrsb" => (true, false, true),
        _ => return Ok(None),
    };
    let [rd_text, mem] = take2(pos, ops)?;
    let rd = parse_reg(pos, rd_text, aliases)?;

    if load && mnemonic == "ldr" {
        if let Some(lit) = mem.trim().strip_prefix('=') {
            let target = exprp.parse(pos, lit)?;
            import.write_pool(pos.clone(), Isa::Thumb, 4, false, rd, 0, target);
            return Ok(Some(true));
        }
    }

    let inner = strip_wrap(mem, '[', ']').ok_or_else(|| CliError::Unexpected {
        pos: pos.clone(),
        expected: "a bracketed memory operand",
        found: mem.to_string(),
    })?;
    let inner_ops: Vec<&str> = split_top_level_commas(inner);
    let base_text = inner_ops.first().copied().unwrap_or("").trim();

    if base_text == "pc" && mnemonic == "ldr" {
        // `[pc, label]` addresses a literal directly by its resolved
        // address; `PcOffset` wants that absolute target, not a displacement,
        // so plain numeric displacements (`[pc, #4]`) aren't meaningful here
        // — use `ldr rd, =expr` for a computed pool load instead.
        let label = inner_ops.get(1).copied().unwrap_or("").trim();
        let target = exprp.parse(pos, label)?;
        emit(import, pos, tables::thumb::ldr_pc(), vec![("rd", num(rd.0 as i64)), ("target", target)]);
        return Ok(Some(true));
    }

    let base = parse_reg(pos, base_text, aliases)?;
    let second = inner_ops.get(1).copied().unwrap_or("#0").trim();

    if let Some(ro) = regs::resolve(second, aliases) {
        emit(
            import,
            pos,
            tables::thumb::ldr_str_reg(load, byte || halfword, sign_extend),
            vec![("rd", num(rd.0 as i64)), ("rb", num(base.0 as i64)), ("ro", num(ro.0 as i64))],
        );
        return Ok(Some(true));
    }

    let offset = exprp.parse(pos, second)?;
    if halfword {
        emit(import, pos, tables::thumb::ldrh_strh_imm(load), vec![("rd", num(rd.0 as i64)), ("rb", num(base.0 as i64)), ("offset", offset)]);
    } else {
        emit(import, pos, tables::thumb::ldr_str_imm(load, byte), vec![("rd", num(rd.0 as i64)), ("rb", num(base.0 as i64)), ("offset", offset)]);
    }
    Ok(Some(true))
}

fn assemble_add_sub(
    mnemonic: &str,
    ops: &[&str],
    pos: &SourcePos,
    aliases: &HashMap<String, Reg>,
    exprp: &ExprParser,
    import: &mut Import,
) -> Result<bool> {
    let subtract = mnemonic == "sub";

    if ops.len() == 2 {
        let [a, b] = take2(pos, ops)?;
        let a_trim = a.trim();
        if a_trim == "sp" {
            let imm = exprp.parse(pos, b)?;
            emit(import, pos, tables::thumb::add_sub_sp(subtract), vec![("imm", imm)]);
            return Ok(true);
        }
        let rd = parse_reg(pos, a_trim, aliases)?;
        let b_trim = b.trim();
        if let Some(rs) = regs::resolve(b_trim, aliases) {
            if subtract {
                // format 5 has no hi-register `sub`; `sub rd, rs` is sugar
                // for the three-operand register form with `rd` repeated.
                emit(
                    import,
                    pos,
                    tables::thumb::add_sub_reg_or_imm3(true, false),
                    vec![("rd", num(rd.0 as i64)), ("rn", num(rd.0 as i64)), ("rm", num(rs.0 as i64))],
                );
            } else {
                emit(import, pos, tables::thumb::hi_reg_op(0b00, !rd.is_low(), !rs.is_low()), vec![("rd", num(rd.0 as i64)), ("rs", num(rs.0 as i64))]);
            }
            return Ok(true);
        }
        let imm = exprp.parse(pos, b_trim)?;
        let op = if subtract { 0b11 } else { 0b10 };
        emit(import, pos, tables::thumb::mov_cmp_add_sub_imm(op), vec![("rd", num(rd.0 as i64)), ("imm", imm)]);
        return Ok(true);
    }

    let [rd_text, rn_text, third] = take3(pos, ops)?;
    let rn_trim = rn_text.trim();
    if (rn_trim == "pc" || rn_trim == "sp") && !subtract {
        let rd = parse_reg(pos, rd_text, aliases)?;
        let imm = exprp.parse(pos, third)?;
        emit(import, pos, tables::thumb::add_pc_sp(rn_trim == "sp"), vec![("rd", num(rd.0 as i64)), ("imm", imm)]);
        return Ok(true);
    }

    let rd = parse_reg(pos, rd_text, aliases)?;
    let rn = parse_reg(pos, rn_text, aliases)?;
    let third_trim = third.trim();
    if let Some(rm) = regs::resolve(third_trim, aliases) {
        emit(
            import,
            pos,
            tables::thumb::add_sub_reg_or_imm3(subtract, false),
            vec![("rd", num(rd.0 as i64)), ("rn", num(rn.0 as i64)), ("rm", num(rm.0 as i64))],
        );
        return Ok(true);
    }
    let imm = exprp.parse(pos, third_trim)?;
    emit(import, pos, tables::thumb::add_sub_reg_or_imm3(subtract, true), vec![("rd", num(rd.0 as i64)), ("rn", num(rn.0 as i64)), ("rm", imm)]);
    Ok(true)
}

fn assemble_mov_cmp(
    mnemonic: &str,
    ops: &[&str],
    pos: &SourcePos,
    aliases: &HashMap<String, Reg>,
    exprp: &ExprParser,
    import: &mut Import,
) -> Result<bool> {
    let [rd_text, src] = take2(pos, ops)?;
    let rd = parse_reg(pos, rd_text, aliases)?;
    let src_trim = src.trim();
    if let Some(rs) = regs::resolve(src_trim, aliases) {
        let op = if mnemonic == "mov" { 0b10 } else { 0b01 };
        emit(import, pos, tables::thumb::hi_reg_op(op, !rd.is_low(), !rs.is_low()), vec![("rd", num(rd.0 as i64)), ("rs", num(rs.0 as i64))]);
        return Ok(true);
    }
    let imm = exprp.parse(pos, src_trim)?;
    let op = if mnemonic == "mov" { 0b00 } else { 0b01 };
    emit(import, pos, tables::thumb::mov_cmp_add_sub_imm(op), vec![("rd", num(rd.0 as i64)), ("imm", imm)]);
    Ok(true)
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
