//! Typed memory access mnemonics: `tld`/`tst` (typed load/store), the
//! surface syntax over `Import::write_typed_mem` — a struct-field reference
//! resolves straight to an offset and a data-type tag, so the width/sign
//! and immediate-vs-register addressing mode all follow from the field
//! rather than from a separate mnemonic per width.
//!
//! `tld.u32 rd, [rb, StructName.member]` — field access, immediate offset.
//! `tld.u32 rd, [rb, rIndex]` — register-offset form.
//! A trailing `m` on the type tag (`u8m`, `i16m`, `u32m`) selects the
//! misaligned variant (spec §4.8's "`m`-marked types may straddle").

use std::collections::HashMap;

use gba_asm_core::Import;
use gba_asm_expr::ResolvedSegment;
use gba_asm_isa::{resolve_typed_mem, DataType, Isa, MemKind};
use gba_asm_types::{Reg, SourcePos};

use crate::error::{CliError, Result};
use crate::operand::{parse_reg, split_top_level_commas, strip_wrap};
use crate::regs;

fn parse_data_type(tag: &str) -> Option<DataType> {
    let (base, misaligned) = match tag.strip_suffix('m') {
        Some(base) => (base, true),
        None => (tag, false),
    };
    let ty = match base {
        "u8" => DataType::U8,
        "i8" => DataType::I8,
        "u16" => DataType::U16,
        "i16" => DataType::I16,
        "u32" => DataType::U32,
        "i32" => DataType::I32,
        _ => return None,
    };
    Some(if misaligned { DataType::Misaligned(Box::new(ty)) } else { ty })
}

/// Tries to assemble one `tld.<type>`/`tst.<type>` statement. Returns
/// `Ok(None)` if `mnemonic` isn't one of these two families at all (an
/// ordinary mnemonic, not a malformed typed-memory one).
pub fn assemble(
    isa: Isa,
    mnemonic: &str,
    rest: &str,
    pos: &SourcePos,
    aliases: &HashMap<String, Reg>,
    import: &mut Import,
) -> Result<Option<()>> {
    let Some((head, type_tag)) = mnemonic.split_once('.') else {
        return Ok(None);
    };
    let (base, cond) = crate::cond::split_suffix(head);
    let load = match base {
        "tld" => true,
        "tst" => false,
        _ => return Ok(None),
    };
    let data_type = parse_data_type(type_tag).ok_or_else(|| CliError::UnknownMnemonic {
        pos: pos.clone(),
        name: mnemonic.to_string(),
    })?;

    let ops = split_top_level_commas(rest);
    let [rd_text, mem] = match ops.as_slice() {
        [a, b] => [*a, *b],
        _ => {
            return Err(CliError::Unexpected {
                pos: pos.clone(),
                expected: "exactly two operands",
                found: format!("{} operands", ops.len()),
            })
        }
    };
    let reg = parse_reg(pos, rd_text, aliases)?;

    let inner = strip_wrap(mem, '[', ']').ok_or_else(|| CliError::Unexpected {
        pos: pos.clone(),
        expected: "a bracketed memory operand",
        found: mem.to_string(),
    })?;
    let inner_ops = split_top_level_commas(inner);
    let [base_text, field_text] = match inner_ops.as_slice() {
        [a, b] => [*a, *b],
        _ => {
            return Err(CliError::Unexpected {
                pos: pos.clone(),
                expected: "a base register and a field reference",
                found: inner.to_string(),
            })
        }
    };
    let base_reg = parse_reg(pos, base_text, aliases)?;
    let field_text = field_text.trim();

    let (kind, offset_or_index) = if let Some(index_reg) = regs::resolve(field_text, aliases) {
        (if load { MemKind::LdrReg } else { MemKind::StrReg }, index_reg.0 as i64)
    } else if let Some((struct_name, member)) = field_text.split_once('.') {
        let layout = import.lookup_struct(struct_name).ok_or_else(|| CliError::UnknownStruct {
            pos: pos.clone(),
            name: struct_name.to_string(),
        })?;
        let offset = layout
            .resolve_offset(&[ResolvedSegment::Name(member.to_string())])
            .ok_or_else(|| CliError::UnknownMember {
                pos: pos.clone(),
                name: struct_name.to_string(),
                member: member.to_string(),
            })?;
        (if load { MemKind::LdrImm } else { MemKind::StrImm }, offset)
    } else {
        return Err(CliError::Unexpected {
            pos: pos.clone(),
            expected: "a register or a `Struct.member` field reference",
            found: field_text.to_string(),
        });
    };

    let op = resolve_typed_mem(isa, kind, reg, base_reg, data_type, offset_or_index)
        .map_err(|source| CliError::Encode { pos: pos.clone(), source })?;
    import
        .write_typed_mem(pos.clone(), isa, op, cond.nibble())
        .map_err(CliError::Core)?;
    Ok(Some(()))
}
