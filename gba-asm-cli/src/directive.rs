//! Directive dispatch: everything whose statement head starts with `.`.
//! Each directive is a thin translation from operand text to one
//! `gba_asm_core::Import` call — the core owns every invariant (redefinition,
//! reserved words, alignment, ...), this layer only parses.

use std::collections::HashMap;

use gba_asm_core::{AlignFill, Import, MemoryRegion, StructLayout, StructMember};
use gba_asm_expr::Mode;
use gba_asm_isa::DataType;
use gba_asm_types::{Reg, SourcePos, VirtAddr};

use crate::error::{CliError, Result};
use crate::expr_helper::ExprParser;
use crate::lexer::unquote;
use crate::operand::split_top_level_commas;
use crate::regs;

/// Accumulator for an in-progress `.struct`/`.endstruct` body.
#[derive(Default)]
pub struct StructBuilder {
    pub name: String,
    pub members: Vec<StructMember>,
}

fn data_type_for(tag: &str) -> Option<DataType> {
    Some(match tag {
        "u8" => DataType::U8,
        "i8" => DataType::I8,
        "u16" => DataType::U16,
        "i16" => DataType::I16,
        "u32" => DataType::U32,
        "i32" => DataType::I32,
        _ => return None,
    })
}

fn width_for(tag: &str) -> Option<u32> {
    Some(match tag {
        "i8" | "u8" => 1,
        "i16" | "u16" => 2,
        "i32" | "u32" => 4,
        _ => return None,
    })
}

fn expect1<'a>(pos: &SourcePos, ops: &[&'a str]) -> Result<&'a str> {
    match ops {
        [a] => Ok(a),
        _ => Err(CliError::Unexpected {
            pos: pos.clone(),
            expected: "exactly one operand",
            found: format!("{} operands", ops.len()),
        }),
    }
}

fn expect2<'a>(pos: &SourcePos, ops: &[&'a str]) -> Result<[&'a str; 2]> {
    match ops {
        [a, b] => Ok([a, b]),
        _ => Err(CliError::Unexpected {
            pos: pos.clone(),
            expected: "exactly two operands",
            found: format!("{} operands", ops.len()),
        }),
    }
}

/// Handles one directive already inside (or starting) a `.struct` body —
/// these accumulate into `builder` instead of calling into `import`.
fn struct_member(name: &str, rest: &str, pos: &SourcePos, builder: &mut StructBuilder, import: &Import) -> Result<()> {
    let ops = split_top_level_commas(rest);
    match name {
        "label" => {
            let member_name = expect1(pos, &ops)?;
            builder.members.push(StructMember::Label { name: member_name.to_string() });
        }
        "align" => {
            let amount = expect1(pos, &ops)?;
            let amount: i64 = amount.trim().parse().map_err(|_| CliError::Unexpected {
                pos: pos.clone(),
                expected: "an integer alignment amount",
                found: amount.to_string(),
            })?;
            builder.members.push(StructMember::Align { amount });
        }
        "nested" => {
            let [struct_name, member_name] = expect2(pos, &ops)?;
            let layout = import.lookup_struct(struct_name.trim()).ok_or_else(|| CliError::UnknownStruct {
                pos: pos.clone(),
                name: struct_name.trim().to_string(),
            })?;
            builder.members.push(StructMember::Nested {
                name: member_name.trim().to_string(),
                layout,
            });
        }
        tag => {
            let ty = data_type_for(tag).ok_or_else(|| CliError::UnknownDirective {
                pos: pos.clone(),
                name: name.to_string(),
            })?;
            let (member_name, length) = match ops.as_slice() {
                [n] => (*n, None),
                [n, len] => {
                    let len: i64 = len.trim().parse().map_err(|_| CliError::Unexpected {
                        pos: pos.clone(),
                        expected: "an integer array length",
                        found: len.to_string(),
                    })?;
                    (*n, Some(len))
                }
                _ => {
                    return Err(CliError::Unexpected {
                        pos: pos.clone(),
                        expected: "a member name, optionally followed by an array length",
                        found: rest.to_string(),
                    })
                }
            };
            builder.members.push(StructMember::Data {
                name: member_name.trim().to_string(),
                ty,
                length,
            });
        }
    }
    Ok(())
}

/// Defines the small set of well-known GBA memory-mapped addresses
/// (spec §6 "stdlib"): enough for a source file to reach VRAM/palette/OAM/
/// I/O register space by name without redeclaring them per project.
fn define_stdlib(import: &mut Import) -> gba_asm_core::Result<()> {
    let pos = SourcePos::synthetic("stdlib");
    let entries: &[(&str, i64)] = &[
        ("REG_BASE", 0x0400_0000),
        ("VRAM", 0x0600_0000),
        ("PALRAM", 0x0500_0000),
        ("OAM", 0x0700_0000),
        ("IWRAM", 0x0300_0000),
        ("EWRAM", 0x0200_0000),
        ("ROM", 0x0800_0000),
    ];
    for (name, value) in entries {
        import.add_sym_num(&pos, name, *value)?;
    }
    Ok(())
}

/// Top-level directive dispatch. `struct_builder` is `Some` only while
/// `.struct`/`.endstruct` is in progress; every other directive is
/// rejected inside a struct body (spec §4.8 bodies only declare members).
#[allow(clippy::too_many_arguments)]
pub fn dispatch(
    name: &str,
    rest: &str,
    pos: &SourcePos,
    aliases: &mut HashMap<String, Reg>,
    if_stack: &mut Vec<bool>,
    struct_builder: &mut Option<StructBuilder>,
    exprp: &ExprParser,
    import: &mut Import,
) -> Result<()> {
    if let Some(builder) = struct_builder {
        if name == "endstruct" {
            let builder = struct_builder.take().unwrap();
            let layout = StructLayout::build(pos, builder.members)?;
            import.add_sym_struct(pos, &builder.name, layout)?;
            return Ok(());
        }
        struct_member(name, rest, pos, builder, import)?;
        return Ok(());
    }

    match name {
        "arm" => import.set_mode(Mode::Arm),
        "thumb" => import.set_mode(Mode::Thumb),
        "begin" => {
            let label = rest.trim();
            import.begin_start(pos, (!label.is_empty()).then_some(label))?;
        }
        "end" => import.end(),
        "if" => {
            let cond = exprp.parse(pos, rest)?;
            let value = require_literal(pos, &cond)?;
            if_stack.push(value != 0);
            import.if_start(value != 0);
        }
        "else" => {
            let active = if_stack.pop().ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a preceding `.if`",
                found: ".else".to_string(),
            })?;
            if_stack.push(!active);
            import.end();
            import.if_start(!active);
        }
        "endif" => {
            import.end();
            if_stack.pop();
        }
        "pool" => {
            import.pool();
        }
        "align" => {
            let ops = split_top_level_commas(rest);
            let to_text = ops.first().copied().ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "an alignment amount",
                found: rest.to_string(),
            })?;
            let to = require_literal(pos, &exprp.parse(pos, to_text)?)? as u32;
            let fill = match ops.get(1) {
                Some(byte_text) => AlignFill::Byte(require_literal(pos, &exprp.parse(pos, byte_text)?)? as u8),
                None => AlignFill::Nop,
            };
            import.align(to, fill);
        }
        "include" => {
            let path = unquote(rest.trim()).ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted file path",
                found: rest.to_string(),
            })?;
            import.include(path);
        }
        "embed" => {
            let path = unquote(rest.trim()).ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted file path",
                found: rest.to_string(),
            })?;
            import.embed(path);
        }
        "logo" => {
            // `.logo` is sugar over `.embed` rather than `Import::write_logo`:
            // the parser has no file-I/O handle (embeds are resolved by the
            // Project after parsing), and the 156-byte Nintendo compatibility
            // bitmap is copyrighted third-party data this assembler doesn't
            // ship — `write_logo` stays available for an in-memory caller
            // that supplies its own bytes.
            let path = unquote(rest.trim()).ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted path to a 156-byte logo bitmap",
                found: rest.to_string(),
            })?;
            import.embed(path);
        }
        "title" => {
            let title = unquote(rest.trim()).ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted title string",
                found: rest.to_string(),
            })?;
            import.write_title(&title);
        }
        "crc" => import.write_crc(),
        "importall" => {
            let ops = split_top_level_commas(rest);
            let [alias, path] = match ops.as_slice() {
                [a, b] => [*a, *b],
                _ => {
                    return Err(CliError::Unexpected {
                        pos: pos.clone(),
                        expected: "an alias name and a quoted file path",
                        found: rest.to_string(),
                    })
                }
            };
            let path = unquote(path.trim()).ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted file path",
                found: path.to_string(),
            })?;
            import.import_all(pos, alias.trim(), &path)?;
        }
        "importnames" => {
            let ops = split_top_level_commas(rest);
            let (path, names) = ops.split_first().ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted file path followed by one or more names",
                found: rest.to_string(),
            })?;
            let path = unquote(path.trim()).ok_or_else(|| CliError::Unexpected {
                pos: pos.clone(),
                expected: "a quoted file path",
                found: path.to_string(),
            })?;
            let names: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();
            import.import_names(pos, &path, &names)?;
        }
        "regs" => {
            let ops = split_top_level_commas(rest);
            let mut new_aliases = Vec::with_capacity(ops.len());
            for entry in ops {
                let (alias, reg_name) = entry.split_once('=').ok_or_else(|| CliError::Unexpected {
                    pos: pos.clone(),
                    expected: "`alias=regname` pairs",
                    found: entry.to_string(),
                })?;
                let reg = regs::builtin(reg_name.trim()).ok_or_else(|| CliError::NotARegister {
                    pos: pos.clone(),
                    name: reg_name.trim().to_string(),
                })?;
                new_aliases.push((alias.trim().to_string(), reg));
            }
            import.set_regs(&new_aliases);
            for (alias, reg) in new_aliases {
                aliases.insert(alias, reg);
            }
        }
        "base" => {
            let addr = require_literal(pos, &exprp.parse(pos, rest)?)?;
            import.set_base(VirtAddr::new(addr as u32), true);
        }
        "basenext" => {
            let addr = require_literal(pos, &exprp.parse(pos, rest)?)?;
            import.set_base(VirtAddr::new(addr as u32), false);
        }
        "iwram" | "ewram" => {
            let region = if name == "iwram" { MemoryRegion::Iwram } else { MemoryRegion::Ewram };
            let ops = split_top_level_commas(rest);
            let [label, size_text] = expect2(pos, &ops)?;
            let size = require_literal(pos, &exprp.parse(pos, size_text)?)? as u32;
            let index = import.alloc_memory(region, size);
            import.add_sym_memory_label(pos, label.trim(), index)?;
        }
        "i8" | "i16" | "i32" | "u8" | "u16" | "u32" => {
            let width = width_for(name).unwrap();
            for op in split_top_level_commas(rest) {
                let value = exprp.parse(pos, op)?;
                import.write_data(pos.clone(), width, value);
            }
        }
        "fill8" | "fill16" | "fill32" => {
            let width = match name {
                "fill8" => 1,
                "fill16" => 2,
                _ => 4,
            };
            let ops = split_top_level_commas(rest);
            let [count_text, fill_text] = expect2(pos, &ops)?;
            let count = require_literal(pos, &exprp.parse(pos, count_text)?)? as usize;
            let fill = exprp.parse(pos, fill_text)?;
            import.write_data_fill(pos.clone(), width, count, fill);
        }
        "str" => {
            let s = unquote(rest.trim()).ok_or_else(|| CliError::UnterminatedString { pos: pos.clone() })?;
            import.write_str(&s);
        }
        "printf" | "printferr" => {
            let (fmt, args) = parse_format_call(pos, rest, exprp)?;
            import.printf(pos.clone(), fmt, args, name == "printferr");
        }
        "assert" => {
            let ops = split_top_level_commas(rest);
            let (expr_text, msg) = match ops.as_slice() {
                [e] => (*e, String::new()),
                [e, m] => (*e, unquote(m.trim()).unwrap_or_else(|| m.trim().to_string())),
                _ => {
                    return Err(CliError::Unexpected {
                        pos: pos.clone(),
                        expected: "an expression, optionally followed by a quoted message",
                        found: rest.to_string(),
                    })
                }
            };
            let expr = exprp.parse(pos, expr_text)?;
            import.assert(pos.clone(), msg, expr);
        }
        "debuglog" => {
            let (fmt, args) = parse_format_call(pos, rest, exprp)?;
            import.debug_log(pos.clone(), fmt, args);
        }
        "debugexit" => import.debug_exit(),
        "def" | "const" => {
            let ops = split_top_level_commas(rest);
            let [sym, expr_text] = expect2(pos, &ops)?;
            let expr = exprp.parse(pos, expr_text)?;
            import.add_sym_const(pos, sym.trim(), expr)?;
        }
        "num" => {
            let ops = split_top_level_commas(rest);
            let [sym, expr_text] = expect2(pos, &ops)?;
            let expr = exprp.parse(pos, expr_text)?;
            let value = require_literal(pos, &expr)?;
            import.add_sym_num(pos, sym.trim(), value)?;
        }
        "struct" => {
            let struct_name = rest.trim().to_string();
            *struct_builder = Some(StructBuilder {
                name: struct_name,
                members: Vec::new(),
            });
        }
        "stdlib" => import.stdlib(define_stdlib)?,
        other => {
            return Err(CliError::UnknownDirective {
                pos: pos.clone(),
                name: other.to_string(),
            })
        }
    }
    Ok(())
}

/// `.num`/`.align`/`.base`/array-length operands must already be a literal
/// number at parse time — they feed core APIs that take a plain `Value`,
/// not a deferred `Expr`.
fn require_literal(pos: &SourcePos, expr: &gba_asm_expr::Expr) -> Result<i64> {
    match expr {
        gba_asm_expr::Expr::Number(n) => Ok(*n),
        _ => Err(CliError::Unexpected {
            pos: pos.clone(),
            expected: "a literal number",
            found: format!("{expr:?}"),
        }),
    }
}

/// `.printf`/`.printferr`/`.debugLog` all share `"format string", arg, arg, ...`.
fn parse_format_call(pos: &SourcePos, rest: &str, exprp: &ExprParser) -> Result<(String, Vec<gba_asm_expr::Expr>)> {
    let ops = split_top_level_commas(rest);
    let (fmt_text, arg_texts) = ops.split_first().ok_or_else(|| CliError::Unexpected {
        pos: pos.clone(),
        expected: "a quoted format string",
        found: rest.to_string(),
    })?;
    let fmt = unquote(fmt_text.trim()).ok_or_else(|| CliError::UnterminatedString { pos: pos.clone() })?;
    let args = arg_texts.iter().map(|a| exprp.parse(pos, a)).collect::<Result<Vec<_>>>()?;
    Ok((fmt, args))
}
