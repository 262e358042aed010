//! Operand-string splitting and the small sub-grammars (register lists,
//! bracketed memory operands) that sit between a raw statement's operand
//! text and the `gba_asm_expr::parse` calls the mnemonic tables eventually
//! make on each leaf.

use std::collections::HashMap;

use gba_asm_types::{Reg, SourcePos};

use crate::error::{CliError, Result};
use crate::regs;

/// Splits `s` on top-level commas — commas nested inside `[...]`, `{...}`,
/// `(...)`, or a string literal don't count (spec §4.3's bracketed memory
/// operands and §4.2's `{reglist}` both contain commas of their own).
pub fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_str = false;
    let mut start = 0usize;
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_str = !in_str,
            b'[' | b'{' | b'(' if !in_str => depth += 1,
            b']' | b'}' | b')' if !in_str => depth -= 1,
            b',' if !in_str && depth == 0 => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() || !out.is_empty() {
        out.push(tail);
    }
    out
}

/// Strips one layer of brackets if `s` is fully wrapped in `open`/`close`,
/// e.g. `"[r0, #4]"` -> `Some("r0, #4")`.
pub fn strip_wrap(s: &str, open: char, close: char) -> Option<&str> {
    let s = s.trim();
    let inner = s.strip_prefix(open)?.strip_suffix(close)?;
    Some(inner.trim())
}

pub fn parse_reg(pos: &SourcePos, s: &str, aliases: &HashMap<String, Reg>) -> Result<Reg> {
    let s = s.trim();
    regs::resolve(s, aliases).ok_or_else(|| CliError::NotARegister {
        pos: pos.clone(),
        name: s.to_string(),
    })
}

/// Parses a `{r0, r1, r4-r7, lr}`-style register list into its bitmask
/// (bit `n` set means `rn` is a member) — the shape `tables::arm::push_pop`/
/// `tables::thumb::ldm_stm` expect under the `"reglist"` operand.
pub fn parse_reglist(pos: &SourcePos, s: &str, aliases: &HashMap<String, Reg>) -> Result<u32> {
    let inner = strip_wrap(s, '{', '}').ok_or_else(|| CliError::Unexpected {
        pos: pos.clone(),
        expected: "a register list in braces",
        found: s.to_string(),
    })?;
    let mut mask = 0u32;
    if inner.is_empty() {
        return Ok(mask);
    }
    for entry in split_top_level_commas(inner) {
        let entry = entry.trim();
        if let Some((lo, hi)) = entry.split_once('-') {
            let lo = parse_reg(pos, lo, aliases)?.0;
            let hi = parse_reg(pos, hi, aliases)?.0;
            if lo > hi {
                return Err(CliError::Unexpected {
                    pos: pos.clone(),
                    expected: "an ascending register range",
                    found: entry.to_string(),
                });
            }
            for n in lo..=hi {
                mask |= 1 << n;
            }
        } else {
            mask |= 1 << parse_reg(pos, entry, aliases)?.0;
        }
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> SourcePos {
        SourcePos::synthetic("t")
    }

    #[test]
    fn commas_inside_brackets_are_not_split_points() {
        let parts = split_top_level_commas("r0, [r1, #4]");
        assert_eq!(parts, vec!["r0", "[r1, #4]"]);
    }

    #[test]
    fn reglist_expands_ranges_and_names() {
        let aliases = HashMap::new();
        let mask = parse_reglist(&pos(), "{r0, r4-r6, lr}", &aliases).unwrap();
        assert_eq!(mask, (1 << 0) | (1 << 4) | (1 << 5) | (1 << 6) | (1 << 14));
    }

    #[test]
    fn bracket_mem_operand_strips_cleanly() {
        assert_eq!(strip_wrap("[r0, #4]", '[', ']'), Some("r0, #4"));
        assert_eq!(strip_wrap("r0", '[', ']'), None);
    }
}
