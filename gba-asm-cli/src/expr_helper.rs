//! Glue between a raw operand substring and `gba_asm_expr::parse`: strips
//! the `#` immediate-value sigil ARM assembly syntax uses (not part of the
//! expression grammar itself) and seeds a monotonically increasing
//! `use_id` so repeated `+name`/`-name` references in the same file
//! disambiguate correctly (spec §4.7).

use std::cell::Cell;

use gba_asm_expr::Expr;
use gba_asm_types::SourcePos;

use crate::error::{CliError, Result};

pub struct ExprParser<'a> {
    use_id: &'a Cell<u64>,
}

impl<'a> ExprParser<'a> {
    pub fn new(use_id: &'a Cell<u64>) -> Self {
        Self { use_id }
    }

    pub fn parse(&self, pos: &SourcePos, text: &str) -> Result<Expr> {
        let text = text.trim().strip_prefix('#').unwrap_or(text.trim()).trim();
        let seed = self.use_id.get();
        self.use_id.set(seed + 1);
        gba_asm_expr::parse(text, pos.file.clone(), pos.line, seed).map_err(|source| CliError::Expr { pos: pos.clone(), source })
    }
}
