//! The `SourceParser` implementation: turns one file's text into calls
//! against its `Import`, statement by statement. All per-file state (the
//! `use_id` counter, the `.if`/`.else` stack, an in-progress `.struct` body,
//! and `.regs` aliases) lives as locals inside [`Driver::parse`] — nothing
//! here is shared across files, so a fresh `Driver` isn't needed per file;
//! the same one serves the whole project.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use gba_asm_core::{CoreError, Import, SourceParser};
use gba_asm_expr::Mode;
use gba_asm_isa::Isa;
use gba_asm_types::{Reg, SourcePos};

use crate::directive::{self, StructBuilder};
use crate::error::CliError;
use crate::expr_helper::ExprParser;
use crate::lexer;
use crate::{cond, isa_arm, isa_thumb, isa_typed};

/// Statement-driven implementation of `gba_asm_core::SourceParser`.
#[derive(Default)]
pub struct Driver;

impl Driver {
    pub fn new() -> Self {
        Self
    }
}

fn mode_to_isa(mode: Mode) -> Isa {
    match mode {
        Mode::Arm => Isa::Arm,
        Mode::Thumb => Isa::Thumb,
    }
}

impl SourceParser for Driver {
    fn parse(&self, path: &str, _main: bool, source: &str, import: &mut Import) -> gba_asm_core::Result<()> {
        let file: Rc<str> = Rc::from(path);
        let use_id = Cell::new(0u64);
        let exprp = ExprParser::new(&use_id);
        let mut aliases: HashMap<String, Reg> = HashMap::new();
        let mut if_stack: Vec<bool> = Vec::new();
        let mut struct_builder: Option<StructBuilder> = None;

        for (index, raw_line) in source.lines().enumerate() {
            let line_no = index as u32 + 1;
            let pos = SourcePos::new(file.clone(), line_no, 1);
            let code = lexer::strip_comment(raw_line);
            let stmt = lexer::parse_statement(code);

            for label in &stmt.labels {
                import.add_sym_named_label(&pos, label)?;
            }

            let Some(head) = stmt.head else { continue };

            if stmt.is_directive {
                directive::dispatch(
                    &head,
                    &stmt.rest,
                    &pos,
                    &mut aliases,
                    &mut if_stack,
                    &mut struct_builder,
                    &exprp,
                    import,
                )
                .map_err(CoreError::from)?;
                continue;
            }

            if struct_builder.is_some() {
                return Err(CoreError::from(CliError::Unexpected {
                    pos,
                    expected: "a struct member directive or `.endstruct`",
                    found: head,
                }));
            }

            let isa = mode_to_isa(import.current_mode().unwrap_or(Mode::Arm));

            if head.contains('.') {
                let handled = isa_typed::assemble(isa, &head, &stmt.rest, &pos, &aliases, import).map_err(CoreError::from)?;
                if handled.is_none() {
                    return Err(CoreError::from(CliError::UnknownMnemonic { pos, name: head }));
                }
                continue;
            }

            let (base, suffix_cond) = cond::split_suffix(&head);
            let handled = match isa {
                Isa::Arm => isa_arm::assemble(base, suffix_cond, &stmt.rest, &pos, &aliases, &exprp, import).map_err(CoreError::from)?,
                Isa::Thumb => isa_thumb::assemble(base, suffix_cond, &stmt.rest, &pos, &aliases, &exprp, import).map_err(CoreError::from)?,
            };
            if !handled {
                return Err(CoreError::from(CliError::UnknownMnemonic { pos, name: head }));
            }
        }

        if let Some(builder) = struct_builder {
            return Err(CoreError::from(CliError::Unexpected {
                pos: SourcePos::new(file, source.lines().count() as u32 + 1, 1),
                expected: "`.endstruct` before end of file",
                found: format!(".struct {}", builder.name),
            }));
        }
        if !if_stack.is_empty() {
            return Err(CoreError::from(CliError::Unexpected {
                pos: SourcePos::new(file, source.lines().count() as u32 + 1, 1),
                expected: "`.endif` before end of file",
                found: format!("{} unterminated `.if`", if_stack.len()),
            }));
        }

        Ok(())
    }
}
