//! Drives `Project`/`Import` directly through a tiny scripted `SourceParser`,
//! independent of `gba-asm-cli`'s lexer — exercises the multi-pass
//! orchestration (`discover`/`flatten`/late-pool retry) this crate owns.

use std::collections::HashMap;
use std::rc::Rc;

use gba_asm_core::{CoreError, Import, Project, ProjectIo, Result, SourceParser};
use gba_asm_expr::{Expr, Path};
use gba_asm_isa::{tables, Isa};
use gba_asm_types::SourcePos;

/// Each "source file" is itself a sequence of `;`-separated scripted
/// commands (`label:NAME`, `b:TARGET`, `include:PATH`), not real assembly —
/// the point of this suite is the core's section/pending-write/pool
/// machinery, not lexing.
struct ScriptedParser;

impl SourceParser for ScriptedParser {
    fn parse(&self, path: &str, _main: bool, source: &str, import: &mut Import) -> Result<()> {
        let pos = SourcePos::new(path, 0, 0);
        for cmd in source.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (op, arg) = cmd.split_once(':').unwrap_or((cmd, ""));
            match op {
                "label" => {
                    import.add_sym_named_label(&pos, arg)?;
                }
                "b" => {
                    let target = Expr::Ident(Path::single(arg));
                    import.write_inst(
                        pos.clone(),
                        Isa::Arm,
                        tables::arm::b_bl(false),
                        vec![("cond", Expr::Number(0xe)), ("target", target)],
                    );
                }
                "include" => import.include(arg.to_string()),
                _ => {
                    return Err(CoreError::Io {
                        pos: pos.clone(),
                        path: path.to_string(),
                        message: format!("unrecognised scripted command {op:?}"),
                    })
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MapIo {
    files: HashMap<String, String>,
}

impl MapIo {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

impl ProjectIo for MapIo {
    fn read_text(&self, path: &str) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| CoreError::Io {
            pos: SourcePos::new(path, 0, 0),
            path: path.to_string(),
            message: "not in fixture".to_string(),
        })
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        Err(CoreError::Io {
            pos: SourcePos::new(path, 0, 0),
            path: path.to_string(),
            message: "fixture has no binary files".to_string(),
        })
    }
}

#[test]
fn self_branch_through_the_full_project_pipeline() {
    let io = MapIo::new(&[("main.s", "label:start; b:start;")]);
    let mut project = Project::new("main.s", Rc::new(io), Rc::new(ScriptedParser));
    let output = project.make().expect("assembly should succeed");
    assert_eq!(output.rom, vec![0xfe, 0xff, 0xff, 0xea]);
    assert_eq!(output.used_files, vec!["main.s".to_string()]);
}

#[test]
fn included_file_contributes_to_used_files_in_discovery_order() {
    let io = MapIo::new(&[
        ("main.s", "include:child.s; label:start; b:start;"),
        ("child.s", "label:from_child; b:from_child;"),
    ]);
    let mut project = Project::new("main.s", Rc::new(io), Rc::new(ScriptedParser));
    let output = project.make().expect("assembly should succeed");
    // 4 bytes from `child.s`'s self-branch, then 4 from `main.s`'s own.
    assert_eq!(output.rom.len(), 8);
    assert_eq!(output.used_files, vec!["main.s".to_string(), "child.s".to_string()]);
}

#[test]
fn missing_included_file_surfaces_as_a_core_io_error() {
    let io = MapIo::new(&[("main.s", "include:missing.s;")]);
    let mut project = Project::new("main.s", Rc::new(io), Rc::new(ScriptedParser));
    let err = project.make().unwrap_err();
    assert!(matches!(err, CoreError::Io { .. }));
}
