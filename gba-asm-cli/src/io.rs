//! Filesystem-backed `ProjectIo` (spec §4.10 "file cache": actual disk
//! access is a CLI concern, not the core's). Paths written in source as
//! `.include "foo.s"` are resolved by trying the including file's own
//! directory first, then every `-I` search directory in order, matching
//! a C preprocessor's `#include "..."` search order.

use std::path::{Path, PathBuf};

use gba_asm_core::{CoreError, ProjectIo, Result};
use gba_asm_types::SourcePos;

pub struct FsProjectIo {
    search_dirs: Vec<PathBuf>,
}

impl FsProjectIo {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// The first existing candidate among `path` itself and `path` joined
    /// onto each `-I` directory, in order. Falls back to `path` unchanged
    /// (so the eventual read fails with the name the user actually typed).
    fn resolve(&self, path: &str) -> PathBuf {
        let direct = Path::new(path);
        if direct.is_file() {
            return direct.to_path_buf();
        }
        for dir in &self.search_dirs {
            let candidate = dir.join(path);
            if candidate.is_file() {
                return candidate;
            }
        }
        direct.to_path_buf()
    }

    fn io_error(path: &str, source: std::io::Error) -> CoreError {
        CoreError::Io {
            pos: SourcePos::new(path, 0, 0),
            path: path.to_string(),
            message: source.to_string(),
        }
    }
}

impl ProjectIo for FsProjectIo {
    fn read_text(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path);
        std::fs::read_to_string(&resolved).map_err(|e| Self::io_error(path, e))
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path);
        std::fs::read(&resolved).map_err(|e| Self::io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_direct_path() {
        let dir = std::env::temp_dir().join("gba_asm_cli_io_test_direct");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("main.s");
        std::fs::File::create(&file).unwrap().write_all(b".arm").unwrap();

        let io = FsProjectIo::new(vec![]);
        let text = io.read_text(file.to_str().unwrap()).unwrap();
        assert_eq!(text, ".arm");
    }

    #[test]
    fn falls_back_to_search_dirs() {
        let dir = std::env::temp_dir().join("gba_asm_cli_io_test_search");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("included.s");
        std::fs::File::create(&file).unwrap().write_all(b".thumb").unwrap();

        let io = FsProjectIo::new(vec![dir]);
        let text = io.read_text("included.s").unwrap();
        assert_eq!(text, ".thumb");
    }

    #[test]
    fn missing_file_is_a_core_io_error() {
        let io = FsProjectIo::new(vec![]);
        let err = io.read_text("does-not-exist.s").unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
