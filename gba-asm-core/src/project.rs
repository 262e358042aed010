use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gba_asm_types::{SourcePos, Value, VirtAddr};

use crate::addr::{BaseFrame, BaseStack};
use crate::error::{CoreError, Result};
use crate::import::Import;
use crate::logger::{Logger, TracingLogger};
use crate::pool;
use crate::section::{MemoryRegion, Section};

/// Reads source text and embedded binary blobs (spec §4.10 "file cache").
/// Implemented by the caller — actual filesystem access, include-path
/// search, and caching of raw bytes are CLI concerns the core has no
/// opinion on (spec §3 "External collaborators").
pub trait ProjectIo {
    fn read_text(&self, path: &str) -> Result<String>;
    fn read_binary(&self, path: &str) -> Result<Vec<u8>>;
}

/// Drives an [`Import`]'s public directive methods from a file's source text
/// (spec §3 "External collaborators": the lexer/parser live outside the
/// core). Implemented by the CLI's parser.
pub trait SourceParser {
    fn parse(&self, path: &str, main: bool, source: &str, import: &mut Import) -> Result<()>;
}

struct CacheEntry {
    import: Import,
    used: bool,
}

/// Outcome of a successful [`Project::make`] (spec §1 "producing a ROM image
/// and a list of used source files").
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub rom: Vec<u8>,
    /// Every cached path that contributed to this build, in file-cache
    /// insertion order (spec §5 "deterministic iteration order").
    pub used_files: Vec<String>,
}

/// Build driver (spec §4.10 "Project orchestration"). Owns the file cache
/// (source Imports and embedded blobs), resolves `.include`/`.importall`/
/// `.importnames` transitively from a main file, and runs the multi-pass
/// build spec §4.9 describes per-Import across every cached one: mark
/// unused, `makeStart`, flatten (assigning addresses and placing literal
/// pools), compute the header CRC, then `makeEnd` each used Import with
/// `failIfNotFound=true` and evict whatever turned out unused.
pub struct Project {
    main_path: String,
    io: Rc<dyn ProjectIo>,
    parser: Rc<dyn SourceParser>,
    logger: Rc<dyn Logger>,
    defines: Vec<(String, Value)>,
    /// `Rc<RefCell<..>>` rather than a plain field: the cross-file symbol
    /// resolver installed on every Import's scope (see
    /// [`crate::scope::ScopeChain::set_import_resolver`]) needs a handle it
    /// can close over and still dereference later, after this `make()` call
    /// has returned the borrow that created it.
    cache: Rc<RefCell<HashMap<String, CacheEntry>>>,
    /// File-cache insertion order (spec §5), preserved across rebuilds so an
    /// unchanged file doesn't change its position just because a sibling was
    /// invalidated and re-discovered later.
    order: Vec<String>,
    iwram_used: u32,
    ewram_used: u32,
}

impl Project {
    pub fn new(main_path: impl Into<String>, io: Rc<dyn ProjectIo>, parser: Rc<dyn SourceParser>) -> Self {
        Self {
            main_path: main_path.into(),
            io,
            parser,
            logger: Rc::new(TracingLogger),
            defines: Vec::new(),
            cache: Rc::new(RefCell::new(HashMap::new())),
            order: Vec::new(),
            iwram_used: 0,
            ewram_used: 0,
        }
    }

    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// `-D name=value` command-line defines, applied to the main file's root
    /// scope before it is parsed (spec C.5).
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.defines.push((name.into(), value));
    }

    /// Drops `path` from the file cache so the next [`Self::make`] call
    /// re-reads and re-parses it from scratch (spec §4.10 "incremental
    /// rebuild": "a caller can invalidate specific cached files between
    /// builds"). A no-op if `path` was never cached.
    pub fn invalidate(&mut self, path: &str) {
        self.cache.borrow_mut().remove(path);
        self.order.retain(|p| p != path);
    }

    /// Runs one full build pass, returning the assembled ROM image and the
    /// set of files it used.
    pub fn make(&mut self) -> Result<BuildOutput> {
        self.iwram_used = 0;
        self.ewram_used = 0;

        self.discover()?;

        for path in &self.order {
            let mut cache = self.cache.borrow_mut();
            let entry = cache.get_mut(path).expect("path in `order` must be cached");
            entry.used = false;
            entry.import.make_start();
        }

        let mut in_progress = HashSet::new();
        let rom = self.flatten_import(&self.main_path.clone(), BaseFrame::rom_default(), 0, &mut in_progress)?;

        // A late-bound pool constant may have settled once every reachable
        // file has flattened (spec §4.9: retried "between flatten and
        // makeEnd"). Loop to a fixpoint rather than a single extra pass,
        // since resolving one file's late entry can itself be exactly what
        // unblocks another. Tracked by the count of still-unresolved
        // entries, not a per-sweep "all done" flag — a constant that's
        // genuinely unresolvable would otherwise keep that flag `false`
        // forever and spin the loop indefinitely.
        let mut prev_remaining = usize::MAX;
        loop {
            let mut remaining = 0usize;
            for path in &self.order {
                let mut cache = self.cache.borrow_mut();
                let Some(entry) = cache.get_mut(path) else { continue };
                if !entry.used {
                    continue;
                }
                entry.import.retry_late_pool_entries(false)?;
                remaining += entry.import.count_unresolved_pool_entries();
            }
            if remaining == 0 || remaining >= prev_remaining {
                break;
            }
            prev_remaining = remaining;
        }

        let crc = compute_crc(&rom, &self.order, &self.cache);

        for path in &self.order {
            self.cache
                .borrow()
                .get(path)
                .map(|e| e.import.scope.clone())
                .map(|scope| scope.set_import_resolver(self.make_resolver()));
        }

        for path in self.order.clone() {
            let mut entry = self.cache.borrow_mut().remove(&path).expect("path in `order` must be cached");
            if entry.used {
                entry.import.retry_late_pool_entries(true)?;
                entry.import.make_end(crc, &*self.logger)?;
            }
            self.cache.borrow_mut().insert(path, entry);
        }

        let used_files: Vec<String> = {
            let cache = self.cache.borrow();
            self.order.iter().filter(|p| cache.get(*p).map(|e| e.used).unwrap_or(false)).cloned().collect()
        };

        self.order.retain(|p| self.cache.borrow().get(p).map(|e| e.used).unwrap_or(false));
        let unused: Vec<String> = {
            let cache = self.cache.borrow();
            cache.iter().filter(|(_, e)| !e.used).map(|(p, _)| p.clone()).collect()
        };
        for path in unused {
            self.cache.borrow_mut().remove(&path);
        }

        // Re-flatten now that makeEnd may have patched bytes (the CRC slot,
        // and anything only resolvable in the final failIfNotFound pass)
        // into sections already placed above; this second pass only copies
        // bytes back out, it does not re-run address assignment (`flatten`
        // isn't called again, `makeStart` was not re-invoked).
        let rom = self.collect_bytes(&self.main_path.clone(), &mut HashSet::new())?;

        Ok(BuildOutput { rom, used_files })
    }

    /// Builds a resolver closure for [`crate::scope::ScopeChain::set_import_resolver`],
    /// capturing a clone of the shared cache handle.
    fn make_resolver(&self) -> crate::scope::ImportResolver {
        let cache = self.cache.clone();
        Rc::new(move |file: &str, path: &gba_asm_expr::ResolvedPath| {
            let cache = cache.borrow();
            match cache.get(file) {
                Some(entry) => entry.import.scope.lookup(path),
                None => gba_asm_expr::LookupResult::NotFound,
            }
        })
    }

    /// Breadth-first discovery of every file transitively reachable from
    /// the main file via `.include`/`.importall`/`.importnames`, parsing
    /// and caching each one exactly once per build (spec §4.10).
    fn discover(&mut self) -> Result<()> {
        let mut worklist = vec![self.main_path.clone()];
        let mut seen = HashSet::new();
        seen.insert(self.main_path.clone());

        while let Some(path) = worklist.pop() {
            let already_cached = self.cache.borrow().contains_key(&path);
            let declared = if already_cached {
                let mut cache = self.cache.borrow_mut();
                let entry = cache.get_mut(&path).expect("just checked contains_key");
                entry.used = true;
                entry.import.declared_files().to_vec()
            } else {
                let main = path == self.main_path;
                let source = self.io.read_text(&path)?;
                let mut import = Import::new(path.clone(), main);
                if main {
                    let pos = SourcePos::synthetic("-D");
                    for (name, value) in self.defines.clone() {
                        import.add_sym_num(&pos, &name, value)?;
                    }
                }
                self.parser.parse(&path, main, &source, &mut import)?;

                let embeds: Vec<(usize, String)> = import
                    .sections
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| match s {
                        Section::Embed { path, .. } => Some((i, path.clone())),
                        _ => None,
                    })
                    .collect();
                for (index, embed_path) in embeds {
                    let data = self.io.read_binary(&embed_path)?;
                    import.set_embed_data(index, data);
                }

                let declared = import.declared_files().to_vec();
                self.cache.borrow_mut().insert(path.clone(), CacheEntry { import, used: true });
                self.order.push(path.clone());
                declared
            };

            for referenced in declared {
                if seen.insert(referenced.clone()) {
                    worklist.push(referenced);
                }
            }
        }
        Ok(())
    }

    /// Flattens `path`'s sections in order, threading a local base stack and
    /// physical-offset cursor through `.base`/`.baseshift` and nested
    /// `.include`s, and allocating IWRAM/EWRAM `Memory` sections from the
    /// Project-wide cursors. Returns the concatenated bytes this file (and
    /// everything it includes) contributes at this position.
    fn flatten_import(&mut self, path: &str, base: BaseFrame, start_length: i64, in_progress: &mut HashSet<String>) -> Result<Vec<u8>> {
        if !in_progress.insert(path.to_string()) {
            return Err(CoreError::CircularInclude { path: path.to_string() });
        }

        let mut entry = self
            .cache
            .borrow_mut()
            .remove(path)
            .ok_or_else(|| CoreError::Io {
                pos: SourcePos::synthetic(path),
                path: path.to_string(),
                message: "referenced but never discovered".to_string(),
            })?;

        let mut out = Vec::new();
        let mut bases = BaseStack::from_root(base);
        let mut cursor = start_length;
        let result = self.flatten_sections(&mut entry.import, &mut bases, &mut cursor, &mut out, in_progress);

        entry.import.notify_labels();
        in_progress.remove(path);
        self.cache.borrow_mut().insert(path.to_string(), entry);
        result?;
        Ok(out)
    }

    fn flatten_sections(
        &mut self,
        import: &mut Import,
        bases: &mut BaseStack,
        cursor: &mut i64,
        out: &mut Vec<u8>,
        in_progress: &mut HashSet<String>,
    ) -> Result<()> {
        for idx in 0..import.sections.len() {
            match &import.sections[idx] {
                Section::Bytes(_) => {
                    let cur_base = bases.current();
                    let Section::Bytes(b) = &mut import.sections[idx] else { unreachable!() };
                    b.flatten(cur_base, *cursor);
                    out.extend_from_slice(&b.buf);
                    *cursor += b.buf.len() as i64;
                }
                Section::Pool(_) => {
                    let cur_base = bases.current();
                    let loads = import.pool_loads_mut(idx);
                    let mut loads = std::mem::take(loads);
                    pool::flatten_pool(&mut import.sections, idx, cur_base, *cursor, &mut loads)?;
                    *import.pool_loads_mut(idx) = loads;
                    let Section::Pool(p) = &import.sections[idx] else { unreachable!() };
                    out.extend_from_slice(&p.bytes.buf);
                    *cursor += p.bytes.buf.len() as i64;
                }
                Section::Align { to, pattern, .. } => {
                    let cur_base = bases.current();
                    let to = (*to).max(1) as i64;
                    let pattern = pattern.clone();
                    let rem = (*cursor).rem_euclid(to);
                    let pad_len = if rem == 0 { 0 } else { (to - rem) as usize };
                    let fill = fill_pattern(&pattern, pad_len);
                    let Section::Align { bytes, .. } = &mut import.sections[idx] else { unreachable!() };
                    bytes.buf = fill;
                    bytes.flatten(cur_base, *cursor);
                    out.extend_from_slice(&bytes.buf);
                    *cursor += bytes.buf.len() as i64;
                }
                Section::Include { path } => {
                    let nested_path = path.clone();
                    let cur_base = bases.current();
                    let nested_cursor = *cursor;
                    let nested = self.flatten_import(&nested_path, cur_base, nested_cursor, in_progress)?;
                    *cursor += nested.len() as i64;
                    out.extend_from_slice(&nested);
                }
                Section::Embed { data, .. } => {
                    out.extend_from_slice(data);
                    *cursor += data.len() as i64;
                }
                Section::Base { addr, overwrite } => {
                    bases.push_or_overwrite(*addr, *cursor, *overwrite);
                }
                Section::BaseShift => {
                    bases.pop();
                }
                Section::Memory { region, size, .. } => {
                    let region = *region;
                    let size = *size;
                    let addr = self.alloc_memory(region, size)?;
                    let Section::Memory { start, .. } = &mut import.sections[idx] else { unreachable!() };
                    *start = Some(addr);
                }
            }
        }
        Ok(())
    }

    fn alloc_memory(&mut self, region: MemoryRegion, size: u32) -> Result<VirtAddr> {
        let used = match region {
            MemoryRegion::Iwram => &mut self.iwram_used,
            MemoryRegion::Ewram => &mut self.ewram_used,
        };
        let available = region.size().saturating_sub(*used);
        if size > available {
            return Err(CoreError::MemoryExhausted {
                pos: SourcePos::synthetic(region.name()),
                region: region.name(),
                requested: size,
                available,
            });
        }
        let addr = VirtAddr::new(region.base() + *used);
        *used += size;
        Ok(addr)
    }

    /// Re-derives a file's flattened output bytes without re-running
    /// address assignment — used after `makeEnd` has patched bytes into
    /// already-flattened sections (the CRC slot, and anything resolved only
    /// in the terminal pass), so the returned ROM image reflects those
    /// patches.
    fn collect_bytes(&self, path: &str, in_progress: &mut HashSet<String>) -> Result<Vec<u8>> {
        if !in_progress.insert(path.to_string()) {
            return Err(CoreError::CircularInclude { path: path.to_string() });
        }
        let mut out = Vec::new();
        {
            // A plain `.borrow()`, held for the loop body: recursing into
            // `collect_bytes` for a nested `Include` only ever takes another
            // shared borrow of the same `RefCell`, which is allowed to
            // overlap with this one (unlike a `borrow_mut()`).
            let cache = self.cache.borrow();
            let Some(entry) = cache.get(path) else {
                in_progress.remove(path);
                return Ok(Vec::new());
            };
            for section in &entry.import.sections {
                match section {
                    Section::Bytes(b) => out.extend_from_slice(&b.buf),
                    Section::Pool(p) => out.extend_from_slice(&p.bytes.buf),
                    Section::Align { bytes, .. } => out.extend_from_slice(&bytes.buf),
                    Section::Embed { data, .. } => out.extend_from_slice(data),
                    Section::Include { path: nested } => {
                        let nested_bytes = self.collect_bytes(nested, in_progress)?;
                        out.extend_from_slice(&nested_bytes);
                    }
                    Section::Base { .. } | Section::BaseShift | Section::Memory { .. } => {}
                }
            }
        }
        in_progress.remove(path);
        Ok(out)
    }
}

/// Fills `len` bytes by repeating `pattern` as many whole times as fit,
/// zero-padding any remainder (spec §4.6 "Align": a fill pattern wider than
/// the needed padding is simply not used).
fn fill_pattern(pattern: &[u8], len: usize) -> Vec<u8> {
    if pattern.is_empty() {
        return vec![0; len];
    }
    let mut out = Vec::with_capacity(len);
    while out.len() + pattern.len() <= len {
        out.extend_from_slice(pattern);
    }
    out.resize(len, 0);
    out
}

/// Spec §4.10 step 3: `crc = (-0x19 - sum(bytes[0xa0..0xbd))) & 0xff`, or
/// unavailable if the ROM doesn't yet reach that range.
fn compute_crc(rom: &[u8], order: &[String], cache: &Rc<RefCell<HashMap<String, CacheEntry>>>) -> Option<u8> {
    const LO: usize = 0xa0;
    const HI: usize = 0xbd;
    if rom.len() < HI {
        return None;
    }
    for path in order {
        let cache = cache.borrow();
        if let Some(entry) = cache.get(path) {
            if entry.used && entry.import.has_unresolved_byte_in(VirtAddr::new(0x0800_0000 + LO as u32), VirtAddr::new(0x0800_0000 + HI as u32)) {
                return None;
            }
        }
    }
    let sum: i64 = rom[LO..HI].iter().map(|b| *b as i64).sum();
    Some(((-0x19i64 - sum).rem_euclid(256)) as u8)
}
