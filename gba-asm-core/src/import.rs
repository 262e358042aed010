use std::collections::HashMap;
use std::rc::Rc;

use gba_asm_expr::{Expr, Mode};
use gba_asm_isa::{tables, CodePart, DataType, Isa, MemKind, TypedMemOp, Value};
use gba_asm_types::{Reg, SourcePos, VirtAddr};

use crate::error::{CoreError, Result};
use crate::logger::Logger;
use crate::pending::{Operand, OperandSet, PendingKind, PendingWrite, PendingWriteId};
use crate::pool::{self, PoolLoad};
use crate::rewrite::RewriteHandle;
use crate::scope::{AddrSlot, ScopeChain};
use crate::section::{AlignFill, BytesSection, MemoryRegion, PoolSection, Section};
use crate::struct_layout::StructLayout;

/// One assembled source file (spec §3 "Import"). Owns its sections, pending
/// writes, and definition tables exclusively; a `Project` owns the set of
/// Imports and drives `flatten`/`makeEnd` across all of them (spec §3
/// "Ownership").
pub struct Import {
    pub path: String,
    pub main: bool,
    pub scope: Rc<ScopeChain>,
    pub sections: Vec<Section>,
    pending: HashMap<PendingWriteId, PendingWrite>,
    /// Append order, for the deterministic retry order spec §5 requires.
    pending_order: Vec<PendingWriteId>,
    /// Pool-load ids queued since the last `.pool` directive (or file
    /// start); drained into a fresh `Pool` section's load list by `pool()`.
    uncaptured_pool_loads: Vec<PendingWriteId>,
    /// One entry per emitted `Pool` section, keyed by its index in
    /// `sections`, holding the pool loads it captured. Kept here (not
    /// dropped after the first flatten) so a later build pass can reuse
    /// whatever the previous pass already memoised (spec §4.4 "Caching
    /// policy").
    captured_pool_loads: HashMap<usize, Vec<PoolLoad>>,
    /// Byte slots reserved by `writeCRC`, patched by `makeEnd`.
    pending_crc: Vec<RewriteHandle>,
    /// `name`, address slot, and position marker for every `addSymNamedLabel`
    /// call, notified once the owning section has an address (spec §4.7).
    named_labels: Vec<(String, AddrSlot, RewriteHandle)>,
    /// Address slot and position marker for every `begin(name)` block,
    /// notified the same way but without touching the forward/reverse label
    /// tables (a `begin` name is looked up directly, not through them).
    addr_markers: Vec<(AddrSlot, RewriteHandle)>,
    /// `name`, address slot, and owning `Memory` section index for every
    /// IWRAM/EWRAM-allocated struct instance (spec §9 "Struct `base`
    /// expressions for IWRAM/EWRAM-allocated structs are late-bound to
    /// `struct.memoryStart`"). Notified from `Section::Memory::start`
    /// instead of a `RewriteHandle`, since that section contributes no ROM
    /// bytes to rewrite into.
    memory_labels: Vec<(String, AddrSlot, usize)>,
    debug_log_disabled: bool,
    stdlib_defined: bool,
    next_id_counter: u64,
    /// Every filename this Import has named via `.include`/`.importall`/
    /// `.importnames`, in first-mention order — the Project's discovery
    /// worklist walks this instead of re-deriving it from `scope`, which
    /// doesn't expose import defs for enumeration (spec §4.10 "file cache
    /// ... include/import orchestration"). `.embed` targets are not source
    /// files to parse, so the Project finds those by scanning `sections`.
    declared_files: Vec<String>,
}

impl Import {
    pub fn new(path: impl Into<String>, main: bool) -> Self {
        Self {
            path: path.into(),
            main,
            scope: ScopeChain::new(),
            sections: Vec::new(),
            pending: HashMap::new(),
            pending_order: Vec::new(),
            uncaptured_pool_loads: Vec::new(),
            captured_pool_loads: HashMap::new(),
            pending_crc: Vec::new(),
            named_labels: Vec::new(),
            addr_markers: Vec::new(),
            memory_labels: Vec::new(),
            debug_log_disabled: false,
            stdlib_defined: false,
            next_id_counter: 0,
            declared_files: Vec::new(),
        }
    }

    /// Filenames this Import has named via `.include`/`.embed`/`.importall`/
    /// `.importnames`, for the Project's discovery worklist.
    pub fn declared_files(&self) -> &[String] {
        &self.declared_files
    }

    fn next_id(&mut self) -> PendingWriteId {
        let id = PendingWriteId(self.next_id_counter);
        self.next_id_counter += 1;
        id
    }

    fn queue(&mut self, pos: SourcePos, kind: PendingKind) -> PendingWriteId {
        let id = self.next_id();
        if let PendingKind::PoolLoad { captured: false, .. } = &kind {
            self.uncaptured_pool_loads.push(id);
        }
        self.pending_order.push(id);
        self.pending.insert(
            id,
            PendingWrite {
                id,
                pos,
                scope: self.scope.clone(),
                kind,
            },
        );
        id
    }

    /// Ensures the last section is a `Bytes` section, pushing a fresh one if
    /// the most recent section is something else (a `.pool`/`.align`/
    /// `.include`/etc. directive was the last thing emitted).
    fn open_bytes(&mut self) -> usize {
        if let Some(Section::Bytes(_)) = self.sections.last() {
            return self.sections.len() - 1;
        }
        self.sections.push(Section::Bytes(BytesSection::default()));
        self.sections.len() - 1
    }

    fn reserve_bytes(&mut self, width: usize) -> RewriteHandle {
        let idx = self.open_bytes();
        let Section::Bytes(b) = &mut self.sections[idx] else { unreachable!() };
        let offset = b.reserve(width);
        RewriteHandle::new(idx, offset, width)
    }

    /// A zero-width handle marking the current write position, for labels
    /// and `begin` blocks — they need an address, not a byte slot.
    fn current_offset(&mut self) -> RewriteHandle {
        let idx = self.open_bytes();
        let Section::Bytes(b) = &self.sections[idx] else { unreachable!() };
        RewriteHandle::new(idx, b.buf.len(), 0)
    }

    fn write_immediate_bytes(&mut self, bytes: &[u8]) {
        let idx = self.open_bytes();
        let Section::Bytes(b) = &mut self.sections[idx] else { unreachable!() };
        let offset = b.reserve(bytes.len());
        b.write_at(offset, bytes);
    }

    // -- naming (spec §6 "addSymNum, addSymConst, addSymNamedLabel, addSymStruct") --

    pub fn add_sym_num(&mut self, pos: &SourcePos, name: &str, value: Value) -> Result<()> {
        self.scope.define_num(pos, name, value)
    }

    pub fn add_sym_const(&mut self, pos: &SourcePos, name: &str, expr: Expr) -> Result<()> {
        self.scope.define_const(pos, name, expr, self.scope.clone())
    }

    pub fn add_sym_named_label(&mut self, pos: &SourcePos, name: &str) -> Result<()> {
        let slot = self.scope.define_label(pos, name)?;
        let handle = self.current_offset();
        self.named_labels.push((name.to_string(), slot, handle));
        Ok(())
    }

    pub fn add_sym_struct(&mut self, pos: &SourcePos, name: &str, layout: StructLayout) -> Result<()> {
        self.scope.define_struct(pos, name, layout)
    }

    /// The full layout of a struct defined by name in the enclosing scope,
    /// for resolving a `Struct.member` typed-memory operand to a concrete
    /// offset before queueing the load/store (spec §4.3, §4.8).
    pub fn lookup_struct(&self, name: &str) -> Option<Rc<StructLayout>> {
        self.scope.lookup_struct(name)
    }

    /// Bulk-defines system names, once per file (spec §6 "stdlib"). Which
    /// names those are is left to the caller — the core has no opinion on a
    /// standard library's contents, only that a second call is a no-op
    /// rather than a redefinition error.
    pub fn stdlib(&mut self, define: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.stdlib_defined {
            return Ok(());
        }
        define(self)?;
        self.stdlib_defined = true;
        Ok(())
    }

    pub fn import_all(&mut self, pos: &SourcePos, name: &str, filename: &str) -> Result<()> {
        self.declared_files.push(filename.to_string());
        self.scope.define_import_all(pos, name, filename)
    }

    pub fn import_names(&mut self, pos: &SourcePos, filename: &str, names: &[String]) -> Result<()> {
        self.declared_files.push(filename.to_string());
        for name in names {
            self.scope.define_import_name(pos, name, filename, name)?;
        }
        Ok(())
    }

    // -- content sections (spec §6 "include, embed") --

    pub fn include(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.declared_files.push(path.clone());
        self.sections.push(Section::Include { path });
    }

    /// Reserves an `Embed` section for `path`; its bytes aren't known yet —
    /// the Project, which owns file I/O and the embedded-blob cache, fills
    /// them in via [`Self::set_embed_data`] once it has read the file. Not
    /// added to `declared_files`: an embedded file is raw bytes, not another
    /// Import to parse, so the Project discovers it by scanning `sections`
    /// directly instead of walking the worklist.
    pub fn embed(&mut self, path: impl Into<String>) -> usize {
        self.sections.push(Section::Embed {
            path: path.into(),
            data: Vec::new(),
        });
        self.sections.len() - 1
    }

    pub fn set_embed_data(&mut self, index: usize, data: Vec<u8>) {
        if let Some(Section::Embed { data: slot, .. }) = self.sections.get_mut(index) {
            *slot = data;
        }
    }

    // -- scope / conditional nesting (spec §6 "beginStart, enterScope, ifStart, end") --

    pub fn begin_start(&mut self, pos: &SourcePos, name: Option<&str>) -> Result<()> {
        let addr = self.scope.begin(name, pos)?;
        let handle = self.current_offset();
        self.addr_markers.push((addr, handle));
        Ok(())
    }

    /// A named scope is just a `begin` block that requires its name (spec
    /// §6 lists `beginStart(name?)` and `enterScope(name)` separately but
    /// gives `enterScope` no behaviour of its own beyond the name being
    /// mandatory).
    pub fn enter_scope(&mut self, pos: &SourcePos, name: &str) -> Result<()> {
        self.begin_start(pos, Some(name))
    }

    pub fn if_start(&mut self, active: bool) {
        self.scope.if_start(active);
    }

    /// Pops the current level. If it pushed a `.base` frame (spec §4.6),
    /// also emits a matching `BaseShift` section so the base stack the
    /// flatten pass maintains stays lexically balanced — `end()` doesn't
    /// touch any base-stack state directly, since that stack only exists
    /// as a transient the Project's flatten traversal threads through
    /// `Section::Base`/`BaseShift` entries in emission order.
    pub fn end(&mut self) {
        if self.scope.top_shifted_base() {
            self.sections.push(Section::BaseShift);
        }
        self.scope.end();
    }

    // -- literal pool (spec §6 "pool") --

    /// Drains every pool-load queued since the last `.pool` (or file start)
    /// into a fresh `Pool` section, returning its index.
    pub fn pool(&mut self) -> usize {
        let ids = std::mem::take(&mut self.uncaptured_pool_loads);
        let mut end_align = 1u32;
        let mut loads = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(write) = self.pending.remove(&id) else { continue };
            self.pending_order.retain(|x| *x != id);
            let PendingWrite { pos, scope, kind, .. } = write;
            let PendingKind::PoolLoad {
                isa,
                width,
                signed,
                reg,
                cond,
                target,
                rewrite,
                ..
            } = kind
            else {
                unreachable!("uncaptured_pool_loads only ever holds PoolLoad ids")
            };
            end_align = end_align.max(match isa {
                Isa::Arm => 4,
                Isa::Thumb => 2,
            });
            loads.push(PoolLoad {
                id,
                isa,
                width,
                signed,
                reg,
                cond,
                target,
                rewrite,
                scope,
                pos,
            });
        }
        let captured = loads.iter().map(|l| l.id).collect();
        self.sections.push(Section::Pool(PoolSection {
            captured,
            end_align,
            ..Default::default()
        }));
        let index = self.sections.len() - 1;
        self.captured_pool_loads.insert(index, loads);
        index
    }

    /// The pool loads captured by the `Pool` section at `section_index`,
    /// for the Project's flatten pass to hand to [`pool::flatten_pool`].
    /// Mutable so memoised targets persist across build passes.
    pub fn pool_loads_mut(&mut self, section_index: usize) -> &mut Vec<PoolLoad> {
        self.captured_pool_loads.entry(section_index).or_default()
    }

    // -- alignment, header helpers (spec §6 "align, writeLogo, writeTitle, writeCRC") --

    /// Resolves `fill` to concrete bytes using the mode active right now
    /// (spec §4.6 "Align"): a `Nop` fill must be decided at the point the
    /// directive appears, since the scope's mode stack has moved on by the
    /// time a build pass flattens this section.
    pub fn align(&mut self, to: u32, fill: AlignFill) {
        let pattern = match fill {
            AlignFill::Byte(b) => vec![b],
            AlignFill::Nop => match self.scope.current_mode() {
                Some(Mode::Thumb) => vec![0xc0, 0x46],
                _ => vec![0x00, 0x00, 0xa0, 0xe1],
            },
        };
        self.sections.push(Section::Align {
            pattern,
            to,
            bytes: BytesSection::default(),
        });
    }

    /// Writes the fixed 156-byte header logo image. The core has no opinion
    /// on the bitmap itself (it's caller-supplied, not baked into the
    /// assembler) — only that it lands at the current position verbatim.
    pub fn write_logo(&mut self, logo: &[u8; 156]) {
        self.write_immediate_bytes(logo);
    }

    /// 12-byte title field, zero-padded, truncated past 12 bytes.
    pub fn write_title(&mut self, title: &str) {
        let mut buf = [0u8; 12];
        let bytes = title.as_bytes();
        let n = bytes.len().min(12);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.write_immediate_bytes(&buf);
    }

    pub fn write_crc(&mut self) {
        let handle = self.reserve_bytes(1);
        self.pending_crc.push(handle);
    }

    // -- instructions (spec §6 "writeInstARM/Thumb, writeTypedMemARM/Thumb, writePoolARM/Thumb") --

    /// Queues an instruction whose code-parts the parser/instruction table
    /// already selected; this is the ISA-agnostic core of
    /// `writeInstARM`/`writeInstThumb`.
    pub fn write_inst(&mut self, pos: SourcePos, isa: Isa, parts: Vec<CodePart>, operands: Vec<(&'static str, Expr)>) -> PendingWriteId {
        let width = match isa {
            Isa::Arm => 4,
            Isa::Thumb => 2,
        };
        let rewrite = self.reserve_bytes(width);
        let mut set = OperandSet::new();
        for (name, expr) in operands {
            set.set(name, Operand::expr(expr));
        }
        self.queue(
            pos,
            PendingKind::Instruction {
                isa,
                parts: Rc::new(parts),
                operands: set,
                rewrite,
            },
        )
    }

    /// Lowers a struct-resolved typed memory access straight to its
    /// concrete code-parts and operand values (spec §4.3): the offset a
    /// struct lookup produces is already a compile-time constant, so there
    /// is nothing left to defer except the usual "is this section's address
    /// known yet" question every instruction pending-write already handles.
    pub fn write_typed_mem(&mut self, pos: SourcePos, isa: Isa, op: TypedMemOp, cond: u32) -> Result<PendingWriteId> {
        let (parts, operands) = lower_typed_mem(isa, &op, cond, &pos)?;
        let width = match isa {
            Isa::Arm => 4,
            Isa::Thumb => 2,
        };
        let rewrite = self.reserve_bytes(width);
        let mut set = OperandSet::new();
        for (name, value) in operands {
            set.set(name, Operand::number(value));
        }
        Ok(self.queue(
            pos,
            PendingKind::Instruction {
                isa,
                parts: Rc::new(parts),
                operands: set,
                rewrite,
            },
        ))
    }

    pub fn write_pool(&mut self, pos: SourcePos, isa: Isa, width: u32, signed: bool, reg: Reg, cond: u32, target: Expr) -> PendingWriteId {
        let inst_width = match isa {
            Isa::Arm => 4,
            Isa::Thumb => 2,
        };
        let rewrite = self.reserve_bytes(inst_width);
        self.queue(
            pos,
            PendingKind::PoolLoad {
                isa,
                width,
                signed,
                reg,
                cond,
                target: Operand::expr(target),
                rewrite,
                captured: false,
            },
        )
    }

    // -- data (spec §6 "writeData, writeDataFill, writeStr") --

    pub fn write_data(&mut self, pos: SourcePos, width: u32, value: Expr) -> PendingWriteId {
        let rewrite = self.reserve_bytes(width as usize);
        self.queue(pos, PendingKind::DataLiteral { value: Operand::expr(value), width, rewrite })
    }

    pub fn write_data_fill(&mut self, pos: SourcePos, width: u32, count: usize, fill: Expr) -> PendingWriteId {
        let rewrite = self.reserve_bytes(width as usize * count);
        self.queue(
            pos,
            PendingKind::DataFill {
                fill: Operand::expr(fill),
                width,
                count,
                rewrite,
            },
        )
    }

    /// Writes a NUL-terminated byte string immediately — `.str` takes
    /// literal text, not an expression, so there's nothing to defer.
    pub fn write_str(&mut self, s: &str) {
        let mut bytes: Vec<u8> = s.bytes().collect();
        bytes.push(0);
        self.write_immediate_bytes(&bytes);
    }

    // -- diagnostics (spec §6 "printf, assert, debugLog, debugExit") --

    pub fn printf(&mut self, pos: SourcePos, fmt: String, args: Vec<Expr>, as_error: bool) -> PendingWriteId {
        self.queue(
            pos,
            PendingKind::Printf {
                fmt,
                args: args.into_iter().map(Operand::expr).collect(),
                as_error,
            },
        )
    }

    pub fn assert(&mut self, pos: SourcePos, msg: String, expr: Expr) -> PendingWriteId {
        self.queue(pos, PendingKind::Assert { msg, expr: Operand::expr(expr) })
    }

    /// `None` once `.debugExit` has disabled debug logging for the rest of
    /// the file.
    pub fn debug_log(&mut self, pos: SourcePos, fmt: String, args: Vec<Expr>) -> Option<PendingWriteId> {
        if self.debug_log_disabled {
            return None;
        }
        Some(self.queue(
            pos,
            PendingKind::DebugLog {
                fmt,
                args: args.into_iter().map(Operand::expr).collect(),
            },
        ))
    }

    pub fn debug_exit(&mut self) {
        self.debug_log_disabled = true;
    }

    // -- level state (spec §6 "setBase, setMode, setRegs") --

    pub fn set_base(&mut self, addr: VirtAddr, overwrite: bool) {
        self.sections.push(Section::Base { addr, overwrite });
        if !overwrite {
            self.scope.mark_shifted_base();
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.scope.set_mode(mode);
    }

    /// The decoding mode active at the current scope level, for a parser
    /// that needs to pick ARM vs Thumb instruction tables without keeping
    /// its own shadow copy of `.arm`/`.thumb` state across `begin`/`end`.
    pub fn current_mode(&self) -> Option<Mode> {
        self.scope.current_mode()
    }

    pub fn set_regs(&mut self, aliases: &[(String, Reg)]) {
        for (name, reg) in aliases {
            self.scope.set_reg_alias(name, *reg);
        }
    }

    // -- static memory (IWRAM/EWRAM struct allocation) --

    pub fn alloc_memory(&mut self, region: MemoryRegion, size: u32) -> usize {
        self.sections.push(Section::Memory { region, size, start: None });
        self.sections.len() - 1
    }

    pub fn memory_start(&self, section_index: usize) -> Option<VirtAddr> {
        match self.sections.get(section_index) {
            Some(Section::Memory { start, .. }) => *start,
            _ => None,
        }
    }

    /// Binds `name` to the start address of the `Memory` section at
    /// `section_index`, defined once that section's allocation runs (spec
    /// §9 `struct.memoryStart`).
    pub fn add_sym_memory_label(&mut self, pos: &SourcePos, name: &str, section_index: usize) -> Result<()> {
        let slot = self.scope.define_label(pos, name)?;
        self.memory_labels.push((name.to_string(), slot, section_index));
        Ok(())
    }

    // -- finalisation (spec §4.9) --

    /// Opportunistic sweep: one more early-pass attempt over every pending
    /// write, keeping whatever now succeeds.
    pub fn end_of_file(&mut self, logger: &dyn Logger) -> Result<()> {
        self.retry_pending(logger, false)
    }

    /// Prepares a fresh build pass: clears every address slot so `flatten`
    /// re-derives them from scratch.
    pub fn make_start(&mut self) {
        for section in &mut self.sections {
            section.clear_addresses();
        }
    }

    /// Terminal pass: patches every pending CRC slot, then retries every
    /// remaining pending write with `failIfNotFound=true` (spec §4.9).
    /// Struct layouts need no separate re-walk here: the only
    /// address-dependent struct invariant (an IWRAM/EWRAM-allocated
    /// struct's start respecting its own alignment) is enforced when the
    /// `Memory` section allocates `start`, not after the fact.
    pub fn make_end(&mut self, crc: Option<u8>, logger: &dyn Logger) -> Result<()> {
        for handle in &self.pending_crc {
            let Some(crc) = crc else { return Err(CoreError::CrcUnavailable) };
            handle.write(&mut self.sections, &[crc]);
        }
        for (_, pool) in self.captured_pool_loads.iter_mut() {
            let _ = pool;
        }
        self.retry_pending(logger, true)
    }

    /// Every pool entry still waiting on a late write, across every `Pool`
    /// section this Import has emitted — called by the Project between
    /// `flatten` and `makeEnd` so a late constant gets one more chance once
    /// other files' symbols might have settled.
    pub fn retry_late_pool_entries(&mut self, fail_if_not_found: bool) -> Result<bool> {
        let mut all_done = true;
        for (index, _) in self.captured_pool_loads.clone().iter() {
            if let Some(Section::Pool(pool)) = self.sections.get_mut(*index) {
                if !pool::retry_late_entries(pool, fail_if_not_found)? {
                    all_done = false;
                }
            }
        }
        Ok(all_done)
    }

    /// How many pool entries, across every `Pool` section, are still
    /// waiting on a late write. The Project's fixpoint loop over
    /// [`Self::retry_late_pool_entries`] uses this (not that method's
    /// `bool`) to detect progress: "all done" can stay `false` forever for a
    /// constant that's genuinely stuck, so only a falling count proves the
    /// loop is still making headway.
    pub fn count_unresolved_pool_entries(&self) -> usize {
        self.sections
            .iter()
            .map(|section| match section {
                Section::Pool(pool) => pool.entries.iter().filter(|e| e.late.is_some()).count(),
                _ => 0,
            })
            .sum()
    }

    /// Fills in every label/begin-block address slot whose owning section
    /// now has an address (spec §4.7); safe to call repeatedly, and must be
    /// called again after every `flatten` since `makeStart` clears them all.
    pub fn notify_labels(&mut self) {
        for (name, slot, handle) in &self.named_labels {
            if let Some(addr) = handle.addr(&self.sections) {
                *slot.borrow_mut() = Some(addr);
                self.scope.notify_label_addr(name, addr);
            }
        }
        for (slot, handle) in &self.addr_markers {
            if let Some(addr) = handle.addr(&self.sections) {
                *slot.borrow_mut() = Some(addr);
            }
        }
        for (name, slot, section_index) in &self.memory_labels {
            if let Some(addr) = self.memory_start(*section_index) {
                *slot.borrow_mut() = Some(addr);
                self.scope.notify_label_addr(name, addr);
            }
        }
    }

    /// Whether any still-pending write's rewrite slot overlaps the virtual
    /// address range `[lo, hi)`, once it has an address at all. Used by the
    /// CRC pass (spec §4.6 "Header/CRC") to refuse computing a checksum over
    /// bytes that haven't actually been decided yet.
    pub fn has_unresolved_byte_in(&self, lo: VirtAddr, hi: VirtAddr) -> bool {
        for write in self.pending.values() {
            let rewrite = match &write.kind {
                PendingKind::Instruction { rewrite, .. }
                | PendingKind::DataLiteral { rewrite, .. }
                | PendingKind::DataFill { rewrite, .. }
                | PendingKind::PoolLoad { rewrite, .. } => Some(rewrite),
                PendingKind::Printf { .. } | PendingKind::DebugLog { .. } | PendingKind::Assert { .. } => None,
            };
            let Some(rewrite) = rewrite else { continue };
            let Some(addr) = rewrite.addr(&self.sections) else {
                continue;
            };
            let end = addr.offset(rewrite.width as i64);
            if addr.0 < hi.0 && end.0 > lo.0 {
                return true;
            }
        }
        false
    }

    fn retry_pending(&mut self, logger: &dyn Logger, fail_if_not_found: bool) -> Result<()> {
        let ids = self.pending_order.clone();
        let mut done = Vec::new();
        for id in &ids {
            let Some(write) = self.pending.get_mut(id) else { continue };
            if write.attempt_write(&mut self.sections, logger, fail_if_not_found)? {
                done.push(*id);
            }
        }
        for id in done {
            self.pending.remove(&id);
            self.pending_order.retain(|x| x != &id);
        }
        Ok(())
    }
}

/// Maps a struct-resolved typed memory access to concrete code-parts and
/// resolved operand values (spec §4.3). ARM only implements the
/// immediate-offset kinds — `tables::arm` has no register-offset load/store
/// shape to lower into, since the full barrel-shifter register-offset form
/// isn't modelled by any ARM code-part kind this encoder understands.
fn lower_typed_mem(isa: Isa, op: &TypedMemOp, cond: u32, pos: &SourcePos) -> Result<(Vec<CodePart>, Vec<(&'static str, Value)>)> {
    let load = matches!(op.kind, MemKind::LdrImm | MemKind::LdrReg);
    let reg_offset = matches!(op.kind, MemKind::LdrReg | MemKind::StrReg);
    let width = op.data_type.width_bytes();
    let signed = op.data_type.is_signed();

    match isa {
        Isa::Arm => {
            if reg_offset {
                return Err(CoreError::StructMemberNotFound {
                    pos: pos.clone(),
                    name: "<register-offset ARM typed memory access is not supported>".to_string(),
                });
            }
            let parts = match width {
                4 => tables::arm::ldr_str_imm(load, false),
                1 if !load || !signed => tables::arm::ldr_str_imm(load, true),
                1 => tables::arm::ldrh_strh(true, true, false),
                2 => tables::arm::ldrh_strh(load, load && signed, true),
                w => unreachable!("unsupported ARM typed-mem width {w}"),
            };
            Ok((
                parts,
                vec![
                    ("cond", cond as Value),
                    ("rd", op.reg.0 as Value),
                    ("rn", op.base.0 as Value),
                    ("offset", op.offset_or_index),
                ],
            ))
        }
        Isa::Thumb => {
            let parts = match (reg_offset, width) {
                (false, 4) => tables::thumb::ldr_str_imm(load, false),
                (false, 1) => tables::thumb::ldr_str_imm(load, true),
                (false, 2) => tables::thumb::ldrh_strh_imm(load),
                (true, 4) => tables::thumb::ldr_str_reg(load, false, false),
                (true, w) if w == 1 || w == 2 => tables::thumb::ldr_str_reg(load, true, load && signed),
                (_, w) => unreachable!("unsupported Thumb typed-mem width {w}"),
            };
            let offset_operand = if reg_offset { "ro" } else { "offset" };
            Ok((
                parts,
                vec![("rd", op.reg.0 as Value), ("rb", op.base.0 as Value), (offset_operand, op.offset_or_index)],
            ))
        }
    }
}

/// Only the `DataType` size/sign helpers are used directly by
/// `lower_typed_mem` above; this re-export keeps callers of this module from
/// needing a second `use` for a type they already pass in via `TypedMemOp`.
pub use gba_asm_isa::DataType as TypedMemDataType;
