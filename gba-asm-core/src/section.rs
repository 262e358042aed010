use std::rc::Rc;

use gba_asm_types::VirtAddr;

use crate::addr::BaseFrame;
use crate::pending::PendingWriteId;
use crate::scope::ScopeChain;

/// A contiguous run of emitted bytes (spec §3 "Section (Bytes)"). Owns the
/// storage every [`crate::rewrite::RewriteHandle`] in this section patches
/// into; `base`/`start_length` are populated by [`flatten`](Self::flatten)
/// and cleared by `makeStart` (spec §4.9).
#[derive(Debug, Clone, Default)]
pub struct BytesSection {
    pub buf: Vec<u8>,
    pub base: Option<BaseFrame>,
    pub start_length: Option<i64>,
}

impl BytesSection {
    /// Reserves `width` zero bytes at the end of the buffer, returning the
    /// byte offset address-receivers should record.
    pub fn reserve(&mut self, width: usize) -> usize {
        let offset = self.buf.len();
        self.buf.resize(self.buf.len() + width, 0);
        offset
    }

    pub fn flatten(&mut self, base: BaseFrame, start_length: i64) {
        self.base = Some(base);
        self.start_length = Some(start_length);
    }

    pub fn clear(&mut self) {
        self.base = None;
        self.start_length = None;
    }

    /// Virtual address of byte offset `i`, per spec §4.6's formula
    /// `base.addr + startLength + i − base.relativeTo` (folded into
    /// [`BaseFrame::addr_at`]).
    pub fn addr_at(&self, i: usize) -> Option<VirtAddr> {
        let base = self.base?;
        let start_length = self.start_length?;
        Some(base.addr_at(start_length + i as i64))
    }

    pub fn write_at(&mut self, i: usize, bytes: &[u8]) {
        self.buf[i..i + bytes.len()].copy_from_slice(bytes);
    }
}

/// One placed pool constant (spec §4.5 "Allocation"). Built up as this
/// pool's captured pool-loads are processed in append order; later loads
/// with an equal resolved value and width reuse an earlier entry's offset
/// instead of allocating new space (spec §4.5 "Deduplication").
#[derive(Debug, Clone)]
pub struct PoolEntry {
    /// `None` while the constant's expression is still unresolved — the
    /// slot is reserved (and zero-filled) but its bytes are a "late-write
    /// closure" pending a future retry (spec §4.5 point 3).
    pub value: Option<i64>,
    pub width: u32,
    pub offset: usize,
    /// The operand this entry is still waiting on, and the scope chain to
    /// resolve it against, retained only while `value.is_none()`.
    pub late: Option<(crate::pending::Operand, Rc<ScopeChain>)>,
}

/// A literal-pool region (spec §4.5). Captures the ids of pending pool-load
/// writes appended since the previous `Pool` section (or file start); the
/// Import still owns their lifecycle, the pool section only borrows them
/// for resolution (spec §3 "Ownership").
#[derive(Debug, Clone, Default)]
pub struct PoolSection {
    pub captured: Vec<PendingWriteId>,
    /// Required trailing alignment: 4 for ARM, 2 for Thumb, 1 otherwise
    /// (spec §4.5 "End-align").
    pub end_align: u32,
    pub bytes: BytesSection,
    /// Entries placed so far in this pass (spec §4.5 "Allocation"/
    /// "Deduplication"); rebuilt from scratch every `flatten`, discarded by
    /// `makeStart` along with everything else address-shaped (spec §9:
    /// "after `makeStart`, no pool write closure from the previous pass may
    /// observably affect the new pass").
    pub entries: Vec<PoolEntry>,
}

/// Fill request for an `.align` directive (spec §4.6 "Align"), as the caller
/// states it. [`crate::import::Import::align`] resolves `Nop` to a concrete
/// byte pattern immediately (using the mode active at the directive), since
/// by the time a build pass flattens this section the scope state at the
/// point `.align` was written is no longer observable.
#[derive(Debug, Clone, Copy)]
pub enum AlignFill {
    /// A caller-chosen byte, repeated.
    Byte(u8),
    /// NOP instructions: ARM `00 00 a0 e1` / Thumb `c0 46`.
    Nop,
}

/// Which RAM region a `Memory` section allocates from (spec §4.6, glossary
/// "IWRAM/EWRAM").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    Iwram,
    Ewram,
}

impl MemoryRegion {
    pub const fn base(self) -> u32 {
        match self {
            MemoryRegion::Iwram => 0x0300_0000,
            MemoryRegion::Ewram => 0x0200_0000,
        }
    }

    pub const fn size(self) -> u32 {
        match self {
            MemoryRegion::Iwram => 32 * 1024 - 256,
            MemoryRegion::Ewram => 256 * 1024,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MemoryRegion::Iwram => "IWRAM",
            MemoryRegion::Ewram => "EWRAM",
        }
    }
}

/// One section variant (spec §3, §4.6). A file's emitted bytes are the
/// ordered concatenation of its sections' flattened output, except `Base`/
/// `BaseShift`/`Memory` which contribute control state rather than bytes.
#[derive(Debug, Clone)]
pub enum Section {
    Bytes(BytesSection),
    Pool(PoolSection),
    Align {
        /// Concrete repeating fill bytes, already resolved from the
        /// directive's [`AlignFill`] by `Import::align`.
        pattern: Vec<u8>,
        to: u32,
        bytes: BytesSection,
    },
    Include {
        path: String,
    },
    Embed {
        path: String,
        data: Vec<u8>,
    },
    Base {
        addr: VirtAddr,
        overwrite: bool,
    },
    BaseShift,
    Memory {
        region: MemoryRegion,
        size: u32,
        /// Resolved start address, populated by this section's flatten and
        /// cleared by `makeStart` (spec §9 "Struct `base` expressions for
        /// IWRAM/EWRAM-allocated structs are late-bound to
        /// `struct.memoryStart`").
        start: Option<VirtAddr>,
    },
}

impl Section {
    /// Clears any address state populated by a previous `flatten` pass
    /// (spec §4.9 `makeStart`: "clears every address slot in every Bytes
    /// section ... clears memory-start markers").
    pub fn clear_addresses(&mut self) {
        match self {
            Section::Bytes(b) => b.clear(),
            Section::Pool(p) => {
                p.bytes.clear();
                p.entries.clear();
            }
            Section::Align { bytes, .. } => bytes.clear(),
            Section::Memory { start, .. } => *start = None,
            Section::Include { .. } | Section::Embed { .. } | Section::Base { .. } | Section::BaseShift => {}
        }
    }
}
