use gba_asm_types::VirtAddr;

use crate::section::Section;

/// A handle onto a reserved byte slot inside one of an Import's sections
/// (spec §3 "IRewrite"). Holds only indices, never a reference, so pending
/// writes and pool slots can point at a slot without an ownership cycle back
/// into the section that owns the storage (spec §9 "Cyclic references").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteHandle {
    pub section: usize,
    pub offset: usize,
    pub width: usize,
}

impl RewriteHandle {
    pub fn new(section: usize, offset: usize, width: usize) -> Self {
        Self { section, offset, width }
    }

    /// Looks up the section this handle points into and returns the bytes
    /// slot it owns, if that section holds one (`Bytes`, `Pool`, `Align`).
    fn bytes<'a>(&self, sections: &'a [Section]) -> Option<&'a crate::section::BytesSection> {
        match sections.get(self.section)? {
            Section::Bytes(b) => Some(b),
            Section::Pool(p) => Some(&p.bytes),
            Section::Align { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    fn bytes_mut<'a>(&self, sections: &'a mut [Section]) -> Option<&'a mut crate::section::BytesSection> {
        match sections.get_mut(self.section)? {
            Section::Bytes(b) => Some(b),
            Section::Pool(p) => Some(&mut p.bytes),
            Section::Align { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    /// The resolved virtual address of this slot, or `None` if the owning
    /// section has not been flattened in the current pass yet.
    pub fn addr(&self, sections: &[Section]) -> Option<VirtAddr> {
        self.bytes(sections)?.addr_at(self.offset)
    }

    /// Patches `value` into the slot. `value.len()` must equal `self.width`.
    pub fn write(&self, sections: &mut [Section], value: &[u8]) {
        debug_assert_eq!(value.len(), self.width);
        if let Some(bytes) = self.bytes_mut(sections) {
            bytes.write_at(self.offset, value);
        }
    }
}
