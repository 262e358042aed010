use std::fmt;
use std::ops::{Add, Sub};

/// A general-purpose register number. ARM exposes r0..=r15; Thumb low-register
/// forms further restrict this to r0..=r7 at the code-part level (checked in
/// `gba-asm-isa`, not here — this type just carries the number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reg(pub u8);

impl Reg {
    pub const PC: Reg = Reg(15);
    pub const LR: Reg = Reg(14);
    pub const SP: Reg = Reg(13);

    /// `true` for r0..=r7, the registers addressable by Thumb's 3-bit
    /// register fields.
    pub const fn is_low(self) -> bool {
        self.0 < 8
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A resolved operand or expression value. Signed so that negative
/// immediates and PC-relative offsets round-trip without a separate
/// representation; individual code-parts narrow and range-check it.
pub type Value = i64;

/// A 32-bit virtual ROM address (GBA cartridge space starts at
/// `0x0800_0000`; IWRAM/EWRAM addresses also fit this type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtAddr(pub u32);

impl VirtAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn offset(self, delta: i64) -> Self {
        Self((self.0 as i64 + delta) as u32)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u32> for VirtAddr {
    type Output = VirtAddr;
    fn add(self, rhs: u32) -> VirtAddr {
        VirtAddr(self.0.wrapping_add(rhs))
    }
}

impl Sub<VirtAddr> for VirtAddr {
    type Output = i64;
    fn sub(self, rhs: VirtAddr) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

impl From<u32> for VirtAddr {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_low_boundary() {
        assert!(Reg(7).is_low());
        assert!(!Reg(8).is_low());
    }

    #[test]
    fn virt_addr_sub_is_signed_distance() {
        let a = VirtAddr(0x0800_0010);
        let b = VirtAddr(0x0800_0000);
        assert_eq!(a - b, 16);
        assert_eq!(b - a, -16);
    }
}
