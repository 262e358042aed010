//! ARM/Thumb condition-code suffixes: the 4-bit `cond` field every
//! conditionally-executed instruction's code-parts expect under the
//! `"cond"` operand name.

use strum::EnumString;

/// One condition suffix, `strum`-derived the way the teacher derives
/// `EnumString`/`Display` for its own small closed string-keyed enums
/// (`fuel-asm`'s `PanicReason`, for one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Cond {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Cond {
    pub const fn nibble(self) -> u32 {
        match self {
            Cond::Eq => 0x0,
            Cond::Ne => 0x1,
            Cond::Cs => 0x2,
            Cond::Cc => 0x3,
            Cond::Mi => 0x4,
            Cond::Pl => 0x5,
            Cond::Vs => 0x6,
            Cond::Vc => 0x7,
            Cond::Hi => 0x8,
            Cond::Ls => 0x9,
            Cond::Ge => 0xa,
            Cond::Lt => 0xb,
            Cond::Gt => 0xc,
            Cond::Le => 0xd,
            Cond::Al => 0xe,
        }
    }
}

/// `b{cond}`-style Thumb conditional branch forbids `al` (that's
/// `b_uncond`'s job, spec §4.2's `tables::thumb::b_cond` doc).
pub fn is_always(cond: Cond) -> bool {
    cond == Cond::Al
}

/// Splits a mnemonic's trailing condition suffix off, if any of the
/// fifteen two-letter spellings matches; returns the bare mnemonic and the
/// parsed `cond` (defaulting to `al` when absent — spec §4.2's "`cond`
/// 0b1110 for the unconditional/always suffix").
pub fn split_suffix(mnemonic: &str) -> (&str, Cond) {
    if mnemonic.len() > 2 {
        let (head, tail) = mnemonic.split_at(mnemonic.len() - 2);
        if let Ok(cond) = tail.parse::<Cond>() {
            return (head, cond);
        }
    }
    (mnemonic, Cond::Al)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_splits_when_present() {
        let (base, cond) = split_suffix("bxeq");
        assert_eq!(base, "bx");
        assert_eq!(cond, Cond::Eq);
    }

    #[test]
    fn bare_mnemonic_defaults_to_always() {
        let (base, cond) = split_suffix("mov");
        assert_eq!(base, "mov");
        assert_eq!(cond, Cond::Al);
        assert_eq!(cond.nibble(), 0b1110);
    }

    #[test]
    fn short_mnemonic_never_mistaken_for_a_suffix() {
        // "bx" itself is exactly two characters; split_suffix requires more
        // than two before even attempting to peel a suffix off.
        let (base, cond) = split_suffix("bx");
        assert_eq!(base, "bx");
        assert_eq!(cond, Cond::Al);
    }
}
