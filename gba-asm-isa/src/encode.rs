use gba_asm_types::{Value, VirtAddr};

use crate::bitvec::BitFieldEncoder;
use crate::codepart::{CodePart, Isa, Operands, PartKind};
use crate::error::EncodeError;

/// Result of attempting to encode one instruction (spec §4.2 "Resolution" /
/// "Address availability").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// The instruction was fully encoded.
    Word(u32),
    /// A PC-relative code-part needed the instruction's own address, which
    /// the caller hasn't resolved yet. Not an error — try again later.
    NotReady,
}

/// Encodes one instruction from its ordered code-parts, spec §4.1-§4.2.
///
/// `operands` must already hold concrete values for every operand name the
/// code-parts reference — `gba-asm-core` is responsible for resolving
/// symbol expressions before calling in here, so the only reason this can
/// come back `NotReady` is an unresolved instruction address.
pub fn encode(
    isa: Isa,
    parts: &[CodePart],
    operands: &Operands,
    addr: Option<VirtAddr>,
) -> Result<EncodeOutcome, EncodeError> {
    let declared_width = match isa {
        Isa::Arm => 32,
        Isa::Thumb => 16,
    };
    let mut enc = BitFieldEncoder::new(declared_width);

    for part in parts {
        match push_part(&mut enc, part, operands, addr)? {
            Some(()) => {}
            None => return Ok(EncodeOutcome::NotReady),
        }
    }

    enc.get().map(EncodeOutcome::Word)
}

/// Pushes one code-part's bits. Returns `Ok(None)` to signal "not ready"
/// (propagated up as `EncodeOutcome::NotReady`), `Ok(Some(()))` on success.
fn push_part(
    enc: &mut BitFieldEncoder,
    part: &CodePart,
    operands: &Operands,
    addr: Option<VirtAddr>,
) -> Result<Option<()>, EncodeError> {
    let width = part.width;

    macro_rules! need_addr {
        () => {
            match addr {
                Some(a) => a,
                None => return Ok(None),
            }
        };
    }

    match part.kind {
        PartKind::Immediate { operand } => {
            let v = operands.get(operand)?;
            check_unsigned_range(v, width)?;
            enc.push(width, v as u32);
        }
        PartKind::Register { operand } => {
            let v = operands.get(operand)?;
            enc.push(width, v as u32);
        }
        PartKind::RegList { operand } => {
            let v = operands.get(operand)?;
            enc.push(width, v as u32);
        }
        PartKind::Enum { operand } => {
            let v = operands.get(operand)?;
            enc.push(width, v as u32);
        }
        PartKind::RegisterHigh { operand } => {
            let v = operands.get(operand)?;
            enc.push(width, (v - 8) as u32);
        }
        PartKind::Value { value } => {
            enc.push(width, value);
        }
        PartKind::Ignored { value, .. } => {
            enc.push(width, value);
        }
        PartKind::RotImm { operand } => {
            let v = operands.get(operand)?;
            check_unsigned_range(v, 32)?;
            let (rotate, imm8) = encode_rotated_immediate(v as u32)
                .ok_or(EncodeError::ImpossibleRotatedImmediate { value: v as u32 })?;
            debug_assert_eq!(width, 12);
            enc.push(width, (rotate << 8) | imm8);
        }
        PartKind::Word { operand, align } => {
            let v = operands.get(operand)?;
            let shifted = shift_aligned(v, align)?;
            enc.push(width, shifted as u32);
        }
        PartKind::Halfword { operand } => {
            let v = operands.get(operand)?;
            let shifted = shift_aligned(v, 2)?;
            enc.push(width, shifted as u32);
        }
        PartKind::NegWord { operand } => {
            let v = operands.get(operand)?;
            let shifted = shift_aligned(v, 4)?;
            enc.push(width, shifted as u32);
        }
        PartKind::SHalfword { operand } => {
            let addr = need_addr!();
            let target = operands.get(operand)?;
            let offset = target - addr.0 as i64 - 4;
            if offset % 2 != 0 {
                return Err(EncodeError::Misaligned { offset, align: 2 });
            }
            let scaled = offset / 2;
            check_signed_range(scaled, width)?;
            enc.push(width, scaled as u32);
        }
        PartKind::PcOffset { operand } => {
            let addr = need_addr!();
            let target = operands.get(operand)?;
            let base = (addr.0 & !0b10) as i64;
            let offset = target - base - 4;
            if offset < 0 || offset % 4 != 0 {
                return Err(EncodeError::Misaligned { offset, align: 4 });
            }
            let scaled = offset / 4;
            check_unsigned_range(scaled, width)?;
            enc.push(width, scaled as u32);
        }
        PartKind::OffsetSplit { operand, high } => {
            let addr = need_addr!();
            let target = operands.get(operand)?;
            let offset = target - addr.0 as i64 - 4;
            check_signed_range(offset, 22)?;
            let bits = (offset as i32) as u32 & 0x3f_ffff;
            let half = if high { (bits >> 11) & 0x7ff } else { bits & 0x7ff };
            enc.push(width, half);
        }
        PartKind::ArmBranchWord { operand } => {
            let addr = need_addr!();
            let target = operands.get(operand)?;
            let offset = target - addr.0 as i64 - 8;
            if offset % 4 != 0 {
                return Err(EncodeError::Misaligned { offset, align: 4 });
            }
            let scaled = offset / 4;
            check_signed_range(scaled, width)?;
            enc.push(width, scaled as u32);
        }
        PartKind::Offset12Body {
            operand,
            pc_relative,
        } => {
            let (offset, _sign) = match resolve_offset(operand, pc_relative, operands, addr)? {
                Some(v) => v,
                None => return Ok(None),
            };
            check_unsigned_range(offset.abs(), width)?;
            enc.push(width, offset.unsigned_abs() as u32);
        }
        PartKind::Offset12Sign {
            operand,
            pc_relative,
        } => {
            let (_offset, sign) = match resolve_offset(operand, pc_relative, operands, addr)? {
                Some(v) => v,
                None => return Ok(None),
            };
            enc.push(width, sign as u32);
        }
        PartKind::OffsetSplitNibble {
            operand,
            high,
            pc_relative,
        } => {
            let (offset, _sign) = match resolve_offset(operand, pc_relative, operands, addr)? {
                Some(v) => v,
                None => return Ok(None),
            };
            check_unsigned_range(offset.abs(), 8)?;
            let mag = offset.unsigned_abs() as u32;
            let nibble = if high { (mag >> 4) & 0xf } else { mag & 0xf };
            enc.push(width, nibble);
        }
        PartKind::OffsetSplitSign {
            operand,
            pc_relative,
        } => {
            let (_offset, sign) = match resolve_offset(operand, pc_relative, operands, addr)? {
                Some(v) => v,
                None => return Ok(None),
            };
            enc.push(width, sign as u32);
        }
    }
    Ok(Some(()))
}

/// Helper shared by the `offset12`/`offsetsplit` family: resolves the
/// operand (absolute target address when `pc_relative`, otherwise a plain
/// signed offset already computed by the caller) and returns
/// `(signed_offset, sign_bit)`, or `None` if an address was needed but is
/// not yet available.
fn resolve_offset(
    operand: &'static str,
    pc_relative: bool,
    operands: &Operands,
    addr: Option<VirtAddr>,
) -> Result<Option<(Value, bool)>, EncodeError> {
    let raw = operands.get(operand)?;
    let offset = if pc_relative {
        let a = match addr {
            Some(a) => a,
            None => return Ok(None),
        };
        raw - (a.0 as i64 + 8)
    } else {
        raw
    };
    Ok(Some((offset, offset >= 0)))
}

fn check_unsigned_range(v: Value, width: u32) -> Result<(), EncodeError> {
    let max = if width >= 64 { i64::MAX } else { (1i64 << width) - 1 };
    if v < 0 || v > max {
        return Err(EncodeError::ImmediateOutOfRange { value: v, width });
    }
    Ok(())
}

fn check_signed_range(v: Value, width: u32) -> Result<(), EncodeError> {
    let half = 1i64 << (width - 1);
    if v < -half || v >= half {
        return Err(EncodeError::ImmediateOutOfRange { value: v, width });
    }
    Ok(())
}

fn shift_aligned(v: Value, align: u32) -> Result<i64, EncodeError> {
    if v % align as i64 != 0 {
        return Err(EncodeError::Misaligned {
            offset: v,
            align,
        });
    }
    Ok(v / align as i64)
}

/// ARM's rotated-immediate search (spec §4.2 "rotimm"): rotate the target
/// value left by each even amount 0..=30 until it fits in 8 bits. The
/// decode-time relationship is `value == ROR(imm8, rotate * 2)`, so the
/// encode search is its inverse, `imm8 == ROL(value, rotate * 2)`.
fn encode_rotated_immediate(value: u32) -> Option<(u32, u32)> {
    for rotate in 0..16u32 {
        let amount = rotate * 2;
        let candidate = value.rotate_left(amount);
        if candidate <= 0xff {
            return Some((rotate, candidate));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_immediate_search_matches_known_value() {
        // 0x3f rotated right by 20 bits == 0x3f000 (verified independently;
        // ARM's rotate field stores half the actual rotation, so this is
        // rotate=10, imm=0x3f).
        let (rotate, imm) = encode_rotated_immediate(0x3f000).unwrap();
        assert_eq!(rotate, 10);
        assert_eq!(imm, 0x3f);
    }

    #[test]
    fn rotated_immediate_rejects_impossible_values() {
        assert!(encode_rotated_immediate(0x1234_5678).is_none());
    }

    #[test]
    fn branch_to_self_matches_spec_scenario() {
        use crate::tables::arm;
        let parts = arm::b_bl(false);
        let mut operands = Operands::new();
        operands.set("target", 0x0800_0000);
        operands.set("cond", 0b1110);
        let addr = Some(VirtAddr::new(0x0800_0000));
        let word = match encode(Isa::Arm, &parts, &operands, addr).unwrap() {
            EncodeOutcome::Word(w) => w,
            EncodeOutcome::NotReady => panic!("should be ready"),
        };
        assert_eq!(word.to_le_bytes(), [0xfe, 0xff, 0xff, 0xea]);
    }
}
