use gba_asm_types::Reg;

use crate::codepart::Isa;
use crate::error::EncodeError;

/// The data-type tag a struct member carries (spec §4.3, §4.8). Drives
/// width, signedness, and which ldr/str variant a typed memory access
/// lowers to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    /// `m`-suffixed misaligned variant: opts out of natural alignment
    /// enforcement in the struct size walk (spec §4.8), but still encodes
    /// with the same width/signedness as its unmarked counterpart.
    Misaligned(Box<DataType>),
}

impl DataType {
    pub fn width_bytes(&self) -> u32 {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 => 4,
            DataType::Misaligned(inner) => inner.width_bytes(),
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            DataType::I8 | DataType::I16 | DataType::I32 => true,
            DataType::Misaligned(inner) => inner.is_signed(),
            _ => false,
        }
    }

    /// Aligned data types must respect their natural alignment in a struct
    /// size walk; `m`-marked ones may straddle (spec §4.8).
    pub fn enforces_alignment(&self) -> bool {
        !matches!(self, DataType::Misaligned(_))
    }
}

/// Which concrete load/store shape a typed memory access lowers to (spec
/// §4.3, "Immediate-versus-register addressing comes from the kind").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemKind {
    LdrImm,
    StrImm,
    LdrReg,
    StrReg,
}

/// A resolved typed memory access, ready to be lowered to a plain load/store
/// pending write by `gba-asm-core` once the struct lookup has produced an
/// offset and data type.
#[derive(Debug, Clone)]
pub struct TypedMemOp {
    pub kind: MemKind,
    pub reg: Reg,
    pub base: Reg,
    pub data_type: DataType,
    /// Either the immediate offset (`LdrImm`/`StrImm`) or the index register
    /// number packed into the low byte (`LdrReg`/`StrReg`); `gba-asm-core`
    /// interprets this per `kind`.
    pub offset_or_index: i64,
}

/// Validates a typed memory operand against ISA constraints (spec §4.3:
/// "Thumb variants additionally enforce the low-register constraint at
/// construction time") and returns the operation ready for lowering.
pub fn resolve_typed_mem(
    isa: Isa,
    kind: MemKind,
    reg: Reg,
    base: Reg,
    data_type: DataType,
    offset_or_index: i64,
) -> Result<TypedMemOp, EncodeError> {
    if isa == Isa::Thumb {
        if !reg.is_low() {
            return Err(EncodeError::NotLowRegister(reg.0));
        }
        if !base.is_low() {
            return Err(EncodeError::NotLowRegister(base.0));
        }
        if matches!(kind, MemKind::LdrReg | MemKind::StrReg) {
            // index register for register-offset forms is also constrained
            // to the low set; caller packs it into `offset_or_index`.
            let idx = offset_or_index as u8;
            if idx >= 8 {
                return Err(EncodeError::NotLowRegister(idx));
            }
        }
    }

    Ok(TypedMemOp {
        kind,
        reg,
        base,
        data_type,
        offset_or_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb_rejects_high_register() {
        let err = resolve_typed_mem(
            Isa::Thumb,
            MemKind::LdrImm,
            Reg(8),
            Reg(0),
            DataType::U32,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::NotLowRegister(8)));
    }

    #[test]
    fn misaligned_wrapper_keeps_width_and_signedness() {
        let dt = DataType::Misaligned(Box::new(DataType::I16));
        assert_eq!(dt.width_bytes(), 2);
        assert!(dt.is_signed());
        assert!(!dt.enforces_alignment());
    }
}
