use thiserror::Error;

/// Encoding failures: spec §4.2 "Errors" (misalignment, range overflow,
/// impossible rotated immediate). These are always fatal at the call site —
/// unlike `EncodeOutcome::NotReady`, which means "try again later", a
/// `EncodeError` means the instruction as written can never be encoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("internal: bit field declared {declared} bits but {pushed} were pushed")]
    BitFieldWidthMismatch { declared: u32, pushed: u32 },

    #[error("value {value} does not fit in {width}-bit immediate")]
    ImmediateOutOfRange { value: i64, width: u32 },

    #[error("value 0x{value:x} cannot be expressed as a rotated 8-bit immediate")]
    ImpossibleRotatedImmediate { value: u32 },

    #[error("offset {offset} is not aligned to {align} bytes")]
    Misaligned { offset: i64, align: u32 },

    #[error("branch target out of range: offset {offset} does not fit in {width}-bit signed field (x{scale})")]
    BranchOutOfRange {
        offset: i64,
        width: u32,
        scale: u32,
    },

    #[error("register r{0} is not a low register (r0-r7) as required here")]
    NotLowRegister(u8),

    #[error("missing operand {0:?} for this instruction")]
    MissingOperand(&'static str),

    #[error("pool load is too far from its instruction (offset {offset}, max {max})")]
    PoolTooFar { offset: i64, max: i64 },
}
