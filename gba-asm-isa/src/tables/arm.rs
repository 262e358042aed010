//! ARM (32-bit) instruction shapes.
//!
//! Every table entry expects an `"cond"` operand (the 4-bit condition code,
//! `0b1110` for the unconditional/always suffix) unless noted otherwise —
//! the parser resolves the mnemonic's condition suffix to that nibble before
//! these code-parts ever see an [`Operands`](crate::codepart::Operands) map.

use crate::codepart::{CodePart, PartKind};

/// ARM data-processing opcode field values (spec §4.2 rotimm/register
/// operand2 forms share this field).
pub mod opcode {
    pub const AND: u32 = 0b0000;
    pub const EOR: u32 = 0b0001;
    pub const SUB: u32 = 0b0010;
    pub const ADD: u32 = 0b0100;
    pub const CMP: u32 = 0b1010;
    pub const ORR: u32 = 0b1100;
    pub const MOV: u32 = 0b1101;
    pub const MVN: u32 = 0b1111;
}

/// Data-processing, immediate (rotated) operand2: `<op>{cond}{s} rd, rn, #imm`.
/// `rotimm` drives the 12-bit rotate+imm8 field from a single wide operand.
pub fn data_proc_imm(opcode: u32, set_flags: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(12, PartKind::RotImm { operand: "op2" }),
        CodePart::new(4, PartKind::Register { operand: "rd" }),
        CodePart::new(4, PartKind::Register { operand: "rn" }),
        CodePart::new(1, PartKind::Value { value: set_flags as u32 }),
        CodePart::new(4, PartKind::Value { value: opcode }),
        CodePart::new(1, PartKind::Value { value: 1 }), // I: operand2 is immediate
        CodePart::new(2, PartKind::Value { value: 0b00 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// Data-processing, register operand2, no shift: `<op>{cond}{s} rd, rn, rm`.
pub fn data_proc_reg(opcode: u32, set_flags: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(4, PartKind::Register { operand: "rm" }),
        CodePart::new(8, PartKind::Value { value: 0 }), // no shift applied
        CodePart::new(4, PartKind::Register { operand: "rd" }),
        CodePart::new(4, PartKind::Register { operand: "rn" }),
        CodePart::new(1, PartKind::Value { value: set_flags as u32 }),
        CodePart::new(4, PartKind::Value { value: opcode }),
        CodePart::new(1, PartKind::Value { value: 0 }), // I: operand2 is a register
        CodePart::new(2, PartKind::Value { value: 0b00 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `b{cond}`/`bl{cond} target` — spec §8's branch-to-self worked example.
/// `link` bakes in B vs BL (bit 24).
pub fn b_bl(link: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(24, PartKind::ArmBranchWord { operand: "target" }),
        CodePart::new(1, PartKind::Value { value: link as u32 }),
        CodePart::new(3, PartKind::Value { value: 0b101 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `bx{cond} rm`.
pub fn bx() -> Vec<CodePart> {
    vec![
        CodePart::new(4, PartKind::Register { operand: "rm" }),
        CodePart::new(24, PartKind::Value { value: 0x12fff1 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `ldr{cond}`/`str{cond} rd, [rn, #+/-imm12]` — single data transfer,
/// immediate offset, pre-indexed, no writeback. `offset` is the signed
/// operand the `offset12` body+sign pair share.
pub fn ldr_str_imm(load: bool, byte: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(
            12,
            PartKind::Offset12Body {
                operand: "offset",
                pc_relative: false,
            },
        ),
        CodePart::new(4, PartKind::Register { operand: "rd" }),
        CodePart::new(4, PartKind::Register { operand: "rn" }),
        CodePart::new(1, PartKind::Value { value: load as u32 }), // L
        CodePart::new(1, PartKind::Value { value: 0 }),           // W
        CodePart::new(1, PartKind::Value { value: byte as u32 }), // B
        CodePart::new(
            1,
            PartKind::Offset12Sign {
                operand: "offset",
                pc_relative: false,
            },
        ), // U
        CodePart::new(1, PartKind::Value { value: 1 }), // P: pre-indexed
        CodePart::new(1, PartKind::Value { value: 0 }), // I: offset is immediate
        CodePart::new(2, PartKind::Value { value: 0b01 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `ldr{cond} rd, [pc, #target]` — literal-pool load, rn fixed to r15. The
/// pool engine (spec §4.5) rewrites a pool reference to this shape with
/// `target` bound to the pool slot's absolute address.
pub fn ldr_pc(byte: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(
            12,
            PartKind::Offset12Body {
                operand: "target",
                pc_relative: true,
            },
        ),
        CodePart::new(4, PartKind::Register { operand: "rd" }),
        CodePart::new(4, PartKind::Value { value: 15 }), // rn = pc
        CodePart::new(1, PartKind::Value { value: 1 }),  // L: load
        CodePart::new(1, PartKind::Value { value: 0 }),  // W
        CodePart::new(1, PartKind::Value { value: byte as u32 }), // B
        CodePart::new(
            1,
            PartKind::Offset12Sign {
                operand: "target",
                pc_relative: true,
            },
        ), // U
        CodePart::new(1, PartKind::Value { value: 1 }), // P
        CodePart::new(1, PartKind::Value { value: 0 }), // I
        CodePart::new(2, PartKind::Value { value: 0b01 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `ldrh`/`strh`/`ldrsh`/`ldrsb{cond} rd, [rn, #+/-imm8]` — halfword/signed
/// transfer, immediate offset. `sign_extend` and `halfword` pick the
/// S/H bits (S=0,H=1 -> ldrh/strh; S=1,H=0 -> ldrsb; S=1,H=1 -> ldrsh).
pub fn ldrh_strh(load: bool, sign_extend: bool, halfword: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(
            4,
            PartKind::OffsetSplitNibble {
                operand: "offset",
                high: false,
                pc_relative: false,
            },
        ),
        CodePart::new(1, PartKind::Value { value: 1 }),
        CodePart::new(1, PartKind::Value { value: halfword as u32 }), // H
        CodePart::new(1, PartKind::Value { value: sign_extend as u32 }), // S
        CodePart::new(1, PartKind::Value { value: 1 }),
        CodePart::new(
            4,
            PartKind::OffsetSplitNibble {
                operand: "offset",
                high: true,
                pc_relative: false,
            },
        ),
        CodePart::new(4, PartKind::Register { operand: "rd" }),
        CodePart::new(4, PartKind::Register { operand: "rn" }),
        CodePart::new(1, PartKind::Value { value: load as u32 }), // L
        CodePart::new(1, PartKind::Value { value: 0 }),           // W
        CodePart::new(1, PartKind::Value { value: 1 }),           // I: immediate offset
        CodePart::new(
            1,
            PartKind::OffsetSplitSign {
                operand: "offset",
                pc_relative: false,
            },
        ), // U
        CodePart::new(1, PartKind::Value { value: 1 }), // P
        CodePart::new(3, PartKind::Value { value: 0b000 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `ldrh`/`ldrsh`/`ldrsb{cond} rd, [pc, #target]` — halfword/signed literal
/// pool load, rn fixed to r15.
pub fn ldrh_pc(sign_extend: bool, halfword: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(
            4,
            PartKind::OffsetSplitNibble {
                operand: "target",
                high: false,
                pc_relative: true,
            },
        ),
        CodePart::new(1, PartKind::Value { value: 1 }),
        CodePart::new(1, PartKind::Value { value: halfword as u32 }),
        CodePart::new(1, PartKind::Value { value: sign_extend as u32 }),
        CodePart::new(1, PartKind::Value { value: 1 }),
        CodePart::new(
            4,
            PartKind::OffsetSplitNibble {
                operand: "target",
                high: true,
                pc_relative: true,
            },
        ),
        CodePart::new(4, PartKind::Register { operand: "rd" }),
        CodePart::new(4, PartKind::Value { value: 15 }), // rn = pc
        CodePart::new(1, PartKind::Value { value: 1 }),  // L: load
        CodePart::new(1, PartKind::Value { value: 0 }),  // W
        CodePart::new(1, PartKind::Value { value: 1 }),  // I
        CodePart::new(
            1,
            PartKind::OffsetSplitSign {
                operand: "target",
                pc_relative: true,
            },
        ), // U
        CodePart::new(1, PartKind::Value { value: 1 }), // P
        CodePart::new(3, PartKind::Value { value: 0b000 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

/// `push{cond} {reglist}` (STMDB sp!) / `pop{cond} {reglist}` (LDMIA sp!).
pub fn push_pop(load: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(16, PartKind::RegList { operand: "reglist" }),
        CodePart::new(4, PartKind::Value { value: 13 }), // rn = sp
        CodePart::new(1, PartKind::Value { value: load as u32 }), // L
        CodePart::new(1, PartKind::Value { value: 1 }),  // W: writeback
        CodePart::new(1, PartKind::Value { value: 0 }),  // S
        CodePart::new(1, PartKind::Value { value: load as u32 }), // U: pop counts up, push counts down
        CodePart::new(1, PartKind::Value { value: (!load) as u32 }), // P: push pre-indexes, pop post-indexes
        CodePart::new(3, PartKind::Value { value: 0b100 }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codepart::{Isa, Operands};
    use crate::encode::{encode, EncodeOutcome};
    use gba_asm_types::VirtAddr;

    #[test]
    fn mov_imm_matches_corrected_rotated_immediate() {
        let parts = data_proc_imm(opcode::MOV, false);
        let mut operands = Operands::new();
        operands.set("cond", 0b1110);
        operands.set("rd", 0);
        operands.set("rn", 0);
        operands.set("op2", 0x3f000);
        let word = match encode(Isa::Arm, &parts, &operands, None).unwrap() {
            EncodeOutcome::Word(w) => w,
            EncodeOutcome::NotReady => panic!("data-processing never needs an address"),
        };
        assert_eq!(word.to_le_bytes(), [0x3f, 0x0a, 0xa0, 0xe3]);
    }

    #[test]
    fn ldr_pc_is_pc_relative_and_always_positive() {
        let parts = ldr_pc(false);
        let mut operands = Operands::new();
        operands.set("cond", 0b1110);
        operands.set("rd", 0);
        operands.set("target", 0x0800_0010);
        let addr = Some(VirtAddr::new(0x0800_0004));
        let word = match encode(Isa::Arm, &parts, &operands, addr).unwrap() {
            EncodeOutcome::Word(w) => w,
            EncodeOutcome::NotReady => panic!("address was provided"),
        };
        // target - (addr + 8) = 0x0800_0010 - 0x0800_000c = 4
        assert_eq!(word & 0xfff, 4);
        assert_eq!((word >> 23) & 1, 1); // U: positive
    }
}
