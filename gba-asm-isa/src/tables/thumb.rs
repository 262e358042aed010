//! Thumb (16-bit, plus the `bl` 32-bit pair) instruction shapes.

use crate::codepart::{CodePart, PartKind};

/// `mov/cmp/add/sub rd, #imm8` (format 3). `op`: 00=mov,01=cmp,10=add,11=sub.
pub fn mov_cmp_add_sub_imm(op: u32) -> Vec<CodePart> {
    vec![
        CodePart::new(8, PartKind::Immediate { operand: "imm" }),
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(2, PartKind::Value { value: op }),
        CodePart::new(3, PartKind::Value { value: 0b001 }),
    ]
}

/// `add/sub rd, rn, rm` or `add/sub rd, rn, #imm3` (format 2).
/// `is_imm` selects whether the third operand is a register or a 3-bit
/// immediate; both share the operand name `"rm"` since only one is ever
/// bound for a given instantiation.
pub fn add_sub_reg_or_imm3(subtract: bool, is_imm: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(3, PartKind::Register { operand: "rn" }),
        if is_imm {
            CodePart::new(3, PartKind::Immediate { operand: "rm" })
        } else {
            CodePart::new(3, PartKind::Register { operand: "rm" })
        },
        CodePart::new(1, PartKind::Value { value: subtract as u32 }),
        CodePart::new(1, PartKind::Value { value: is_imm as u32 }),
        CodePart::new(5, PartKind::Value { value: 0b00011 }),
    ]
}

/// ALU register operations: `and/eor/lsl/lsr/asr/adc/sbc/ror/tst/neg/cmp/
/// cmn/orr/mul/bic/mvn rd, rs` (format 4).
pub fn alu(op: u32) -> Vec<CodePart> {
    vec![
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(3, PartKind::Register { operand: "rs" }),
        CodePart::new(4, PartKind::Value { value: op }),
        CodePart::new(6, PartKind::Value { value: 0b010000 }),
    ]
}

fn reg_or_high(high: bool, operand: &'static str) -> PartKind {
    if high {
        PartKind::RegisterHigh { operand }
    } else {
        PartKind::Register { operand }
    }
}

/// Hi-register operations and `mov`: `add/cmp/mov rd, rs` where either
/// operand may be r8-r15 (format 5). `h1`/`h2` are fixed per mnemonic
/// instantiation (the parser picks the variant matching its two operands'
/// register classes); `op`: 00=add,01=cmp,10=mov.
pub fn hi_reg_op(op: u32, h1: bool, h2: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(3, reg_or_high(h1, "rd")),
        CodePart::new(3, reg_or_high(h2, "rs")),
        CodePart::new(1, PartKind::Value { value: h2 as u32 }),
        CodePart::new(1, PartKind::Value { value: h1 as u32 }),
        CodePart::new(2, PartKind::Value { value: op }),
        CodePart::new(6, PartKind::Value { value: 0b010001 }),
    ]
}

/// `bx rs` (format 5 tail end); `rs` may be any register, hi or lo.
pub fn bx() -> Vec<CodePart> {
    vec![
        CodePart::new(3, PartKind::Value { value: 0b000 }),
        CodePart::new(4, PartKind::Register { operand: "rs" }),
        CodePart::new(1, PartKind::Value { value: 0 }), // link bit: 0 for bx
        CodePart::new(8, PartKind::Value { value: 0b01000111 }),
    ]
}

/// `ldr rd, [pc, #target]` (format 6) — literal-pool load.
pub fn ldr_pc() -> Vec<CodePart> {
    vec![
        CodePart::new(8, PartKind::PcOffset { operand: "target" }),
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(5, PartKind::Value { value: 0b01001 }),
    ]
}

/// `ldr/str(b) rd, [rb, ro]` — register-offset load/store (formats 7/8).
/// `sign_extend`/`halfword` select plain word/byte vs sign-extended
/// byte/halfword forms the same way as the ARM halfword table.
pub fn ldr_str_reg(load: bool, byte_or_halfword: bool, sign_extend: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(3, PartKind::Register { operand: "rb" }),
        CodePart::new(3, PartKind::Register { operand: "ro" }),
        CodePart::new(1, PartKind::Value { value: 0 }),
        CodePart::new(1, PartKind::Value { value: byte_or_halfword as u32 }),
        CodePart::new(1, PartKind::Value { value: (load != sign_extend) as u32 }),
        CodePart::new(1, PartKind::Value { value: 1 }),
        CodePart::new(4, PartKind::Value { value: 0b0101 }),
    ]
}

/// `ldr/str rd, [rb, #imm5]` word/byte immediate-offset load/store
/// (format 9). `byte`: word form scales the immediate by 4, byte form
/// doesn't scale at all.
pub fn ldr_str_imm(load: bool, byte: bool) -> Vec<CodePart> {
    let offset_part = if byte {
        CodePart::new(5, PartKind::Immediate { operand: "offset" })
    } else {
        CodePart::new(5, PartKind::Word { operand: "offset", align: 4 })
    };
    vec![
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(3, PartKind::Register { operand: "rb" }),
        offset_part,
        CodePart::new(1, PartKind::Value { value: load as u32 }),
        CodePart::new(1, PartKind::Value { value: byte as u32 }),
        CodePart::new(3, PartKind::Value { value: 0b011 }),
    ]
}

/// `ldrh/strh rd, [rb, #imm5]` (format 10); offset scaled by 2.
pub fn ldrh_strh_imm(load: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(3, PartKind::Register { operand: "rb" }),
        CodePart::new(5, PartKind::Halfword { operand: "offset" }),
        CodePart::new(1, PartKind::Value { value: load as u32 }),
        CodePart::new(4, PartKind::Value { value: 0b1000 }),
    ]
}

/// `add rd, pc, #imm8` / `add rd, sp, #imm8` (format 12), word-aligned.
pub fn add_pc_sp(sp: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(8, PartKind::Word { operand: "imm", align: 4 }),
        CodePart::new(3, PartKind::Register { operand: "rd" }),
        CodePart::new(1, PartKind::Value { value: sp as u32 }),
        CodePart::new(4, PartKind::Value { value: 0b1010 }),
    ]
}

/// `add sp, #imm7` / `sub sp, #imm7` (format 13), word-aligned.
pub fn add_sub_sp(subtract: bool) -> Vec<CodePart> {
    let imm_part = if subtract {
        CodePart::new(7, PartKind::NegWord { operand: "imm" })
    } else {
        CodePart::new(7, PartKind::Word { operand: "imm", align: 4 })
    };
    vec![
        imm_part,
        CodePart::new(1, PartKind::Value { value: subtract as u32 }),
        CodePart::new(8, PartKind::Value { value: 0b10110000 }),
    ]
}

/// `push {reglist}` / `pop {reglist}` (format 14). `extra` is the store-LR
/// (push) / load-PC (pop) bit.
pub fn push_pop(load: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(8, PartKind::RegList { operand: "reglist" }),
        CodePart::new(1, PartKind::Ignored { value: 0, operand: "extra" }),
        CodePart::new(2, PartKind::Value { value: 0b10 }),
        CodePart::new(1, PartKind::Value { value: load as u32 }),
        CodePart::new(4, PartKind::Value { value: 0b1011 }),
    ]
}

/// `ldmia/stmia rb!, {reglist}` (format 15).
pub fn ldm_stm(load: bool) -> Vec<CodePart> {
    vec![
        CodePart::new(8, PartKind::RegList { operand: "reglist" }),
        CodePart::new(3, PartKind::Register { operand: "rb" }),
        CodePart::new(1, PartKind::Value { value: load as u32 }),
        CodePart::new(4, PartKind::Value { value: 0b1100 }),
    ]
}

/// `b{cond} target` — conditional branch (format 16), 8-bit signed halfword
/// offset. `cond` 0b1110 (always) is reserved for the unconditional form.
pub fn b_cond() -> Vec<CodePart> {
    vec![
        CodePart::new(8, PartKind::SHalfword { operand: "target" }),
        CodePart::new(4, PartKind::Enum { operand: "cond" }),
        CodePart::new(4, PartKind::Value { value: 0b1101 }),
    ]
}

/// `b target` — unconditional branch (format 18), 11-bit signed halfword
/// offset.
pub fn b_uncond() -> Vec<CodePart> {
    vec![
        CodePart::new(11, PartKind::SHalfword { operand: "target" }),
        CodePart::new(5, PartKind::Value { value: 0b11100 }),
    ]
}

/// `bl target` — long branch with link (format 19), emitted as two 16-bit
/// halves sharing one 22-bit signed offset. Callers encode `bl_hi()` then
/// `bl_lo()` at consecutive addresses.
pub fn bl_hi() -> Vec<CodePart> {
    vec![
        CodePart::new(
            11,
            PartKind::OffsetSplit {
                operand: "target",
                high: true,
            },
        ),
        CodePart::new(5, PartKind::Value { value: 0b11110 }),
    ]
}

pub fn bl_lo() -> Vec<CodePart> {
    vec![
        CodePart::new(
            11,
            PartKind::OffsetSplit {
                operand: "target",
                high: false,
            },
        ),
        CodePart::new(5, PartKind::Value { value: 0b11111 }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codepart::{Isa, Operands};
    use crate::encode::{encode, EncodeOutcome};
    use gba_asm_types::VirtAddr;

    #[test]
    fn mov_imm_fits_format3() {
        let parts = mov_cmp_add_sub_imm(0b00);
        let mut operands = Operands::new();
        operands.set("rd", 3);
        operands.set("imm", 0x42);
        let word = match encode(Isa::Thumb, &parts, &operands, None).unwrap() {
            EncodeOutcome::Word(w) => w,
            EncodeOutcome::NotReady => panic!("format 3 never needs an address"),
        };
        assert_eq!(word, 0x2342);
    }

    #[test]
    fn long_branch_pair_splits_22_bit_offset() {
        let mut operands = Operands::new();
        operands.set("target", 0x0800_0100);
        let addr_hi = Some(VirtAddr::new(0x0800_0000));
        let addr_lo = Some(VirtAddr::new(0x0800_0002));

        let hi = match encode(Isa::Thumb, &bl_hi(), &operands, addr_hi).unwrap() {
            EncodeOutcome::Word(w) => w,
            EncodeOutcome::NotReady => panic!("address was provided"),
        };
        let lo = match encode(Isa::Thumb, &bl_lo(), &operands, addr_lo).unwrap() {
            EncodeOutcome::Word(w) => w,
            EncodeOutcome::NotReady => panic!("address was provided"),
        };
        assert_eq!(hi >> 11, 0b11110);
        assert_eq!(lo >> 11, 0b11111);
    }
}
