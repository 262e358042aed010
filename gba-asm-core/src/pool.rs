use std::rc::Rc;

use gba_asm_isa::{encode, tables, EncodeOutcome, Isa, Operands};
use gba_asm_types::{Reg, SourcePos, Value, VirtAddr};

use crate::addr::BaseFrame;
use crate::error::{CoreError, Result};
use crate::pending::{Operand, PendingWriteId};
use crate::rewrite::RewriteHandle;
use crate::scope::{PendingContext, ScopeChain};
use crate::section::{PoolEntry, PoolSection, Section};

/// One captured pool-load, gathered by the owning Import from its pending
/// list before a `Pool` section flattens (spec §4.5).
pub struct PoolLoad {
    pub id: PendingWriteId,
    pub isa: Isa,
    pub width: u32,
    pub signed: bool,
    pub reg: Reg,
    pub cond: u32,
    pub target: Operand,
    /// The `ldr rd, =value` instruction's own rewrite slot — already
    /// resolvable, since instruction sections flatten before the `Pool`
    /// section that captured them (spec §5 "Section emission order is
    /// strictly the order in which parser callbacks were invoked").
    pub rewrite: RewriteHandle,
    pub scope: Rc<ScopeChain>,
    pub pos: SourcePos,
}

/// Runs the literal-pool engine over `loads` (in capture order) against the
/// `Pool` section at `sections[pool_index]`, which must not yet be
/// flattened. Mutates the pool's bytes and rewrites every captured
/// instruction's own bytes elsewhere in `sections`. `loads` is taken by
/// mutable reference rather than by value because its owner (the Import
/// that captured these pool loads) needs the memoised `target` state back
/// for the next build pass — a fresh `makeStart` re-flattens from scratch,
/// and an already-resolved constant should stay resolved rather than being
/// re-evaluated from the original expression every time.
pub fn flatten_pool(
    sections: &mut [Section],
    pool_index: usize,
    base: BaseFrame,
    start_length: i64,
    loads: &mut [PoolLoad],
) -> Result<()> {
    {
        let Section::Pool(pool) = &mut sections[pool_index] else {
            panic!("flatten_pool called on a non-Pool section");
        };
        pool.bytes.flatten(base, start_length);
        pool.entries.clear();
    }

    for load in loads.iter_mut() {
        let inst_addr = load
            .rewrite
            .addr(sections)
            .expect("instruction section must already be flattened before its pool");
        let ctx = PendingContext {
            scope: &load.scope,
            own_addr: Some(inst_addr),
        };
        let value = load.target.resolve(&ctx, false, &load.pos)?;

        if let Some(v) = value {
            if try_inline(sections, load, inst_addr, v)? {
                continue;
            }
        }

        let offset = place_entry(sections, pool_index, load, value)?;
        rewrite_pool_load(sections, pool_index, load, inst_addr, offset)?;
    }

    let Section::Pool(pool) = &mut sections[pool_index] else {
        unreachable!()
    };
    end_align(pool);
    Ok(())
}

/// Spec §4.5 step 1: ARM `mov`/`mvn` or Thumb `add rd, pc, #off`, skipping
/// pool allocation entirely on success.
fn try_inline(sections: &mut [Section], load: &PoolLoad, inst_addr: VirtAddr, value: Value) -> Result<bool> {
    match load.isa {
        // The original assembler never attempts this shortcut for
        // sign-extended or sub-word loads (spec §9 "Observed quirks worth
        // flagging" — left unimproved, reproduced as-is): only a plain
        // 4-byte unsigned `ldr` can become a `mov`/`mvn`.
        Isa::Arm if !load.signed && load.width == 4 => {
            let as_u32 = value as u32;
            for (opcode, op2) in [(tables::arm::opcode::MOV, as_u32), (tables::arm::opcode::MVN, !as_u32)] {
                let mut operands = Operands::new();
                operands.set("cond", load.cond as Value);
                operands.set("rd", load.reg.0 as Value);
                operands.set("rn", 0);
                operands.set("op2", op2 as Value);
                match encode(Isa::Arm, &tables::arm::data_proc_imm(opcode, false), &operands, Some(inst_addr)) {
                    Ok(EncodeOutcome::Word(w)) => {
                        load.rewrite.write(sections, &w.to_le_bytes());
                        return Ok(true);
                    }
                    Ok(EncodeOutcome::NotReady) => return Ok(false),
                    Err(gba_asm_isa::EncodeError::ImpossibleRotatedImmediate { .. }) => continue,
                    Err(source) => return Err(CoreError::Encode { pos: load.pos.clone(), source }),
                }
            }
        }
        Isa::Arm => {}
        Isa::Thumb => {
            if value >= 0 && value <= 1020 && value % 4 == 0 {
                let parts = tables::thumb::add_pc_sp(false);
                let mut operands = Operands::new();
                operands.set("rd", load.reg.0 as Value);
                operands.set("imm", value);
                let word = match encode(Isa::Thumb, &parts, &operands, Some(inst_addr))
                    .map_err(|source| CoreError::Encode { pos: load.pos.clone(), source })?
                {
                    EncodeOutcome::Word(w) => w,
                    EncodeOutcome::NotReady => return Ok(false),
                };
                load.rewrite.write(sections, &(word as u16).to_le_bytes());
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Spec §4.5 steps 2-3: dedup against already-placed entries in this pass,
/// else align and allocate a fresh one.
fn place_entry(sections: &mut [Section], pool_index: usize, load: &PoolLoad, value: Option<Value>) -> Result<usize> {
    let Section::Pool(pool) = &mut sections[pool_index] else {
        unreachable!()
    };

    if let Some(v) = value {
        if let Some(offset) = dedup(pool, load.width, v) {
            return Ok(offset);
        }
    }

    let align = load.width as usize;
    let misalignment = pool.bytes.buf.len() % align;
    if misalignment != 0 {
        pool.bytes.buf.resize(pool.bytes.buf.len() + (align - misalignment), 0);
    }
    let offset = pool.bytes.reserve(load.width as usize);

    match value {
        Some(v) => {
            let bytes = &v.to_le_bytes()[..load.width as usize];
            pool.bytes.write_at(offset, bytes);
            pool.entries.push(PoolEntry {
                value: Some(v),
                width: load.width,
                offset,
                late: None,
            });
        }
        None => {
            pool.entries.push(PoolEntry {
                value: None,
                width: load.width,
                offset,
                late: Some((load.target.clone(), load.scope.clone())),
            });
        }
    }

    Ok(offset)
}

/// Searches entries already placed in this pass for a matching value and
/// width; entries still awaiting a late write are excluded (spec §4.5 step
/// 2: "A region scheduled for late-write ... is excluded from the search").
fn dedup(pool: &PoolSection, width: u32, value: Value) -> Option<usize> {
    pool.entries
        .iter()
        .find(|e| e.width == width && e.value == Some(value))
        .map(|e| e.offset)
}

fn rewrite_pool_load(sections: &mut [Section], pool_index: usize, load: &PoolLoad, inst_addr: VirtAddr, offset: usize) -> Result<()> {
    let Section::Pool(pool) = &sections[pool_index] else {
        unreachable!()
    };
    let target_addr = pool.bytes.addr_at(offset).expect("pool section just flattened");

    let mut operands = Operands::new();
    operands.set("rd", load.reg.0 as Value);
    operands.set("target", target_addr.0 as Value);

    let (parts, word_bytes): (Vec<gba_asm_isa::CodePart>, usize) = match (load.isa, load.width, load.signed) {
        (Isa::Arm, 4, _) => {
            operands.set("cond", load.cond as Value);
            (tables::arm::ldr_pc(false), 4)
        }
        (Isa::Arm, 1, signed) => {
            operands.set("cond", load.cond as Value);
            if signed {
                (tables::arm::ldrh_pc(true, false), 4)
            } else {
                (tables::arm::ldr_pc(true), 4)
            }
        }
        (Isa::Arm, 2, signed) => {
            operands.set("cond", load.cond as Value);
            (tables::arm::ldrh_pc(signed, true), 4)
        }
        (Isa::Thumb, 4, _) => (tables::thumb::ldr_pc(), 2),
        (isa, width, _) => unreachable!("unsupported pool-load shape: {isa:?} width {width}"),
    };

    // The instruction's own address is already known, so `encode` can only
    // fail here, never return `NotReady`. An out-of-range offset is exactly
    // "pool too far" (spec §4.5 "Rewriting pool loads"); any other error
    // would mean this table/operand pairing is wrong, a programming bug.
    match encode(load.isa, &parts, &operands, Some(inst_addr)) {
        Ok(EncodeOutcome::Word(w)) => {
            let bytes = if word_bytes == 2 {
                (w as u16).to_le_bytes().to_vec()
            } else {
                w.to_le_bytes().to_vec()
            };
            load.rewrite.write(sections, &bytes);
            Ok(())
        }
        Ok(EncodeOutcome::NotReady) => unreachable!("pool rewrite always supplies the instruction's address"),
        Err(gba_asm_isa::EncodeError::ImmediateOutOfRange { .. }) => Err(CoreError::PoolTooFar {
            pos: load.pos.clone(),
            offset: target_addr.0 as i64 - inst_addr.0 as i64,
            max: 0xfff,
        }),
        Err(source) => Err(CoreError::Encode { pos: load.pos.clone(), source }),
    }
}

/// Spec §4.5 step 4: pad to 4 bytes (ARM), 2 bytes (Thumb), or leave as-is.
fn end_align(pool: &mut PoolSection) {
    let align = pool.end_align.max(1) as usize;
    let rem = pool.bytes.buf.len() % align;
    if rem != 0 {
        pool.bytes.buf.resize(pool.bytes.buf.len() + (align - rem), 0);
    }
}

/// Retries every entry still waiting on a late write (spec §4.9
/// `endOfFile`/`makeEnd`): called after the owning pending writes' own
/// scope-resolvable symbols might have settled.
pub fn retry_late_entries(pool: &mut PoolSection, fail_if_not_found: bool) -> Result<bool> {
    let mut all_done = true;
    for entry in &mut pool.entries {
        let Some((operand, scope)) = &mut entry.late else { continue };
        let ctx = PendingContext { scope: &*scope, own_addr: None };
        let pos = SourcePos::synthetic("pool");
        match operand.resolve(&ctx, fail_if_not_found, &pos)? {
            Some(v) => {
                entry.value = Some(v);
                let width = entry.width as usize;
                let bytes = v.to_le_bytes()[..width].to_vec();
                pool.bytes.write_at(entry.offset, &bytes);
                entry.late = None;
            }
            None => all_done = false,
        }
    }
    Ok(all_done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::BytesSection;

    fn make_instruction_section() -> Section {
        let mut bytes = BytesSection::default();
        bytes.reserve(4);
        bytes.flatten(BaseFrame::rom_default(), 0);
        Section::Bytes(bytes)
    }

    #[test]
    fn resolved_constant_is_deduplicated_across_loads() {
        let mut sections = vec![make_instruction_section(), make_instruction_section(), Section::Pool(PoolSection {
            end_align: 4,
            ..Default::default()
        })];

        let scope = ScopeChain::new();
        let mut loads = vec![
            PoolLoad {
                id: PendingWriteId(0),
                isa: Isa::Arm,
                width: 4,
                signed: false,
                reg: Reg(0),
                cond: 0b1110,
                target: Operand::number(0x1234_5678),
                rewrite: RewriteHandle::new(0, 0, 4),
                scope: scope.clone(),
                pos: SourcePos::synthetic("t"),
            },
            PoolLoad {
                id: PendingWriteId(1),
                isa: Isa::Arm,
                width: 4,
                signed: false,
                reg: Reg(1),
                cond: 0b1110,
                target: Operand::number(0x1234_5678),
                rewrite: RewriteHandle::new(1, 0, 4),
                scope,
                pos: SourcePos::synthetic("t"),
            },
        ];

        flatten_pool(&mut sections, 2, BaseFrame::rom_default(), 8, &mut loads).unwrap();
        let Section::Pool(pool) = &sections[2] else { unreachable!() };
        assert_eq!(pool.entries.len(), 1, "second load should reuse the first entry");
    }

    #[test]
    fn rotatable_constant_is_converted_to_mov_without_allocating() {
        let mut sections = vec![make_instruction_section(), Section::Pool(PoolSection::default())];
        let scope = ScopeChain::new();
        let mut loads = vec![PoolLoad {
            id: PendingWriteId(0),
            isa: Isa::Arm,
            width: 4,
            signed: false,
            reg: Reg(0),
            cond: 0b1110,
            target: Operand::number(0x3f000),
            rewrite: RewriteHandle::new(0, 0, 4),
            scope,
            pos: SourcePos::synthetic("t"),
        }];

        flatten_pool(&mut sections, 1, BaseFrame::rom_default(), 4, &mut loads).unwrap();
        let Section::Pool(pool) = &sections[1] else { unreachable!() };
        assert!(pool.entries.is_empty(), "mov-convertible constant should skip pool allocation");
        let Section::Bytes(inst) = &sections[0] else { unreachable!() };
        assert_eq!(inst.buf, [0x3f, 0x0a, 0xa0, 0xe3]);
    }
}
