//! End-to-end scenarios driving the full `Driver` + `Project` pipeline
//! against an in-memory `ProjectIo`, covering the concrete build scenarios
//! a GBA assembler needs to reproduce byte-for-byte.

use std::collections::HashMap;
use std::rc::Rc;

use gba_asm_cli::Driver;
use gba_asm_core::{CoreError, Project, ProjectIo};

/// A fixed set of named source files and binary blobs, keyed by the path a
/// `.include`/`.embed` directive would name. No filesystem touched.
#[derive(Default)]
struct MapIo {
    text: HashMap<String, String>,
    binary: HashMap<String, Vec<u8>>,
}

impl MapIo {
    fn with_main(source: &str) -> Self {
        let mut io = Self::default();
        io.text.insert("main.s".to_string(), source.to_string());
        io
    }

    fn add_binary(mut self, path: &str, data: Vec<u8>) -> Self {
        self.binary.insert(path.to_string(), data);
        self
    }
}

impl ProjectIo for MapIo {
    fn read_text(&self, path: &str) -> gba_asm_core::Result<String> {
        self.text.get(path).cloned().ok_or_else(|| CoreError::Io {
            pos: gba_asm_types::SourcePos::synthetic("test-io"),
            path: path.to_string(),
            message: "not in the in-memory fixture".to_string(),
        })
    }

    fn read_binary(&self, path: &str) -> gba_asm_core::Result<Vec<u8>> {
        self.binary.get(path).cloned().ok_or_else(|| CoreError::Io {
            pos: gba_asm_types::SourcePos::synthetic("test-io"),
            path: path.to_string(),
            message: "not in the in-memory fixture".to_string(),
        })
    }
}

fn assemble(source: &str) -> Vec<u8> {
    assemble_with_io(MapIo::with_main(source))
}

fn assemble_with_io(io: MapIo) -> Vec<u8> {
    let mut project = Project::new("main.s", Rc::new(io), Rc::new(Driver::new()));
    project.make().expect("assembly should succeed").rom
}

#[test]
fn minimal_self_branch() {
    let rom = assemble(".arm\nstart:\nb start\n");
    assert_eq!(rom, vec![0xfe, 0xff, 0xff, 0xea]);
}

#[test]
fn rotated_immediate_mov() {
    // 0x3f000 = 0x3f ROR 20 (rotate field 10, imm8 0x3f).
    let rom = assemble(".arm\nmov r0, #0x3f000\n");
    assert_eq!(rom, vec![0x3f, 0x0a, 0xa0, 0xe3]);
}

#[test]
fn pool_loads_dedup_to_one_entry() {
    let rom = assemble(".arm\nldr r0, =0x12345678\nldr r1, =0x12345678\n.pool\n");
    // Two 4-byte loads, then the pool's single deduplicated 4-byte entry.
    assert_eq!(rom.len(), 12);
    assert_eq!(&rom[8..12], &[0x78, 0x56, 0x34, 0x12]);

    let load0 = u32::from_le_bytes(rom[0..4].try_into().unwrap());
    let load1 = u32::from_le_bytes(rom[4..8].try_into().unwrap());
    let offset0 = load0 & 0xfff;
    let offset1 = load1 & 0xfff;
    assert_eq!(offset0, offset1, "both loads must target the same pool offset");
}

#[test]
fn pool_inline_conversion_emits_no_entry() {
    let rom = assemble(".arm\nldr r0, =0xff\n.pool\n");
    // `mov r0, #0xff`: cond=AL(e), opcode=3b(mov,no rotate,imm8=0xff)... the
    // exact byte pattern is encoder output, but inlining means no 4-byte
    // pool entry follows the single instruction.
    assert_eq!(rom.len(), 4);
}

#[test]
fn ldrb_pool_load_uses_a_byte_width_entry() {
    let rom = assemble(".arm\nldrb r0, =0xab\n.pool\n");
    // Instruction, then a byte-wide pool entry padded to ARM's 4-byte
    // section alignment: [0xab, 0, 0, 0].
    assert_eq!(rom.len(), 8);
    assert_eq!(&rom[4..8], &[0xab, 0, 0, 0]);

    let word = u32::from_le_bytes(rom[0..4].try_into().unwrap());
    assert_eq!((word >> 20) & 1, 1, "L bit: load");
    assert_eq!((word >> 22) & 1, 1, "B bit: byte transfer, not word");
    assert_eq!((word >> 16) & 0xf, 15, "rn fixed to pc");
    assert_eq!((word >> 12) & 0xf, 0, "rd = r0");
}

#[test]
fn ldrsh_pool_load_uses_a_halfword_signed_entry() {
    let rom = assemble(".arm\nldrsh r0, =0x1234\n.pool\n");
    // Halfword entry padded to ARM's 4-byte section alignment.
    assert_eq!(rom.len(), 8);
    assert_eq!(&rom[4..6], &[0x34, 0x12]);

    let word = u32::from_le_bytes(rom[0..4].try_into().unwrap());
    assert_eq!((word >> 20) & 1, 1, "L bit: load");
    assert_eq!((word >> 5) & 1, 1, "H bit: halfword");
    assert_eq!((word >> 6) & 1, 1, "S bit: signed");
    assert_eq!((word >> 16) & 0xf, 15, "rn fixed to pc");
    assert_eq!((word >> 12) & 0xf, 0, "rd = r0");
}

#[test]
fn thumb_long_branch_splits_into_two_halves() {
    let mut source = String::from(".thumb\nbl far\n");
    for _ in 0..0x200 {
        source.push_str(".u8 0\n");
    }
    source.push_str("far:\n");
    let rom = assemble(&source);

    let hi = u16::from_le_bytes(rom[0..2].try_into().unwrap());
    let lo = u16::from_le_bytes(rom[2..4].try_into().unwrap());
    assert_eq!(hi >> 11, 0b11110);
    assert_eq!(lo >> 11, 0b11111);

    // Each half is its own pending write, resolved against its own
    // instruction address two bytes apart: `hi`'s high 11 bits come from
    // `target - addr_hi - 4`, `lo`'s low 11 bits from `target - addr_lo - 4`.
    let target = 0x0800_0000i64 + rom.len() as i64;
    let addr_hi = 0x0800_0000i64;
    let addr_lo = addr_hi + 2;
    let hi_offset = target - addr_hi - 4;
    let lo_offset = target - addr_lo - 4;
    assert_eq!((hi & 0x7ff) as i64, (hi_offset >> 11) & 0x7ff);
    assert_eq!((lo & 0x7ff) as i64, lo_offset & 0x7ff);
}

#[test]
fn header_crc_satisfies_its_own_formula() {
    let logo = vec![0u8; 156];
    let source = concat!(
        "b start\n",
        ".embed \"logo.bin\"\n",
        ".title \"HELLO\"\n",
        ".fill8 17, 0\n",
        ".crc\n",
        "start:\n",
        "b start\n",
    );
    let rom = assemble_with_io(MapIo::with_main(source).add_binary("logo.bin", logo));

    let sum: i64 = rom[0xa0..0xbd].iter().map(|b| *b as i64).sum();
    let expected = ((-0x19i64 - sum).rem_euclid(256)) as u8;
    assert_eq!(rom[0xbd], expected);
}

#[test]
fn missing_include_reports_an_io_error() {
    let source = ".include \"missing.s\"\n";
    let mut project = Project::new("main.s", Rc::new(MapIo::with_main(source)), Rc::new(Driver::new()));
    let err = project.make().unwrap_err();
    assert!(matches!(err, CoreError::Io { .. }));
}

#[test]
fn unknown_mnemonic_is_rejected() {
    let mut project = Project::new("main.s", Rc::new(MapIo::with_main(".arm\nnotareal r0, r1\n")), Rc::new(Driver::new()));
    let err = project.make().unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }));
}

#[test]
fn if_else_endif_selects_the_active_branch() {
    let rom = assemble(".arm\n.if 0\nmov r0, #1\n.else\nmov r0, #2\n.endif\n");
    assert_eq!(rom, vec![0x02, 0x00, 0xa0, 0xe3]);
}

#[test]
fn struct_field_access_resolves_to_an_immediate_offset() {
    let source = concat!(
        ".struct Entity\n",
        ".u16 x\n",
        ".u16 y\n",
        ".endstruct\n",
        ".arm\n",
        "tld.u16 r0, [r1, Entity.y]\n",
    );
    let rom = assemble(source);
    assert_eq!(rom.len(), 4);
    // `y` sits at offset 2 in `Entity`; that's the LDRH immediate field.
    let word = u32::from_le_bytes(rom.try_into().unwrap());
    let immed_lo = word & 0xf;
    let immed_hi = (word >> 8) & 0xf;
    assert_eq!((immed_hi << 4) | immed_lo, 2);
}
