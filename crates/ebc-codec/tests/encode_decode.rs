//! Encoder/decoder integration tests

use ebc_codec::opcode::{FAMILY_MASK, bits};
use ebc_codec::shape::FamilyDesc;
use ebc_codec::{
    CodeBuffer, CodecError, FixupKind, ImmediateWidth, IndexWidth, Instruction, Op, Operand,
    Register, ShapeFlags, decode, encode, instructions, shapes_for,
};

#[test]
fn test_movqw_end_to_end() {
    // MOVqw R0, @R1(+0, +8)
    let inst = Instruction::builder(Op::MovQw)
        .modifiers(bits::OP2_INDEX)
        .control(bits::OP2_INDIRECT)
        .register(Register::R0)
        .register(Register::R1)
        .index(0, 8, IndexWidth::W16)
        .build();

    let mut bytes = Vec::new();
    let encoded = encode(&inst, &mut bytes).unwrap();
    assert_eq!(bytes, [0x60, 0x90, 0x08, 0x00]);
    assert!(encoded.fixups.is_empty());

    let decoded = decode(&bytes, 0x1000).unwrap();
    assert_eq!(decoded.size, encoded.size);
    match &decoded.instruction.operands()[2] {
        Operand::Index(idx) => assert_eq!((idx.natural, idx.constant), (0, 8)),
        other => panic!("expected an index, got {:?}", other),
    }
    assert_eq!(decoded.instruction, inst);
}

#[test]
fn test_nop_bytes() {
    let mut bytes = Vec::new();
    encode(&Instruction::nop(), &mut bytes).unwrap();
    assert_eq!(bytes, ebc_codec::NOP);
}

#[test]
fn test_short_buffers_rejected() {
    for bytes in [&[][..], &[0x28][..], &[0x00][..], &[0x02][..]] {
        assert!(matches!(
            decode(bytes, 0),
            Err(CodecError::InsufficientBytes { needed: 2, .. })
        ));
    }
}

#[test]
fn test_encoder_determinism() {
    let inst = Instruction::builder(Op::MovRel)
        .modifiers(bits::DATA64)
        .control(bits::MOVI_OP1_INDEX)
        .register(Register::R2)
        .index(2, 16, IndexWidth::W16)
        .symbol("vtable", 24)
        .build();

    let mut first = Vec::new();
    let mut second = Vec::new();
    let a = encode(&inst, &mut first).unwrap();
    let b = encode(&inst, &mut second).unwrap();
    assert_eq!(first, second);
    assert_eq!(a, b);

    assert_eq!(a.size, 12);
    assert_eq!(a.fixups.len(), 1);
    assert_eq!(a.fixups[0].offset, 4);
    assert_eq!(a.fixups[0].kind, FixupKind::PcRel64);
    assert!(a.fixups[0].is_pc_relative());
    assert_eq!(&first[4..], &[0u8; 8]);
}

#[test]
fn test_shape_table_deterministic_and_exclusive() {
    for byte0 in 0..=u8::MAX {
        for byte1 in 0..=u8::MAX {
            let family = byte0 & FAMILY_MASK;
            let flags = shapes_for(family, byte0, byte1);
            assert_eq!(flags, shapes_for(family, byte0, byte1));
            assert!(
                (flags & ShapeFlags::OP1).bits().count_ones() <= 1,
                "{byte0:#04x} {byte1:#04x} sets two operand 1 fields"
            );
            assert!(
                (flags & ShapeFlags::OP2).bits().count_ones() <= 1,
                "{byte0:#04x} {byte1:#04x} sets two operand 2 fields"
            );
        }
    }
}

#[test]
fn test_every_family_reencodes() {
    // every valid opcode pair with zeroed data decodes and re-encodes verbatim
    for byte0 in 0..=u8::MAX {
        for byte1 in 0..=u8::MAX {
            let mut bytes = vec![byte0, byte1];
            bytes.resize(18, 0);
            let Ok(decoded) = decode(&bytes, 0) else {
                continue;
            };
            let mut out = Vec::new();
            encode(&decoded.instruction, &mut out).unwrap();
            assert_eq!(out, bytes[..decoded.size], "{byte0:#04x} {byte1:#04x}");
        }
    }
}

#[test]
fn test_fixup_resolution() {
    let loop_top = Instruction::builder(Op::Add)
        .register(Register::R1)
        .register(Register::R2)
        .build();
    let jmp8 = Instruction::builder(Op::Jmp8)
        .modifiers(bits::JMP8_CONDITIONAL)
        .symbol("loop", 0)
        .build();
    let call = Instruction::builder(Op::Call)
        .modifiers(bits::DATA)
        .control(bits::RELATIVE)
        .register(Register::R0)
        .symbol("helper", 0)
        .build();

    let mut buffer = CodeBuffer::new();
    buffer.push(&loop_top).unwrap();
    buffer.push(&jmp8).unwrap();
    buffer.push(&call).unwrap();
    buffer.push(&Instruction::builder(Op::Ret).build()).unwrap();

    let fixups = buffer.fixups().to_vec();
    assert_eq!(fixups.len(), 2);
    assert_eq!((fixups[0].offset, fixups[0].kind), (3, FixupKind::PcRel8));
    assert_eq!((fixups[1].offset, fixups[1].kind), (6, FixupKind::PcRelCall32));

    // JMP8 counts from the end of its 2-byte encoding at offset 2 back to 0
    buffer.patch(&fixups[0], -4).unwrap();
    // "helper" sits at 0x100 in a code image loaded at 0
    let call_value = fixups[1].value_for(0x100, fixups[1].offset as u64);
    buffer.patch(&fixups[1], call_value).unwrap();

    let decoded: Vec<_> = instructions(buffer.code(), 0)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded.len(), 4);

    let (_, jmp) = &decoded[1];
    assert_eq!(
        jmp.instruction.operands(),
        &[Operand::imm(-2, ImmediateWidth::W8)]
    );
    let (_, call) = &decoded[2];
    assert_eq!(
        call.instruction.operands()[1],
        Operand::imm(0x100 - 6 - 4, ImmediateWidth::W32)
    );
}

#[test]
fn test_misaligned_fixup_reported() {
    let jmp8 = Instruction::builder(Op::Jmp8).symbol("odd", 0).build();
    let mut buffer = CodeBuffer::new();
    buffer.push(&jmp8).unwrap();
    let fixup = buffer.fixups()[0].clone();
    assert!(matches!(
        buffer.patch(&fixup, 3),
        Err(CodecError::FixupMisaligned {
            kind: FixupKind::PcRel8,
            ..
        })
    ));
}

#[test]
fn test_family_sizes() {
    for op in ebc_codec::opcode::ALL_OPS {
        let desc = FamilyDesc::of(op);
        let expected = if op.is_one_byte() { 1 } else { 2 };
        assert_eq!(desc.size, expected, "{op}");
    }
}

#[test]
fn test_instruction_serializes() {
    let inst = Instruction::builder(Op::MovI)
        .modifiers(bits::DATA16)
        .register(Register::R5)
        .imm(-1, ImmediateWidth::W16)
        .build();
    let json = serde_json::to_value(&inst).unwrap();
    assert_eq!(json["op"], "MovI");
    assert_eq!(json["size"], 4);
    assert_eq!(json["operands"][1]["Immediate"]["value"], -1);
}
