//! Instruction decoder

use std::iter::FusedIterator;

use crate::error::{CodecError, Result};
use crate::index::Index;
use crate::instruction::Instruction;
use crate::opcode::{MODIFIER_MASK, Op};
use crate::operand::{Immediate, ImmediateWidth, Operand};
use crate::shape::{self, ShapeFlags, Slot};

/// A decoded instruction and the number of bytes it occupied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The instruction
    pub instruction: Instruction,
    /// Bytes consumed
    pub size: usize,
}

/// Read a little-endian unsigned field
fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Sign-extend the low `bits` bits of `raw`
#[inline]
fn sign_extend(raw: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Decode one instruction from the start of `bytes`
///
/// `address` is where `bytes` lives; it only appears in diagnostics. The
/// decoder never reads past the instruction it returns, and fails without
/// consuming anything when the opcode is unknown or the slice is short.
pub fn decode(bytes: &[u8], address: u64) -> Result<Decoded> {
    let result = decode_inner(bytes);
    match &result {
        Ok(decoded) => tracing::trace!(
            "Decoded {} at {:#x} ({} bytes)",
            decoded.instruction.op(),
            address,
            decoded.size
        ),
        Err(err) => tracing::trace!("Decode failed at {:#x}: {}", address, err),
    }
    result
}

fn decode_inner(bytes: &[u8]) -> Result<Decoded> {
    if bytes.len() < 2 {
        return Err(CodecError::InsufficientBytes {
            needed: 2,
            available: bytes.len(),
        });
    }
    let (byte0, byte1) = (bytes[0], bytes[1]);

    // One-byte and two-byte opcodes share the family table: a one-byte family
    // matches on byte 0 alone, a two-byte family also checks byte 1.
    let desc = shape::lookup(byte0)
        .filter(|desc| desc.matches(byte0, byte1))
        .ok_or(CodecError::UnknownOpcode { byte0, byte1 })?;

    let mut operands = Vec::new();
    let control = if desc.size == 1 {
        0
    } else {
        let layout = desc.layout(byte0);
        operands.extend(layout.extract(byte1)?.into_iter().map(Operand::Register));
        byte1 & !layout.mask()
    };

    let shape = desc.shapes(byte0, byte1);
    let size = desc.size + shape.data_size();
    if bytes.len() < size {
        return Err(CodecError::InsufficientBytes {
            needed: size,
            available: bytes.len(),
        });
    }

    let mut cursor = desc.size;
    if shape.contains(ShapeFlags::BREAK_CODE) {
        operands.push(Operand::imm(i64::from(bytes[cursor]), ImmediateWidth::W8));
        cursor += 1;
    } else {
        for slot in [shape.op1(), shape.op2()].into_iter().flatten() {
            let field = &bytes[cursor..cursor + slot.bytes()];
            operands.push(decode_field(slot, field, operands.len())?);
            cursor += slot.bytes();
        }
    }
    debug_assert_eq!(cursor, size);

    let op = desc.op;
    let instruction = Instruction::from_parts(
        op,
        byte0 & MODIFIER_MASK,
        control,
        operands,
        shape,
        size,
    );
    Ok(Decoded { instruction, size })
}

fn decode_field(slot: Slot, field: &[u8], position: usize) -> Result<Operand> {
    let raw = read_le(field);
    match slot {
        Slot::Imm(width) => Ok(Operand::Immediate(Immediate::new(
            sign_extend(raw, width.bits()),
            width,
        ))),
        Slot::Idx(width) => Index::unpack(raw, width)
            .map(Operand::Index)
            .map_err(|err| err.at_operand(position)),
    }
}

/// Sequential decoder over a byte slice
///
/// Yields `(address, Decoded)` pairs and stops after the first error; where
/// to resume scanning is up to the caller.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    bytes: &'a [u8],
    offset: usize,
    base: u64,
    failed: bool,
}

impl<'a> Instructions<'a> {
    /// Decode `bytes`, which start at `base`
    pub fn new(bytes: &'a [u8], base: u64) -> Self {
        Self {
            bytes,
            offset: 0,
            base,
            failed: false,
        }
    }

    /// Offset of the next instruction within the slice
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not yet decoded
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<(u64, Decoded)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        let address = self.base.wrapping_add(self.offset as u64);
        match decode(self.remaining(), address) {
            Ok(decoded) => {
                self.offset += decoded.size;
                Some(Ok((address, decoded)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Instructions<'_> {}

/// Decode `bytes` sequentially, starting at `base`
pub fn instructions(bytes: &[u8], base: u64) -> Instructions<'_> {
    Instructions::new(bytes, base)
}

/// Family of the instruction starting at `bytes`, without decoding operands
pub fn peek_op(bytes: &[u8]) -> Option<Op> {
    let byte0 = *bytes.first()?;
    let byte1 = bytes.get(1).copied().unwrap_or(0);
    shape::lookup(byte0)
        .filter(|desc| desc.matches(byte0, byte1))
        .map(|desc| desc.op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexWidth;
    use crate::operand::Register;

    #[test]
    fn test_short_buffer() {
        assert_eq!(
            decode(&[0x28], 0),
            Err(CodecError::InsufficientBytes {
                needed: 2,
                available: 1
            })
        );
        assert!(decode(&[], 0).is_err());
    }

    #[test]
    fn test_nop() {
        let decoded = decode(&[0x28, 0x00], 0).unwrap();
        assert_eq!(decoded.size, 2);
        assert_eq!(decoded.instruction, Instruction::nop());
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            decode(&[0x27, 0x00], 0),
            Err(CodecError::UnknownOpcode {
                byte0: 0x27,
                byte1: 0x00
            })
        );
        // RET with a reserved bit set
        assert!(matches!(
            decode(&[0x04, 0x01], 0),
            Err(CodecError::UnknownOpcode { .. })
        ));
        // MOVI without a data width
        assert!(matches!(
            decode(&[0x37, 0x00, 0, 0], 0),
            Err(CodecError::UnknownOpcode { .. })
        ));
    }

    #[test]
    fn test_break() {
        let decoded = decode(&[0x00, 0x03], 0x1000).unwrap();
        assert_eq!(decoded.size, 2);
        assert_eq!(decoded.instruction.op(), Op::Break);
        assert_eq!(
            decoded.instruction.operands(),
            &[Operand::imm(3, ImmediateWidth::W8)]
        );

        // break codes are unsigned
        let decoded = decode(&[0x00, 0xFF], 0).unwrap();
        assert_eq!(
            decoded.instruction.operands(),
            &[Operand::imm(255, ImmediateWidth::W8)]
        );
    }

    #[test]
    fn test_jmp8() {
        let decoded = decode(&[0xC2, 0xFE], 0).unwrap();
        assert_eq!(decoded.instruction.op(), Op::Jmp8);
        assert_eq!(decoded.instruction.modifiers(), 0xC0);
        assert_eq!(decoded.instruction.control(), 0);
        assert_eq!(
            decoded.instruction.operands(),
            &[Operand::imm(-2, ImmediateWidth::W8)]
        );
    }

    #[test]
    fn test_movqw_index() {
        // MOVqw R0, @R1(+0, +8)
        let decoded = decode(&[0x60, 0x90, 0x08, 0x00], 0).unwrap();
        assert_eq!(decoded.size, 4);
        let inst = decoded.instruction;
        assert_eq!(inst.op(), Op::MovQw);
        assert_eq!(inst.control(), 0x80);
        assert_eq!(
            inst.operands(),
            &[
                Operand::Register(Register::R0),
                Operand::Register(Register::R1),
                Operand::index(0, 8, IndexWidth::W16),
            ]
        );
    }

    #[test]
    fn test_movi_imm64() {
        let bytes = [0xF7, 0x71, 0x04, 0x20, 0xEF, 0xCD, 0xAB, 0x89, 0x67, 0x45, 0x23, 0x01];
        let decoded = decode(&bytes, 0).unwrap();
        assert_eq!(decoded.size, 12);
        assert_eq!(
            decoded.instruction.operands(),
            &[
                Operand::Register(Register::R1),
                Operand::index(4, 0, IndexWidth::W16),
                Operand::imm(0x0123_4567_89AB_CDEF, ImmediateWidth::W64),
            ]
        );
    }

    #[test]
    fn test_negative_immediate() {
        // ADD R1, R2 -2
        let decoded = decode(&[0x8C, 0x21, 0xFE, 0xFF], 0).unwrap();
        assert_eq!(
            decoded.instruction.operands()[2],
            Operand::imm(-2, ImmediateWidth::W16)
        );
    }

    #[test]
    fn test_truncated_operand() {
        assert_eq!(
            decode(&[0x8C, 0x21, 0xFE], 0),
            Err(CodecError::InsufficientBytes {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_invalid_index() {
        assert_eq!(
            decode(&[0x60, 0x90, 0x00, 0x70], 0),
            Err(CodecError::InvalidIndex {
                bits: 0x7000,
                width: 16
            })
        );
    }

    #[test]
    fn test_dedicated_registers() {
        // STORESP R1, [IP]
        let decoded = decode(&[0x2A, 0x11], 0).unwrap();
        assert_eq!(
            decoded.instruction.operands(),
            &[
                Operand::Register(Register::R1),
                Operand::Register(Register::Ip)
            ]
        );
        assert_eq!(
            decode(&[0x2A, 0x21], 0),
            Err(CodecError::InvalidRegister { field: 2, value: 2 })
        );
    }

    #[test]
    fn test_jmp64_has_no_register() {
        let mut bytes = vec![0xC1, 0x00];
        bytes.extend_from_slice(&0x1000u64.to_le_bytes());
        let decoded = decode(&bytes, 0).unwrap();
        assert_eq!(decoded.size, 10);
        assert_eq!(
            decoded.instruction.operands(),
            &[Operand::imm(0x1000, ImmediateWidth::W64)]
        );
    }

    #[test]
    fn test_instructions_iterator() {
        // NOP; RET; unassigned family
        let bytes = [0x28, 0x00, 0x04, 0x00, 0x3F, 0x00, 0x28, 0x00];
        let mut iter = instructions(&bytes, 0x400);

        let (address, first) = iter.next().unwrap().unwrap();
        assert_eq!((address, first.instruction.op()), (0x400, Op::MovQq));
        let (address, second) = iter.next().unwrap().unwrap();
        assert_eq!((address, second.instruction.op()), (0x402, Op::Ret));
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        assert_eq!(iter.offset(), 4);
        assert_eq!(iter.remaining().len(), 4);
    }

    #[test]
    fn test_peek_op() {
        assert_eq!(peek_op(&[0x02]), Some(Op::Jmp8));
        assert_eq!(peek_op(&[0xB7, 0x01]), Some(Op::MovI));
        assert_eq!(peek_op(&[0x3A, 0x00]), None);
        assert_eq!(peek_op(&[]), None);
    }
}
