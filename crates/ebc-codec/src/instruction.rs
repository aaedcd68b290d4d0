//! Structured instructions

use serde::Serialize;

use crate::index::{Index, IndexWidth};
use crate::opcode::{MODIFIER_MASK, Op};
use crate::operand::{ImmediateWidth, Operand, Register, SymbolRef};
use crate::shape::{FamilyDesc, ShapeFlags};

/// A single instruction
///
/// Byte 0 is `op | modifiers`. Byte 1 (for two-byte opcodes) is `control`
/// combined with the register fields of the leading register operands.
/// Operands are ordered: registers (operand 1, operand 2), then the operand 1
/// data field, then the operand 2 data field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Instruction {
    op: Op,
    modifiers: u8,
    control: u8,
    operands: Vec<Operand>,
    shape: ShapeFlags,
    size: usize,
}

impl Instruction {
    /// Create a builder for `op`
    pub fn builder(op: Op) -> InstructionBuilder {
        InstructionBuilder::new(op)
    }

    /// The canonical NOP, `MOVqq R0, R0`
    pub fn nop() -> Self {
        Self::builder(Op::MovQq)
            .register(Register::R0)
            .register(Register::R0)
            .build()
    }

    pub(crate) fn from_parts(
        op: Op,
        modifiers: u8,
        control: u8,
        operands: Vec<Operand>,
        shape: ShapeFlags,
        size: usize,
    ) -> Self {
        Self {
            op,
            modifiers,
            control,
            operands,
            shape,
            size,
        }
    }

    /// Opcode family
    #[inline]
    pub fn op(&self) -> Op {
        self.op
    }

    /// Byte 0 bits 6-7
    #[inline]
    pub fn modifiers(&self) -> u8 {
        self.modifiers
    }

    /// Byte 1 bits outside the register fields
    #[inline]
    pub fn control(&self) -> u8 {
        self.control
    }

    /// First opcode byte
    #[inline]
    pub fn byte0(&self) -> u8 {
        self.op.to_byte() | self.modifiers
    }

    /// Operands in encoding order
    #[inline]
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Operand fields selected by the opcode bytes
    #[inline]
    pub fn shape(&self) -> ShapeFlags {
        self.shape
    }

    /// Encoded length in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Register operands
    pub fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.operands.iter().filter_map(|operand| match operand {
            Operand::Register(reg) => Some(*reg),
            _ => None,
        })
    }

    /// Index operands
    pub fn indexes(&self) -> impl Iterator<Item = &Index> + '_ {
        self.operands.iter().filter_map(|operand| match operand {
            Operand::Index(idx) => Some(idx),
            _ => None,
        })
    }

    /// Symbolic operands
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolRef> + '_ {
        self.operands.iter().filter_map(|operand| match operand {
            Operand::Symbol(sym) => Some(sym),
            _ => None,
        })
    }

    /// Does any operand still need a fixup
    pub fn has_symbols(&self) -> bool {
        self.symbols().next().is_some()
    }
}

/// Builder for instructions
///
/// Shape and length are derived from the opcode bytes when the instruction
/// is frozen by [`build`](Self::build); operand validation happens when it is
/// encoded.
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    op: Op,
    modifiers: u8,
    control: u8,
    operands: Vec<Operand>,
}

impl InstructionBuilder {
    /// Create a new builder
    pub fn new(op: Op) -> Self {
        Self {
            op,
            modifiers: 0,
            control: 0,
            operands: Vec::new(),
        }
    }

    /// Set byte 0 modifier bits (only bits 6-7 are kept)
    pub fn modifiers(mut self, bits: u8) -> Self {
        self.modifiers = bits & MODIFIER_MASK;
        self
    }

    /// Set byte 1 control bits
    pub fn control(mut self, bits: u8) -> Self {
        self.control = bits;
        self
    }

    /// Add a register operand
    pub fn register(mut self, reg: Register) -> Self {
        self.operands.push(Operand::Register(reg));
        self
    }

    /// Add an immediate operand
    pub fn imm(mut self, value: i64, width: ImmediateWidth) -> Self {
        self.operands.push(Operand::imm(value, width));
        self
    }

    /// Add an index operand
    pub fn index(mut self, natural: i64, constant: i64, width: IndexWidth) -> Self {
        self.operands.push(Operand::index(natural, constant, width));
        self
    }

    /// Add a symbolic operand
    pub fn symbol(mut self, name: &str, addend: i64) -> Self {
        self.operands.push(Operand::symbol(name, addend));
        self
    }

    /// Add any operand
    pub fn operand(mut self, operand: impl Into<Operand>) -> Self {
        self.operands.push(operand.into());
        self
    }

    /// Freeze the instruction
    pub fn build(self) -> Instruction {
        let desc = FamilyDesc::of(self.op);
        let byte0 = self.op.to_byte() | self.modifiers;
        let shape = desc.shapes(byte0, self.control);
        Instruction {
            op: self.op,
            modifiers: self.modifiers,
            control: self.control,
            operands: self.operands,
            shape,
            size: desc.size + shape.data_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::bits;

    #[test]
    fn test_builder() {
        let inst = Instruction::builder(Op::MovQw)
            .modifiers(bits::OP2_INDEX)
            .register(Register::R0)
            .register(Register::R1)
            .index(0, 8, IndexWidth::W16)
            .build();

        assert_eq!(inst.op(), Op::MovQw);
        assert_eq!(inst.byte0(), 0x60);
        assert_eq!(inst.shape(), ShapeFlags::OP2_IDX16);
        assert_eq!(inst.size(), 4);
        assert_eq!(
            inst.registers().collect::<Vec<_>>(),
            vec![Register::R0, Register::R1]
        );
        assert_eq!(inst.indexes().count(), 1);
        assert!(!inst.has_symbols());
    }

    #[test]
    fn test_modifiers_masked() {
        let inst = Instruction::builder(Op::Add).modifiers(0xFF).build();
        assert_eq!(inst.modifiers(), 0xC0);
        assert_eq!(inst.byte0(), 0xCC);
    }

    #[test]
    fn test_nop() {
        let nop = Instruction::nop();
        assert_eq!(nop.op(), Op::MovQq);
        assert_eq!(nop.size(), 2);
        assert_eq!(nop.shape(), ShapeFlags::empty());
    }

    #[test]
    fn test_symbolic_call() {
        let call = Instruction::builder(Op::Call)
            .modifiers(bits::DATA)
            .control(bits::RELATIVE)
            .register(Register::R0)
            .symbol("callee", 0)
            .build();
        assert_eq!(call.shape(), ShapeFlags::OP1_IMM32);
        assert_eq!(call.size(), 6);
        assert!(call.has_symbols());
    }
}
