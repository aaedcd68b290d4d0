//! Opcode shape table
//!
//! Maps the opcode bytes of an instruction to the operand fields that follow
//! them and to the registers folded into byte 1. Each family has one
//! [`FamilyDesc`]: its opcode size, register layout, reserved bits, a small
//! rule deciding the shape from the selector bits, and the fixup class used
//! for symbolic immediates.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::fixup::FixupKind;
use crate::index::IndexWidth;
use crate::opcode::{ALL_OPS, FAMILY_MASK, Op, bits};
use crate::operand::{GPR_COUNT, ImmediateWidth, Register};

bitflags::bitflags! {
    /// Operand fields following the opcode bytes
    ///
    /// At most one `OP1_*` and one `OP2_*` flag is ever set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ShapeFlags: u16 {
        /// Single unsigned break code byte
        const BREAK_CODE = 1 << 0;
        /// Operand 1 8-bit immediate
        const OP1_IMM8 = 1 << 1;
        /// Operand 1 16-bit immediate
        const OP1_IMM16 = 1 << 2;
        /// Operand 1 32-bit immediate
        const OP1_IMM32 = 1 << 3;
        /// Operand 1 64-bit immediate
        const OP1_IMM64 = 1 << 4;
        /// Operand 1 16-bit index
        const OP1_IDX16 = 1 << 5;
        /// Operand 1 32-bit index
        const OP1_IDX32 = 1 << 6;
        /// Operand 1 64-bit index
        const OP1_IDX64 = 1 << 7;
        /// Operand 2 16-bit immediate
        const OP2_IMM16 = 1 << 8;
        /// Operand 2 32-bit immediate
        const OP2_IMM32 = 1 << 9;
        /// Operand 2 64-bit immediate
        const OP2_IMM64 = 1 << 10;
        /// Operand 2 16-bit index
        const OP2_IDX16 = 1 << 11;
        /// Operand 2 32-bit index
        const OP2_IDX32 = 1 << 12;
        /// Operand 2 64-bit index
        const OP2_IDX64 = 1 << 13;

        /// Every operand 1 field
        const OP1 = Self::OP1_IMM8.bits()
            | Self::OP1_IMM16.bits()
            | Self::OP1_IMM32.bits()
            | Self::OP1_IMM64.bits()
            | Self::OP1_IDX16.bits()
            | Self::OP1_IDX32.bits()
            | Self::OP1_IDX64.bits();
        /// Every operand 2 field
        const OP2 = Self::OP2_IMM16.bits()
            | Self::OP2_IMM32.bits()
            | Self::OP2_IMM64.bits()
            | Self::OP2_IDX16.bits()
            | Self::OP2_IDX32.bits()
            | Self::OP2_IDX64.bits();
    }
}

const OP1_SLOTS: [(ShapeFlags, Slot); 7] = [
    (ShapeFlags::OP1_IMM8, Slot::Imm(ImmediateWidth::W8)),
    (ShapeFlags::OP1_IMM16, Slot::Imm(ImmediateWidth::W16)),
    (ShapeFlags::OP1_IMM32, Slot::Imm(ImmediateWidth::W32)),
    (ShapeFlags::OP1_IMM64, Slot::Imm(ImmediateWidth::W64)),
    (ShapeFlags::OP1_IDX16, Slot::Idx(IndexWidth::W16)),
    (ShapeFlags::OP1_IDX32, Slot::Idx(IndexWidth::W32)),
    (ShapeFlags::OP1_IDX64, Slot::Idx(IndexWidth::W64)),
];

const OP2_SLOTS: [(ShapeFlags, Slot); 6] = [
    (ShapeFlags::OP2_IMM16, Slot::Imm(ImmediateWidth::W16)),
    (ShapeFlags::OP2_IMM32, Slot::Imm(ImmediateWidth::W32)),
    (ShapeFlags::OP2_IMM64, Slot::Imm(ImmediateWidth::W64)),
    (ShapeFlags::OP2_IDX16, Slot::Idx(IndexWidth::W16)),
    (ShapeFlags::OP2_IDX32, Slot::Idx(IndexWidth::W32)),
    (ShapeFlags::OP2_IDX64, Slot::Idx(IndexWidth::W64)),
];

impl ShapeFlags {
    /// Operand 1 data field, if any
    pub fn op1(self) -> Option<Slot> {
        OP1_SLOTS
            .iter()
            .find(|(flag, _)| self.contains(*flag))
            .map(|&(_, slot)| slot)
    }

    /// Operand 2 data field, if any
    pub fn op2(self) -> Option<Slot> {
        OP2_SLOTS
            .iter()
            .find(|(flag, _)| self.contains(*flag))
            .map(|&(_, slot)| slot)
    }

    /// At most one field per operand slot
    pub fn is_exclusive(self) -> bool {
        (self & Self::OP1).bits().count_ones() <= 1
            && (self & Self::OP2).bits().count_ones() <= 1
            && !(self.contains(Self::BREAK_CODE) && self.intersects(Self::OP1 | Self::OP2))
    }

    /// Bytes of operand data following the opcode
    pub fn data_size(self) -> usize {
        let break_code = usize::from(self.contains(Self::BREAK_CODE));
        break_code
            + self.op1().map_or(0, Slot::bytes)
            + self.op2().map_or(0, Slot::bytes)
    }

    fn op1_idx(width: IndexWidth) -> Self {
        match width {
            IndexWidth::W16 => Self::OP1_IDX16,
            IndexWidth::W32 => Self::OP1_IDX32,
            IndexWidth::W64 => Self::OP1_IDX64,
        }
    }

    fn op2_imm(width: ImmediateWidth) -> Self {
        match width {
            ImmediateWidth::W8 | ImmediateWidth::W16 => Self::OP2_IMM16,
            ImmediateWidth::W32 => Self::OP2_IMM32,
            ImmediateWidth::W64 => Self::OP2_IMM64,
        }
    }

    fn op2_idx(width: IndexWidth) -> Self {
        match width {
            IndexWidth::W16 => Self::OP2_IDX16,
            IndexWidth::W32 => Self::OP2_IDX32,
            IndexWidth::W64 => Self::OP2_IDX64,
        }
    }
}

/// One operand data field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// Fixed-width immediate
    Imm(ImmediateWidth),
    /// Packed natural/constant index
    Idx(IndexWidth),
}

impl Slot {
    /// Field width in bytes
    pub fn bytes(self) -> usize {
        match self {
            Self::Imm(width) => width.bytes(),
            Self::Idx(width) => width.bytes(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm(width) => write!(f, "{}-bit immediate", width.bits()),
            Self::Idx(width) => write!(f, "{}-bit index", width.bits()),
        }
    }
}

/// What a 3-bit register field may name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    /// R0-R7
    Gpr,
    /// FLAGS only
    Flags,
    /// FLAGS or IP
    Dedicated,
}

impl RegisterClass {
    /// Register named by a raw field value
    pub fn decode(self, value: u8) -> Option<Register> {
        match self {
            Self::Gpr => Register::gpr(value),
            Self::Flags => (value == 0).then_some(Register::Flags),
            Self::Dedicated => Register::dedicated(value),
        }
    }

    /// Can `register` be placed in a field of this class
    pub fn accepts(self, register: Register) -> bool {
        match self {
            Self::Gpr => matches!(register, Register::Gpr(index) if index < GPR_COUNT),
            Self::Flags => register == Register::Flags,
            Self::Dedicated => matches!(register, Register::Flags | Register::Ip),
        }
    }

    /// Diagnostic description
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Gpr => "general purpose register",
            Self::Flags => "FLAGS register",
            Self::Dedicated => "dedicated register",
        }
    }
}

/// Register fields carried in byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLayout {
    /// No registers
    None,
    /// Operand 1 general register in bits 0-2
    Op1,
    /// General registers in bits 0-2 and 4-6
    Op1Op2,
    /// FLAGS in bits 0-2, general register in bits 4-6
    LoadSp,
    /// General register in bits 0-2, dedicated register in bits 4-6
    StoreSp,
}

impl RegisterLayout {
    /// Field classes, operand 1 first
    pub const fn classes(self) -> &'static [RegisterClass] {
        match self {
            Self::None => &[],
            Self::Op1 => &[RegisterClass::Gpr],
            Self::Op1Op2 => &[RegisterClass::Gpr, RegisterClass::Gpr],
            Self::LoadSp => &[RegisterClass::Flags, RegisterClass::Gpr],
            Self::StoreSp => &[RegisterClass::Gpr, RegisterClass::Dedicated],
        }
    }

    /// Byte 1 bits occupied by register fields
    pub const fn mask(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Op1 => 0x07,
            Self::Op1Op2 | Self::LoadSp | Self::StoreSp => 0x77,
        }
    }

    /// Shift of the field holding register operand `position`
    #[inline]
    pub const fn shift(position: usize) -> u32 {
        position as u32 * 4
    }

    /// Extract the registers from byte 1
    pub fn extract(self, byte1: u8) -> Result<Vec<Register>> {
        self.classes()
            .iter()
            .enumerate()
            .map(|(position, class)| {
                let value = (byte1 >> Self::shift(position)) & 0x07;
                class.decode(value).ok_or(CodecError::InvalidRegister {
                    field: position as u8 + 1,
                    value,
                })
            })
            .collect()
    }
}

/// How symbolic immediates of a family are relocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixupClass {
    /// Plain absolute value
    Absolute,
    /// JMP8 displacement
    Jmp8,
    /// JMP: relative when byte 1 says so
    Jump,
    /// CALL: relative 32-bit targets get the call bias
    Call,
    /// MOVREL: always relative
    MovRel,
}

/// Per-family decision of the operand fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeRule {
    /// No operand fields
    Empty,
    /// BREAK
    BreakCode,
    /// JMP8
    Jmp8,
    /// JMP, CALL
    Branch,
    /// CMP and arithmetic: optional 16-bit immediate or index for operand 2
    Arith,
    /// MOV with optional indexes on both sides
    Move(IndexWidth),
    /// MOVsn: optional index on operand 1, immediate or index on operand 2
    MoveSigned(IndexWidth),
    /// PUSH, POP and their natural variants
    Stack,
    /// CMPI
    CompareImm,
    /// MOVI, MOVREL
    MoveImm,
    /// MOVIn
    MoveIndex,
}

impl ShapeRule {
    fn shapes(self, byte0: u8, byte1: u8) -> ShapeFlags {
        let data = byte0 & bits::DATA != 0;
        match self {
            Self::Empty => ShapeFlags::empty(),
            Self::BreakCode => ShapeFlags::BREAK_CODE,
            Self::Jmp8 => ShapeFlags::OP1_IMM8,
            Self::Branch => {
                if !data {
                    ShapeFlags::empty()
                } else if byte0 & bits::WIDE != 0 {
                    ShapeFlags::OP1_IMM64
                } else if byte1 & bits::OP1_INDIRECT != 0 {
                    ShapeFlags::OP1_IDX32
                } else {
                    ShapeFlags::OP1_IMM32
                }
            }
            Self::Arith => match (data, byte1 & bits::OP2_INDIRECT != 0) {
                (false, _) => ShapeFlags::empty(),
                (true, true) => ShapeFlags::OP2_IDX16,
                (true, false) => ShapeFlags::OP2_IMM16,
            },
            Self::Move(width) => {
                let mut flags = ShapeFlags::empty();
                if byte0 & bits::OP1_INDEX != 0 {
                    flags |= ShapeFlags::op1_idx(width);
                }
                if byte0 & bits::OP2_INDEX != 0 {
                    flags |= ShapeFlags::op2_idx(width);
                }
                flags
            }
            Self::MoveSigned(width) => {
                let mut flags = ShapeFlags::empty();
                if byte0 & bits::OP1_INDEX != 0 {
                    flags |= ShapeFlags::op1_idx(width);
                }
                if byte0 & bits::OP2_INDEX != 0 {
                    flags |= if byte1 & bits::OP2_INDIRECT != 0 {
                        ShapeFlags::op2_idx(width)
                    } else {
                        ShapeFlags::op2_imm(index_to_immediate(width))
                    };
                }
                flags
            }
            Self::Stack => match (data, byte1 & bits::OP1_INDIRECT != 0) {
                (false, _) => ShapeFlags::empty(),
                (true, true) => ShapeFlags::OP1_IDX16,
                (true, false) => ShapeFlags::OP1_IMM16,
            },
            Self::CompareImm => {
                let mut flags = if byte0 & bits::CMPI_IMM32 != 0 {
                    ShapeFlags::OP2_IMM32
                } else {
                    ShapeFlags::OP2_IMM16
                };
                if byte1 & bits::CMPI_OP1_INDEX != 0 {
                    flags |= ShapeFlags::OP1_IDX16;
                }
                flags
            }
            Self::MoveImm | Self::MoveIndex => {
                let mut flags = match (self, data_width(byte0)) {
                    (_, None) => ShapeFlags::empty(),
                    (Self::MoveImm, Some(width)) => ShapeFlags::op2_imm(width),
                    (_, Some(width)) => ShapeFlags::op2_idx(immediate_to_index(width)),
                };
                if byte1 & bits::MOVI_OP1_INDEX != 0 {
                    flags |= ShapeFlags::OP1_IDX16;
                }
                flags
            }
        }
    }

    /// Width constraints beyond the reserved bits
    fn accepts(self, byte0: u8) -> bool {
        match self {
            // the 64-bit form only exists with a data field
            Self::Branch => byte0 & bits::WIDE == 0 || byte0 & bits::DATA != 0,
            Self::MoveImm | Self::MoveIndex => data_width(byte0).is_some(),
            _ => true,
        }
    }
}

/// MOVI/MOVIn/MOVREL data width selected by byte 0 bits 6-7
fn data_width(byte0: u8) -> Option<ImmediateWidth> {
    match byte0 & bits::DATA64 {
        bits::DATA16 => Some(ImmediateWidth::W16),
        bits::DATA32 => Some(ImmediateWidth::W32),
        bits::DATA64 => Some(ImmediateWidth::W64),
        _ => None,
    }
}

fn index_to_immediate(width: IndexWidth) -> ImmediateWidth {
    match width {
        IndexWidth::W16 => ImmediateWidth::W16,
        IndexWidth::W32 => ImmediateWidth::W32,
        IndexWidth::W64 => ImmediateWidth::W64,
    }
}

fn immediate_to_index(width: ImmediateWidth) -> IndexWidth {
    match width {
        ImmediateWidth::W8 | ImmediateWidth::W16 => IndexWidth::W16,
        ImmediateWidth::W32 => IndexWidth::W32,
        ImmediateWidth::W64 => IndexWidth::W64,
    }
}

/// Static description of one opcode family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDesc {
    /// Family
    pub op: Op,
    /// Opcode bytes (1 or 2)
    pub size: usize,
    layout: RegisterLayout,
    reserved0: u8,
    reserved1: u8,
    rule: ShapeRule,
    fixups: FixupClass,
}

impl FamilyDesc {
    const fn new(op: Op, layout: RegisterLayout, rule: ShapeRule) -> Self {
        Self {
            op,
            size: 2,
            layout,
            reserved0: 0,
            reserved1: 0,
            rule,
            fixups: FixupClass::Absolute,
        }
    }

    const fn one_byte(mut self) -> Self {
        self.size = 1;
        self
    }

    const fn reserved(mut self, byte0: u8, byte1: u8) -> Self {
        self.reserved0 = byte0;
        self.reserved1 = byte1;
        self
    }

    const fn fixups(mut self, class: FixupClass) -> Self {
        self.fixups = class;
        self
    }

    /// Description of `op`
    pub const fn of(op: Op) -> Self {
        use RegisterLayout as L;
        use ShapeRule as R;

        match op {
            Op::Break => Self::new(op, L::None, R::BreakCode)
                .one_byte()
                .reserved(0xC0, 0),
            Op::Jmp => Self::new(op, L::Op1, R::Branch)
                .reserved(0, 0x20)
                .fixups(FixupClass::Jump),
            Op::Jmp8 => Self::new(op, L::None, R::Jmp8)
                .one_byte()
                .fixups(FixupClass::Jmp8),
            Op::Call => Self::new(op, L::Op1, R::Branch)
                .reserved(0, 0xC0)
                .fixups(FixupClass::Call),
            Op::Ret => Self::new(op, L::None, R::Empty).reserved(0xC0, 0xFF),

            Op::CmpEq | Op::CmpLte | Op::CmpGte | Op::CmpUlte | Op::CmpUgte => {
                Self::new(op, L::Op1Op2, R::Arith).reserved(0, 0x08)
            }

            Op::Not
            | Op::Neg
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Mulu
            | Op::Div
            | Op::Divu
            | Op::Mod
            | Op::Modu
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Shl
            | Op::Shr
            | Op::Ashr
            | Op::Extndb
            | Op::Extndw
            | Op::Extndd => Self::new(op, L::Op1Op2, R::Arith),

            Op::MovBw | Op::MovWw | Op::MovDw | Op::MovQw | Op::MovNw => {
                Self::new(op, L::Op1Op2, R::Move(IndexWidth::W16))
            }
            Op::MovBd | Op::MovWd | Op::MovDd | Op::MovQd | Op::MovNd => {
                Self::new(op, L::Op1Op2, R::Move(IndexWidth::W32))
            }
            Op::MovQq => Self::new(op, L::Op1Op2, R::Move(IndexWidth::W64)),
            Op::MovSnw => Self::new(op, L::Op1Op2, R::MoveSigned(IndexWidth::W16)),
            Op::MovSnd => Self::new(op, L::Op1Op2, R::MoveSigned(IndexWidth::W32)),

            Op::LoadSp => Self::new(op, L::LoadSp, R::Empty).reserved(0xC0, 0x88),
            Op::StoreSp => Self::new(op, L::StoreSp, R::Empty).reserved(0xC0, 0x88),

            Op::Push | Op::Pop => Self::new(op, L::Op1, R::Stack).reserved(0, 0xF0),
            Op::PushN | Op::PopN => Self::new(op, L::Op1, R::Stack).reserved(0x40, 0xF0),

            Op::CmpiEq | Op::CmpiLte | Op::CmpiGte | Op::CmpiUlte | Op::CmpiUgte => {
                Self::new(op, L::Op1, R::CompareImm).reserved(0, 0xE0)
            }

            Op::MovI => Self::new(op, L::Op1, R::MoveImm).reserved(0, 0x80),
            Op::MovIn => Self::new(op, L::Op1, R::MoveIndex).reserved(0, 0xB0),
            Op::MovRel => Self::new(op, L::Op1, R::MoveImm)
                .reserved(0, 0xB0)
                .fixups(FixupClass::MovRel),
        }
    }

    /// Register fields present for the given first byte
    pub fn layout(&self, byte0: u8) -> RegisterLayout {
        match self.rule {
            // a 64-bit branch target replaces the register operand
            ShapeRule::Branch if byte0 & bits::WIDE != 0 => RegisterLayout::None,
            _ => self.layout,
        }
    }

    /// Operand fields selected by the opcode bytes
    #[inline]
    pub fn shapes(&self, byte0: u8, byte1: u8) -> ShapeFlags {
        self.rule.shapes(byte0, byte1)
    }

    /// Do these opcode bytes form a valid encoding of this family
    ///
    /// One-byte opcodes ignore `byte1`.
    pub fn matches(&self, byte0: u8, byte1: u8) -> bool {
        if byte0 & FAMILY_MASK != self.op.to_byte() || byte0 & self.reserved0 != 0 {
            return false;
        }
        if self.size == 1 {
            return true;
        }
        byte1 & self.reserved1 == 0 && self.rule.accepts(byte0)
    }

    /// Fixup kind for a symbolic immediate of `width`
    pub fn fixup_kind(&self, width: ImmediateWidth, byte1: u8) -> Option<FixupKind> {
        let relative = byte1 & bits::RELATIVE != 0;
        match self.fixups {
            FixupClass::Absolute => FixupKind::absolute(width),
            FixupClass::Jmp8 => Some(FixupKind::PcRel8),
            FixupClass::MovRel => Some(FixupKind::pc_relative(width)),
            FixupClass::Jump if relative => Some(FixupKind::pc_relative(width)),
            FixupClass::Call if relative => match width {
                ImmediateWidth::W32 => Some(FixupKind::PcRelCall32),
                _ => Some(FixupKind::pc_relative(width)),
            },
            FixupClass::Jump | FixupClass::Call => FixupKind::absolute(width),
        }
    }

    fn validate(&self) {
        debug_assert!(self.size == 1 || self.size == 2, "{}: bad size", self.op);
        debug_assert!(
            self.size == 2 || self.layout == RegisterLayout::None,
            "{}: one-byte opcode with registers",
            self.op
        );
        debug_assert_eq!(
            self.reserved1 & self.layout.mask(),
            0,
            "{}: reserved bits overlap register fields",
            self.op
        );
        debug_assert_eq!(
            self.reserved0 & FAMILY_MASK,
            0,
            "{}: reserved bits overlap the family",
            self.op
        );
    }
}

static TABLE: LazyLock<[Option<FamilyDesc>; 64]> = LazyLock::new(|| {
    let mut table = [None; 64];
    for op in ALL_OPS {
        let desc = FamilyDesc::of(op);
        desc.validate();
        debug_assert!(table[op.to_byte() as usize].is_none(), "{op}: duplicate");
        table[op.to_byte() as usize] = Some(desc);
    }
    table
});

/// Family description for the first opcode byte, if its family is assigned
pub fn lookup(byte0: u8) -> Option<&'static FamilyDesc> {
    TABLE[(byte0 & FAMILY_MASK) as usize].as_ref()
}

/// Operand fields following the opcode bytes
///
/// `family` is the low six bits of `byte0`; unassigned families yield empty
/// flags.
pub fn shapes_for(family: u8, byte0: u8, byte1: u8) -> ShapeFlags {
    lookup(family).map_or(ShapeFlags::empty(), |desc| desc.shapes(byte0, byte1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes(op: Op, modifiers: u8, byte1: u8) -> ShapeFlags {
        shapes_for(op.to_byte(), op.to_byte() | modifiers, byte1)
    }

    #[test]
    fn test_exclusive_everywhere() {
        for byte0 in 0..=u8::MAX {
            for byte1 in 0..=u8::MAX {
                let flags = shapes_for(byte0 & FAMILY_MASK, byte0, byte1);
                assert!(flags.is_exclusive(), "{byte0:#04x} {byte1:#04x}: {flags:?}");
                assert_eq!(flags, shapes_for(byte0 & FAMILY_MASK, byte0, byte1));
            }
        }
    }

    #[test]
    fn test_unassigned_empty() {
        for family in [0x27, 0x34, 0x3A, 0x3F] {
            assert_eq!(shapes_for(family, 0xC0 | family, 0xFF), ShapeFlags::empty());
            assert!(lookup(family).is_none());
        }
    }

    #[test]
    fn test_branch_shapes() {
        assert_eq!(shapes(Op::Jmp, 0, 0), ShapeFlags::empty());
        assert_eq!(shapes(Op::Jmp, bits::DATA, 0), ShapeFlags::OP1_IMM32);
        assert_eq!(
            shapes(Op::Jmp, bits::DATA, bits::OP1_INDIRECT),
            ShapeFlags::OP1_IDX32
        );
        assert_eq!(
            shapes(Op::Call, bits::DATA | bits::WIDE, bits::OP1_INDIRECT),
            ShapeFlags::OP1_IMM64
        );
        assert_eq!(shapes(Op::Jmp8, 0xC0, 0), ShapeFlags::OP1_IMM8);
        assert_eq!(shapes(Op::Break, 0, 0), ShapeFlags::BREAK_CODE);
    }

    #[test]
    fn test_arith_shapes() {
        assert_eq!(shapes(Op::Add, 0, 0), ShapeFlags::empty());
        assert_eq!(shapes(Op::Add, bits::DATA, 0x12), ShapeFlags::OP2_IMM16);
        assert_eq!(shapes(Op::CmpEq, bits::DATA | bits::WIDE, 0x92), ShapeFlags::OP2_IDX16);
    }

    #[test]
    fn test_move_shapes() {
        assert_eq!(
            shapes(Op::MovQw, bits::OP1_INDEX | bits::OP2_INDEX, 0),
            ShapeFlags::OP1_IDX16 | ShapeFlags::OP2_IDX16
        );
        assert_eq!(shapes(Op::MovDd, bits::OP2_INDEX, 0), ShapeFlags::OP2_IDX32);
        assert_eq!(shapes(Op::MovQq, bits::OP1_INDEX, 0), ShapeFlags::OP1_IDX64);
        assert_eq!(shapes(Op::MovNd, bits::OP1_INDEX, 0), ShapeFlags::OP1_IDX32);
        assert_eq!(shapes(Op::MovSnw, bits::OP2_INDEX, 0), ShapeFlags::OP2_IMM16);
        assert_eq!(
            shapes(Op::MovSnd, bits::OP2_INDEX, bits::OP2_INDIRECT),
            ShapeFlags::OP2_IDX32
        );
    }

    #[test]
    fn test_immediate_shapes() {
        assert_eq!(shapes(Op::Push, bits::DATA, 0), ShapeFlags::OP1_IMM16);
        assert_eq!(
            shapes(Op::PopN, bits::DATA, bits::OP1_INDIRECT),
            ShapeFlags::OP1_IDX16
        );
        assert_eq!(shapes(Op::CmpiEq, 0, 0), ShapeFlags::OP2_IMM16);
        assert_eq!(
            shapes(Op::CmpiUgte, bits::CMPI_IMM32, bits::CMPI_OP1_INDEX),
            ShapeFlags::OP1_IDX16 | ShapeFlags::OP2_IMM32
        );
        assert_eq!(
            shapes(Op::MovI, bits::DATA64, bits::MOVI_OP1_INDEX),
            ShapeFlags::OP1_IDX16 | ShapeFlags::OP2_IMM64
        );
        assert_eq!(shapes(Op::MovIn, bits::DATA32, 0), ShapeFlags::OP2_IDX32);
        assert_eq!(shapes(Op::MovRel, bits::DATA16, 0), ShapeFlags::OP2_IMM16);
    }

    #[test]
    fn test_slots() {
        let flags = ShapeFlags::OP1_IDX16 | ShapeFlags::OP2_IMM64;
        assert_eq!(flags.op1(), Some(Slot::Idx(IndexWidth::W16)));
        assert_eq!(flags.op2(), Some(Slot::Imm(ImmediateWidth::W64)));
        assert_eq!(flags.data_size(), 10);
        assert_eq!(ShapeFlags::BREAK_CODE.data_size(), 1);
        assert_eq!(ShapeFlags::empty().op1(), None);
        assert!(!(ShapeFlags::OP1_IMM8 | ShapeFlags::OP1_IDX64).is_exclusive());
    }

    #[test]
    fn test_matches() {
        let movi = FamilyDesc::of(Op::MovI);
        assert!(!movi.matches(0x37, 0x00));
        assert!(movi.matches(0x77, 0x31));
        assert!(!movi.matches(0x77, 0x80));

        let jmp = FamilyDesc::of(Op::Jmp);
        assert!(!jmp.matches(0x41, 0x00));
        assert!(jmp.matches(0xC1, 0x00));
        assert!(!jmp.matches(0x81, 0x20));

        let ret = FamilyDesc::of(Op::Ret);
        assert!(ret.matches(0x04, 0x00));
        assert!(!ret.matches(0x04, 0x01));

        // one-byte opcodes never look at the following byte
        assert!(FamilyDesc::of(Op::Jmp8).matches(0xC2, 0xFF));
        assert!(!FamilyDesc::of(Op::Break).matches(0x40, 0x00));
    }

    #[test]
    fn test_layouts() {
        let jmp = FamilyDesc::of(Op::Jmp);
        assert_eq!(jmp.layout(0x81), RegisterLayout::Op1);
        assert_eq!(jmp.layout(0xC1), RegisterLayout::None);

        assert_eq!(
            RegisterLayout::Op1Op2.extract(0x35),
            Ok(vec![Register::R5, Register::R3])
        );
        assert_eq!(
            RegisterLayout::LoadSp.extract(0x20),
            Ok(vec![Register::Flags, Register::R2])
        );
        assert_eq!(
            RegisterLayout::LoadSp.extract(0x21),
            Err(CodecError::InvalidRegister { field: 1, value: 1 })
        );
        assert_eq!(
            RegisterLayout::StoreSp.extract(0x13),
            Ok(vec![Register::R3, Register::Ip])
        );
        assert_eq!(
            RegisterLayout::StoreSp.extract(0x23),
            Err(CodecError::InvalidRegister { field: 2, value: 2 })
        );
    }

    #[test]
    fn test_fixup_kinds() {
        let call = FamilyDesc::of(Op::Call);
        assert_eq!(
            call.fixup_kind(ImmediateWidth::W32, bits::RELATIVE),
            Some(FixupKind::PcRelCall32)
        );
        assert_eq!(
            call.fixup_kind(ImmediateWidth::W64, bits::RELATIVE),
            Some(FixupKind::PcRel64)
        );
        assert_eq!(
            call.fixup_kind(ImmediateWidth::W32, 0),
            Some(FixupKind::Abs32)
        );
        assert_eq!(
            FamilyDesc::of(Op::Jmp).fixup_kind(ImmediateWidth::W32, bits::RELATIVE),
            Some(FixupKind::PcRel32)
        );
        assert_eq!(
            FamilyDesc::of(Op::MovRel).fixup_kind(ImmediateWidth::W16, 0),
            Some(FixupKind::PcRel16)
        );
        assert_eq!(
            FamilyDesc::of(Op::Jmp8).fixup_kind(ImmediateWidth::W8, 0),
            Some(FixupKind::PcRel8)
        );
        assert_eq!(
            FamilyDesc::of(Op::MovI).fixup_kind(ImmediateWidth::W64, bits::RELATIVE),
            Some(FixupKind::Abs64)
        );
    }
}
