//! Opcode families
//!
//! The low six bits of the first instruction byte select an opcode family.
//! Bits 6 and 7 of that byte, and the non-register bits of the second byte,
//! refine the family; their meaning is listed per family in [`bits`].

use std::fmt;
use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Mask selecting the family from the first opcode byte
pub const FAMILY_MASK: u8 = 0x3F;

/// Mask selecting the modifier bits of the first opcode byte
pub const MODIFIER_MASK: u8 = 0xC0;

/// Named modifier (byte 0) and control (byte 1) bits
pub mod bits {
    // ==================== Byte 0 ====================
    /// Operand data follows (JMP, CALL, CMP, arithmetic, PUSH/POP)
    pub const DATA: u8 = 0x80;
    /// 64-bit form (JMP/CALL immediate, CMP and arithmetic operand size)
    pub const WIDE: u8 = 0x40;
    /// Operand 1 index present (MOV families)
    pub const OP1_INDEX: u8 = 0x80;
    /// Operand 2 index or immediate present (MOV families)
    pub const OP2_INDEX: u8 = 0x40;
    /// Conditional JMP8
    pub const JMP8_CONDITIONAL: u8 = 0x80;
    /// JMP8 taken when the condition flag is set
    pub const JMP8_CONDITION_SET: u8 = 0x40;
    /// CMPI with a 32-bit immediate
    pub const CMPI_IMM32: u8 = 0x80;
    /// MOVI/MOVIn/MOVREL 16-bit data
    pub const DATA16: u8 = 0x40;
    /// MOVI/MOVIn/MOVREL 32-bit data
    pub const DATA32: u8 = 0x80;
    /// MOVI/MOVIn/MOVREL 64-bit data
    pub const DATA64: u8 = 0xC0;

    // ==================== Byte 1 ====================
    /// Operand 1 is indirect
    pub const OP1_INDIRECT: u8 = 0x08;
    /// Operand 2 is indirect
    pub const OP2_INDIRECT: u8 = 0x80;
    /// Conditional JMP
    pub const CONDITIONAL: u8 = 0x80;
    /// JMP taken when the condition flag is set
    pub const CONDITION_SET: u8 = 0x40;
    /// CALL to native code
    pub const NATIVE: u8 = 0x20;
    /// JMP/CALL target is relative
    pub const RELATIVE: u8 = 0x10;
    /// CMPI operand 1 index present
    pub const CMPI_OP1_INDEX: u8 = 0x10;
    /// MOVI/MOVIn/MOVREL operand 1 index present
    pub const MOVI_OP1_INDEX: u8 = 0x40;
    /// MOVI move width: byte
    pub const MOVI_BYTE: u8 = 0x00;
    /// MOVI move width: word
    pub const MOVI_WORD: u8 = 0x10;
    /// MOVI move width: dword
    pub const MOVI_DWORD: u8 = 0x20;
    /// MOVI move width: qword
    pub const MOVI_QWORD: u8 = 0x30;
}

/// Opcode family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Op {
    // ==================== Control flow ====================
    /// Raise a debugger/VM break with an 8-bit code
    Break = 0x00,
    /// Jump, 32-bit or 64-bit target
    Jmp = 0x01,
    /// Short relative jump, 8-bit offset in 2-byte units
    Jmp8 = 0x02,
    /// Call EBC or native code
    Call = 0x03,
    /// Return from call
    Ret = 0x04,

    // ==================== Compare ====================
    /// Compare equal
    CmpEq = 0x05,
    /// Compare signed less than or equal
    CmpLte = 0x06,
    /// Compare signed greater than or equal
    CmpGte = 0x07,
    /// Compare unsigned less than or equal
    CmpUlte = 0x08,
    /// Compare unsigned greater than or equal
    CmpUgte = 0x09,

    // ==================== Arithmetic ====================
    /// Bitwise not
    Not = 0x0A,
    /// Negate
    Neg = 0x0B,
    /// Add
    Add = 0x0C,
    /// Subtract
    Sub = 0x0D,
    /// Signed multiply
    Mul = 0x0E,
    /// Unsigned multiply
    Mulu = 0x0F,
    /// Signed divide
    Div = 0x10,
    /// Unsigned divide
    Divu = 0x11,
    /// Signed modulo
    Mod = 0x12,
    /// Unsigned modulo
    Modu = 0x13,
    /// Bitwise and
    And = 0x14,
    /// Bitwise or
    Or = 0x15,
    /// Bitwise xor
    Xor = 0x16,
    /// Shift left
    Shl = 0x17,
    /// Logical shift right
    Shr = 0x18,
    /// Arithmetic shift right
    Ashr = 0x19,
    /// Sign-extend byte
    Extndb = 0x1A,
    /// Sign-extend word
    Extndw = 0x1B,
    /// Sign-extend dword
    Extndd = 0x1C,

    // ==================== Moves ====================
    /// Move byte, 16-bit indexes
    MovBw = 0x1D,
    /// Move word, 16-bit indexes
    MovWw = 0x1E,
    /// Move dword, 16-bit indexes
    MovDw = 0x1F,
    /// Move qword, 16-bit indexes
    MovQw = 0x20,
    /// Move byte, 32-bit indexes
    MovBd = 0x21,
    /// Move word, 32-bit indexes
    MovWd = 0x22,
    /// Move dword, 32-bit indexes
    MovDd = 0x23,
    /// Move qword, 32-bit indexes
    MovQd = 0x24,
    /// Move signed natural, 16-bit indexes
    MovSnw = 0x25,
    /// Move signed natural, 32-bit indexes
    MovSnd = 0x26,
    /// Move qword, 64-bit indexes
    MovQq = 0x28,

    // ==================== Dedicated registers ====================
    /// Load a dedicated register from a general register
    LoadSp = 0x29,
    /// Store a dedicated register into a general register
    StoreSp = 0x2A,

    // ==================== Stack ====================
    /// Push 32/64-bit value
    Push = 0x2B,
    /// Pop 32/64-bit value
    Pop = 0x2C,

    // ==================== Compare immediate ====================
    /// Compare immediate equal
    CmpiEq = 0x2D,
    /// Compare immediate signed less than or equal
    CmpiLte = 0x2E,
    /// Compare immediate signed greater than or equal
    CmpiGte = 0x2F,
    /// Compare immediate unsigned less than or equal
    CmpiUlte = 0x30,
    /// Compare immediate unsigned greater than or equal
    CmpiUgte = 0x31,

    // ==================== Natural moves ====================
    /// Move natural, 16-bit indexes
    MovNw = 0x32,
    /// Move natural, 32-bit indexes
    MovNd = 0x33,
    /// Push natural value
    PushN = 0x35,
    /// Pop natural value
    PopN = 0x36,
    /// Move immediate
    MovI = 0x37,
    /// Move index as natural value
    MovIn = 0x38,
    /// Move IP-relative address
    MovRel = 0x39,
}

/// Every assigned family, in encoding order
pub const ALL_OPS: [Op; 56] = [
    Op::Break,
    Op::Jmp,
    Op::Jmp8,
    Op::Call,
    Op::Ret,
    Op::CmpEq,
    Op::CmpLte,
    Op::CmpGte,
    Op::CmpUlte,
    Op::CmpUgte,
    Op::Not,
    Op::Neg,
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::Mulu,
    Op::Div,
    Op::Divu,
    Op::Mod,
    Op::Modu,
    Op::And,
    Op::Or,
    Op::Xor,
    Op::Shl,
    Op::Shr,
    Op::Ashr,
    Op::Extndb,
    Op::Extndw,
    Op::Extndd,
    Op::MovBw,
    Op::MovWw,
    Op::MovDw,
    Op::MovQw,
    Op::MovBd,
    Op::MovWd,
    Op::MovDd,
    Op::MovQd,
    Op::MovSnw,
    Op::MovSnd,
    Op::MovQq,
    Op::LoadSp,
    Op::StoreSp,
    Op::Push,
    Op::Pop,
    Op::CmpiEq,
    Op::CmpiLte,
    Op::CmpiGte,
    Op::CmpiUlte,
    Op::CmpiUgte,
    Op::MovNw,
    Op::MovNd,
    Op::PushN,
    Op::PopN,
    Op::MovI,
    Op::MovIn,
    Op::MovRel,
];

impl Op {
    /// Convert from the family bits of an opcode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte & FAMILY_MASK {
            0x00 => Some(Self::Break),
            0x01 => Some(Self::Jmp),
            0x02 => Some(Self::Jmp8),
            0x03 => Some(Self::Call),
            0x04 => Some(Self::Ret),

            0x05 => Some(Self::CmpEq),
            0x06 => Some(Self::CmpLte),
            0x07 => Some(Self::CmpGte),
            0x08 => Some(Self::CmpUlte),
            0x09 => Some(Self::CmpUgte),

            0x0A => Some(Self::Not),
            0x0B => Some(Self::Neg),
            0x0C => Some(Self::Add),
            0x0D => Some(Self::Sub),
            0x0E => Some(Self::Mul),
            0x0F => Some(Self::Mulu),
            0x10 => Some(Self::Div),
            0x11 => Some(Self::Divu),
            0x12 => Some(Self::Mod),
            0x13 => Some(Self::Modu),
            0x14 => Some(Self::And),
            0x15 => Some(Self::Or),
            0x16 => Some(Self::Xor),
            0x17 => Some(Self::Shl),
            0x18 => Some(Self::Shr),
            0x19 => Some(Self::Ashr),
            0x1A => Some(Self::Extndb),
            0x1B => Some(Self::Extndw),
            0x1C => Some(Self::Extndd),

            0x1D => Some(Self::MovBw),
            0x1E => Some(Self::MovWw),
            0x1F => Some(Self::MovDw),
            0x20 => Some(Self::MovQw),
            0x21 => Some(Self::MovBd),
            0x22 => Some(Self::MovWd),
            0x23 => Some(Self::MovDd),
            0x24 => Some(Self::MovQd),
            0x25 => Some(Self::MovSnw),
            0x26 => Some(Self::MovSnd),
            0x28 => Some(Self::MovQq),

            0x29 => Some(Self::LoadSp),
            0x2A => Some(Self::StoreSp),

            0x2B => Some(Self::Push),
            0x2C => Some(Self::Pop),

            0x2D => Some(Self::CmpiEq),
            0x2E => Some(Self::CmpiLte),
            0x2F => Some(Self::CmpiGte),
            0x30 => Some(Self::CmpiUlte),
            0x31 => Some(Self::CmpiUgte),

            0x32 => Some(Self::MovNw),
            0x33 => Some(Self::MovNd),
            0x35 => Some(Self::PushN),
            0x36 => Some(Self::PopN),
            0x37 => Some(Self::MovI),
            0x38 => Some(Self::MovIn),
            0x39 => Some(Self::MovRel),

            _ => None,
        }
    }

    /// Convert to the family bits
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Assembler mnemonic of this family
    pub const fn name(self) -> &'static str {
        match self {
            Self::Break => "BREAK",
            Self::Jmp => "JMP",
            Self::Jmp8 => "JMP8",
            Self::Call => "CALL",
            Self::Ret => "RET",
            Self::CmpEq => "CMPeq",
            Self::CmpLte => "CMPlte",
            Self::CmpGte => "CMPgte",
            Self::CmpUlte => "CMPulte",
            Self::CmpUgte => "CMPugte",
            Self::Not => "NOT",
            Self::Neg => "NEG",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Mulu => "MULU",
            Self::Div => "DIV",
            Self::Divu => "DIVU",
            Self::Mod => "MOD",
            Self::Modu => "MODU",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Ashr => "ASHR",
            Self::Extndb => "EXTNDB",
            Self::Extndw => "EXTNDW",
            Self::Extndd => "EXTNDD",
            Self::MovBw => "MOVbw",
            Self::MovWw => "MOVww",
            Self::MovDw => "MOVdw",
            Self::MovQw => "MOVqw",
            Self::MovBd => "MOVbd",
            Self::MovWd => "MOVwd",
            Self::MovDd => "MOVdd",
            Self::MovQd => "MOVqd",
            Self::MovSnw => "MOVsnw",
            Self::MovSnd => "MOVsnd",
            Self::MovQq => "MOVqq",
            Self::LoadSp => "LOADSP",
            Self::StoreSp => "STORESP",
            Self::Push => "PUSH",
            Self::Pop => "POP",
            Self::CmpiEq => "CMPIeq",
            Self::CmpiLte => "CMPIlte",
            Self::CmpiGte => "CMPIgte",
            Self::CmpiUlte => "CMPIulte",
            Self::CmpiUgte => "CMPIugte",
            Self::MovNw => "MOVnw",
            Self::MovNd => "MOVnd",
            Self::PushN => "PUSHn",
            Self::PopN => "POPn",
            Self::MovI => "MOVI",
            Self::MovIn => "MOVIn",
            Self::MovRel => "MOVREL",
        }
    }

    /// Look up a family by mnemonic, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        static BY_NAME: LazyLock<FxHashMap<String, Op>> = LazyLock::new(|| {
            ALL_OPS
                .iter()
                .map(|&op| (op.name().to_ascii_lowercase(), op))
                .collect()
        });
        BY_NAME.get(&name.to_ascii_lowercase()).copied()
    }

    /// Is this a one-byte opcode (operand data starts at byte 1)
    #[inline]
    pub const fn is_one_byte(self) -> bool {
        matches!(self, Self::Break | Self::Jmp8)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_roundtrip() {
        for byte in 0..=FAMILY_MASK {
            if let Some(op) = Op::from_byte(byte) {
                assert_eq!(op.to_byte(), byte);
            }
        }
    }

    #[test]
    fn test_all_ops_complete() {
        let assigned: Vec<Op> = (0..=FAMILY_MASK).filter_map(Op::from_byte).collect();
        assert_eq!(assigned, ALL_OPS.to_vec());
    }

    #[test]
    fn test_modifier_bits_ignored() {
        assert_eq!(Op::from_byte(0x8C), Some(Op::Add));
        assert_eq!(Op::from_byte(0xF7), Some(Op::MovI));
    }

    #[test]
    fn test_unassigned_families() {
        for byte in [0x27, 0x34, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F] {
            assert_eq!(Op::from_byte(byte), None);
        }
    }

    #[test]
    fn test_op_name() {
        assert_eq!(Op::MovQw.name(), "MOVqw");
        assert_eq!(Op::CmpiUgte.to_string(), "CMPIugte");
        assert_eq!(Op::from_name("movqw"), Some(Op::MovQw));
        assert_eq!(Op::from_name("MOVREL"), Some(Op::MovRel));
        assert_eq!(Op::from_name("nop"), None);
    }

    #[test]
    fn test_one_byte_families() {
        let one_byte: Vec<Op> = (0..=FAMILY_MASK)
            .filter_map(Op::from_byte)
            .filter(|op| op.is_one_byte())
            .collect();
        assert_eq!(one_byte, vec![Op::Break, Op::Jmp8]);
    }
}
