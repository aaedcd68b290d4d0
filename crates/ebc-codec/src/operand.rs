//! Instruction operands

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::index::{Index, IndexWidth};

/// Number of general purpose registers
pub const GPR_COUNT: u8 = 8;

/// Machine register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    /// General purpose register R0-R7
    Gpr(u8),
    /// Flags register (dedicated register 0)
    Flags,
    /// Instruction pointer (dedicated register 1)
    Ip,
}

impl Register {
    /// R0, conventionally scratch / return value
    pub const R0: Self = Self::Gpr(0);
    /// R1
    pub const R1: Self = Self::Gpr(1);
    /// R2
    pub const R2: Self = Self::Gpr(2);
    /// R3
    pub const R3: Self = Self::Gpr(3);
    /// R4
    pub const R4: Self = Self::Gpr(4);
    /// R5
    pub const R5: Self = Self::Gpr(5);
    /// R6
    pub const R6: Self = Self::Gpr(6);
    /// R7
    pub const R7: Self = Self::Gpr(7);

    /// Create a general purpose register, if `index` names one
    #[inline]
    pub const fn gpr(index: u8) -> Option<Self> {
        if index < GPR_COUNT {
            Some(Self::Gpr(index))
        } else {
            None
        }
    }

    /// Create a dedicated register from its encoding
    #[inline]
    pub const fn dedicated(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Flags),
            1 => Some(Self::Ip),
            _ => None,
        }
    }

    /// Value stored in a 3-bit register field
    #[inline]
    pub const fn encoding(self) -> u8 {
        match self {
            Self::Gpr(index) => index,
            Self::Flags => 0,
            Self::Ip => 1,
        }
    }

    /// Is this a general purpose register
    #[inline]
    pub const fn is_gpr(self) -> bool {
        matches!(self, Self::Gpr(_))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpr(index) => write!(f, "R{}", index),
            Self::Flags => f.write_str("FLAGS"),
            Self::Ip => f.write_str("IP"),
        }
    }
}

/// Width of an immediate field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImmediateWidth {
    /// 8-bit immediate
    W8,
    /// 16-bit immediate
    W16,
    /// 32-bit immediate
    W32,
    /// 64-bit immediate
    W64,
}

impl ImmediateWidth {
    /// Field width in bits
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// Field width in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Smallest two's complement value of this width
    #[inline]
    pub const fn min(self) -> i64 {
        match self {
            Self::W8 => i8::MIN as i64,
            Self::W16 => i16::MIN as i64,
            Self::W32 => i32::MIN as i64,
            Self::W64 => i64::MIN,
        }
    }

    /// Largest two's complement value of this width
    #[inline]
    pub const fn max(self) -> i64 {
        match self {
            Self::W8 => i8::MAX as i64,
            Self::W16 => i16::MAX as i64,
            Self::W32 => i32::MAX as i64,
            Self::W64 => i64::MAX,
        }
    }

    /// Does `value` fit in this width
    #[inline]
    pub const fn contains(self, value: i64) -> bool {
        value >= self.min() && value <= self.max()
    }
}

/// Fixed-width signed immediate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Immediate {
    /// Value
    pub value: i64,
    /// Declared width
    pub width: ImmediateWidth,
}

impl Immediate {
    /// Create a new immediate
    #[inline]
    pub const fn new(value: i64, width: ImmediateWidth) -> Self {
        Self { value, width }
    }
}

/// Reference to an external symbol plus a byte offset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    /// Symbol name
    pub name: Arc<str>,
    /// Byte offset added to the symbol address
    pub addend: i64,
}

impl SymbolRef {
    /// Create a reference to `name + addend`
    pub fn new(name: impl Into<Arc<str>>, addend: i64) -> Self {
        Self {
            name: name.into(),
            addend,
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addend {
            0 => write!(f, "{}", self.name),
            addend if addend > 0 => write!(f, "{}+{}", self.name, addend),
            addend => write!(f, "{}{}", self.name, addend),
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Register folded into the opcode bytes
    Register(Register),
    /// Fixed-width immediate
    Immediate(Immediate),
    /// Natural/constant index
    Index(Index),
    /// Unresolved symbol, encoded as a zero placeholder plus a fixup
    Symbol(SymbolRef),
}

impl Operand {
    /// Immediate operand
    #[inline]
    pub const fn imm(value: i64, width: ImmediateWidth) -> Self {
        Self::Immediate(Immediate::new(value, width))
    }

    /// Index operand
    #[inline]
    pub const fn index(natural: i64, constant: i64, width: IndexWidth) -> Self {
        Self::Index(Index::new(natural, constant, width))
    }

    /// Symbolic operand
    pub fn symbol(name: impl Into<Arc<str>>, addend: i64) -> Self {
        Self::Symbol(SymbolRef::new(name, addend))
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            Self::Register(reg) => format!("register {}", reg),
            Self::Immediate(imm) => format!("{}-bit immediate", imm.width.bits()),
            Self::Index(idx) => format!("{}-bit index", idx.width.bits()),
            Self::Symbol(sym) => format!("symbol {}", sym),
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Self::Register(reg)
    }
}

impl From<Immediate> for Operand {
    fn from(imm: Immediate) -> Self {
        Self::Immediate(imm)
    }
}

impl From<Index> for Operand {
    fn from(idx: Index) -> Self {
        Self::Index(idx)
    }
}

impl From<SymbolRef> for Operand {
    fn from(sym: SymbolRef) -> Self {
        Self::Symbol(sym)
    }
}
