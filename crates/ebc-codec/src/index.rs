//! Dual-value index fields
//!
//! An index packs a *natural* unit and a *constant* unit into one 16, 32 or
//! 64-bit field. Layout, most significant bit first:
//!
//! ```text
//! [sign:1][assigned:3][constant: N-4-natural_len][natural: natural_len]
//! ```
//!
//! `natural_len` is the bit length of |natural| rounded up to a whole number
//! of N/8-bit units and `assigned` counts those units. Both magnitudes share
//! the single sign bit, so both units must have the same sign.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CodecError;

/// Sign bit plus the 3-bit natural length selector
const HEADER_BITS: u32 = 4;

/// Width of an index field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexWidth {
    /// 16-bit index
    W16,
    /// 32-bit index
    W32,
    /// 64-bit index
    W64,
}

impl IndexWidth {
    /// Field width in bits
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
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

    /// Granularity of the natural length, in bits
    #[inline]
    pub const fn unit(self) -> u32 {
        self.bits() / 8
    }

    /// Largest value either unit may take: `2^(N-4) - 1`
    #[inline]
    pub const fn max(self) -> i64 {
        (1i64 << (self.bits() - HEADER_BITS)) - 1
    }

    /// Smallest value either unit may take
    #[inline]
    pub const fn min(self) -> i64 {
        -self.max()
    }

    #[inline]
    const fn mask(self) -> u64 {
        match self {
            Self::W64 => u64::MAX,
            _ => (1u64 << self.bits()) - 1,
        }
    }
}

/// Index packing failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Natural and constant units have different signs
    #[error("index signs differ (natural {natural}, constant {constant})")]
    SignMismatch {
        /// Natural unit
        natural: i64,
        /// Constant unit
        constant: i64,
    },

    /// Units need more bits than the field provides
    #[error(
        "unit length too long for {bits}-bit index ({natural}, {constant}); legal range is [{min}, {max}]",
        bits = .width.bits(),
        min = .width.min(),
        max = .width.max()
    )]
    UnitLengthTooLong {
        /// Natural unit
        natural: i64,
        /// Constant unit
        constant: i64,
        /// Field width
        width: IndexWidth,
    },

    /// Raw field whose length selector claims more bits than exist
    #[error("invalid {bits}-bit index field {index:#x}", bits = .width.bits())]
    InvalidSelector {
        /// Raw field
        index: u64,
        /// Field width
        width: IndexWidth,
    },
}

impl IndexError {
    /// Attribute the failure to an operand position
    pub(crate) fn at_operand(self, operand: usize) -> CodecError {
        match self {
            Self::SignMismatch { natural, constant } => CodecError::IndexSignMismatch {
                operand,
                natural,
                constant,
            },
            Self::UnitLengthTooLong {
                natural,
                constant,
                width,
            } => CodecError::IndexOutOfRange {
                operand,
                natural,
                constant,
                width: width.bits(),
                min: width.min(),
                max: width.max(),
            },
            Self::InvalidSelector { index, width } => CodecError::InvalidIndex {
                bits: index,
                width: width.bits(),
            },
        }
    }
}

/// A natural/constant pair destined for an index field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Natural unit
    pub natural: i64,
    /// Constant unit
    pub constant: i64,
    /// Declared field width
    pub width: IndexWidth,
}

impl Index {
    /// Create a new index
    #[inline]
    pub const fn new(natural: i64, constant: i64, width: IndexWidth) -> Self {
        Self {
            natural,
            constant,
            width,
        }
    }

    /// Pack into the raw field bits
    pub fn pack(&self) -> Result<u64, IndexError> {
        pack_index(self.natural, self.constant, self.width)
    }

    /// Unpack raw field bits
    pub fn unpack(index: u64, width: IndexWidth) -> Result<Self, IndexError> {
        let (natural, constant) = unpack_index(index, width)?;
        Ok(Self::new(natural, constant, width))
    }
}

#[inline]
fn bit_length(value: u64) -> u32 {
    u64::BITS - value.leading_zeros()
}

/// Pack `natural` and `constant` into an index field of the given width
pub fn pack_index(natural: i64, constant: i64, width: IndexWidth) -> Result<u64, IndexError> {
    let negative = natural < 0 || constant < 0;
    if negative && (natural > 0 || constant > 0) {
        return Err(IndexError::SignMismatch { natural, constant });
    }

    let abs_natural = natural.unsigned_abs();
    let abs_constant = constant.unsigned_abs();

    let natural_len = bit_length(abs_natural).next_multiple_of(width.unit());
    let constant_len = bit_length(abs_constant);
    if HEADER_BITS + natural_len + constant_len > width.bits() {
        return Err(IndexError::UnitLengthTooLong {
            natural,
            constant,
            width,
        });
    }

    let bits = width.bits();
    let assigned = u64::from(natural_len / width.unit());
    Ok((u64::from(negative) << (bits - 1))
        | (assigned << (bits - HEADER_BITS))
        | (abs_constant << natural_len)
        | abs_natural)
}

/// Recover `(natural, constant)` from an index field
pub fn unpack_index(index: u64, width: IndexWidth) -> Result<(i64, i64), IndexError> {
    let bits = width.bits();
    let index = index & width.mask();

    let negative = (index >> (bits - 1)) & 1 == 1;
    let assigned = ((index >> (bits - HEADER_BITS)) & 0x7) as u32;
    let natural_len = assigned * width.unit();
    if natural_len > bits - HEADER_BITS {
        return Err(IndexError::InvalidSelector { index, width });
    }
    let constant_len = bits - HEADER_BITS - natural_len;

    // Both lengths are at most 60 bits here.
    let natural = (index & ((1u64 << natural_len) - 1)) as i64;
    let constant = ((index >> natural_len) & ((1u64 << constant_len) - 1)) as i64;

    if negative {
        Ok((-natural, -constant))
    } else {
        Ok((natural, constant))
    }
}
