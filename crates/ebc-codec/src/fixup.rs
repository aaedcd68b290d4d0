//! Deferred relocations
//!
//! The encoder writes zero bytes for symbolic operands and records a
//! [`Fixup`]. Whoever resolves the symbol later computes the value with
//! [`Fixup::value_for`] and patches the code with [`Fixup::apply`], which
//! performs the per-kind adjustment the VM expects.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::operand::{ImmediateWidth, SymbolRef};

/// The canonical NOP, `MOVqq R0, R0`
pub const NOP: [u8; 2] = [0x28, 0x00];

/// How a fixup value is adjusted and stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixupKind {
    /// Absolute 16-bit value
    Abs16,
    /// Absolute 32-bit value
    Abs32,
    /// Absolute 64-bit value
    Abs64,
    /// JMP8 displacement, stored in 2-byte units
    PcRel8,
    /// IP-relative 16-bit displacement
    PcRel16,
    /// IP-relative 32-bit displacement
    PcRel32,
    /// IP-relative 64-bit displacement
    PcRel64,
    /// Relative 32-bit CALL displacement
    PcRelCall32,
}

impl FixupKind {
    /// Absolute kind for an immediate field, if one exists
    pub const fn absolute(width: ImmediateWidth) -> Option<Self> {
        match width {
            ImmediateWidth::W8 => None,
            ImmediateWidth::W16 => Some(Self::Abs16),
            ImmediateWidth::W32 => Some(Self::Abs32),
            ImmediateWidth::W64 => Some(Self::Abs64),
        }
    }

    /// IP-relative kind for an immediate field
    pub const fn pc_relative(width: ImmediateWidth) -> Self {
        match width {
            ImmediateWidth::W8 => Self::PcRel8,
            ImmediateWidth::W16 => Self::PcRel16,
            ImmediateWidth::W32 => Self::PcRel32,
            ImmediateWidth::W64 => Self::PcRel64,
        }
    }

    /// Field width in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::PcRel8 => 1,
            Self::Abs16 | Self::PcRel16 => 2,
            Self::Abs32 | Self::PcRel32 | Self::PcRelCall32 => 4,
            Self::Abs64 | Self::PcRel64 => 8,
        }
    }

    /// Is the value relative to the fixup's own address
    pub const fn is_pc_relative(self) -> bool {
        !matches!(self, Self::Abs16 | Self::Abs32 | Self::Abs64)
    }

    /// Turn a resolved value into the value stored in the field
    ///
    /// Relative displacements must be 2-byte aligned. `PcRel8` is stored
    /// halved; the wider relative kinds are biased by `+2`, and a relative
    /// 32-bit CALL by `-4`, to account for where the VM's IP points when the
    /// displacement is applied.
    pub fn adjust(self, value: i64) -> Result<i64> {
        let out_of_range = || CodecError::FixupOutOfRange { kind: self, value };
        let adjusted = match self {
            Self::Abs16 | Self::Abs32 | Self::Abs64 => {
                let bits = self.width() as u32 * 8;
                if bits < 64 {
                    // accept either a signed or an unsigned reading of the field
                    let min = -(1i64 << (bits - 1));
                    let max = (1i64 << bits) - 1;
                    if value < min || value > max {
                        return Err(out_of_range());
                    }
                }
                return Ok(value);
            }
            Self::PcRel8 => value,
            Self::PcRel16 | Self::PcRel32 | Self::PcRel64 => {
                value.checked_add(2).ok_or_else(out_of_range)?
            }
            Self::PcRelCall32 => value.checked_sub(4).ok_or_else(out_of_range)?,
        };

        if adjusted % 2 != 0 {
            return Err(CodecError::FixupMisaligned {
                kind: self,
                value: adjusted,
            });
        }

        match self {
            Self::PcRel8 => {
                if !(i64::from(i8::MIN) * 2..=i64::from(i8::MAX) * 2).contains(&adjusted) {
                    return Err(out_of_range());
                }
                Ok(adjusted / 2)
            }
            _ => {
                let bits = self.width() as u32 * 8;
                if bits < 64 {
                    let min = -(1i64 << (bits - 1));
                    let max = (1i64 << (bits - 1)) - 1;
                    if adjusted < min || adjusted > max {
                        return Err(out_of_range());
                    }
                }
                Ok(adjusted)
            }
        }
    }
}

/// A symbolic operand waiting for its address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fixup {
    /// Byte offset of the field, from the instruction start (or the buffer
    /// start once placed in a [`CodeBuffer`](crate::encoder::CodeBuffer))
    pub offset: usize,
    /// Adjustment and width
    pub kind: FixupKind,
    /// Referenced symbol
    pub symbol: SymbolRef,
}

impl Fixup {
    /// Field width in bytes
    #[inline]
    pub const fn width(&self) -> usize {
        self.kind.width()
    }

    /// Is the value relative to the fixup's own address
    #[inline]
    pub const fn is_pc_relative(&self) -> bool {
        self.kind.is_pc_relative()
    }

    /// Same fixup, shifted by `base` bytes
    pub fn rebased(mut self, base: usize) -> Self {
        self.offset += base;
        self
    }

    /// Value to apply once the symbol resolves to `symbol_address`
    ///
    /// `field_address` is the address of the fixup field itself; it only
    /// matters for relative kinds.
    pub fn value_for(&self, symbol_address: u64, field_address: u64) -> i64 {
        let target = (symbol_address as i64).wrapping_add(self.symbol.addend);
        if self.is_pc_relative() {
            target.wrapping_sub(field_address as i64)
        } else {
            target
        }
    }

    /// Adjust `value` and write it little-endian into `code` at this
    /// fixup's offset
    pub fn apply(&self, code: &mut [u8], value: i64) -> Result<()> {
        let width = self.width();
        let len = code.len();
        let field = self
            .offset
            .checked_add(width)
            .and_then(|end| code.get_mut(self.offset..end))
            .ok_or(CodecError::FixupOutOfBounds {
                offset: self.offset,
                width,
                len,
            })?;

        let stored = self.kind.adjust(value)?;
        field.copy_from_slice(&stored.to_le_bytes()[..width]);

        tracing::trace!(
            "Applied {:?} fixup for {} at {}: {} -> {}",
            self.kind,
            self.symbol,
            self.offset,
            value,
            stored
        );
        Ok(())
    }
}

/// Append `count` bytes of NOP padding
pub fn write_nops(out: &mut Vec<u8>, count: usize) -> Result<()> {
    if count % 2 != 0 {
        return Err(CodecError::OddNopPadding(count));
    }
    for _ in 0..count / 2 {
        out.extend_from_slice(&NOP);
    }
    Ok(())
}
