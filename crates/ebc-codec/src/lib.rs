//! # EBC Codec
//!
//! Binary encoder and decoder for EFI Byte Code (EBC) instructions.
//!
//! ## Design Principles
//!
//! - **Table-driven**: one static descriptor per opcode family decides the
//!   register fields and operand shapes for both directions
//! - **Bit-exact**: decoding and re-encoding an instruction reproduces its bytes
//! - **Strict**: values that do not fit their fields are rejected, never
//!   truncated
//! - **Stateless**: apart from the read-only shape table, every call works on
//!   its own inputs and may run on any thread

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fixup;
pub mod index;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod shape;

pub use decoder::{Decoded, Instructions, decode, instructions};
pub use encoder::{CodeBuffer, Encoded, encode};
pub use error::{CodecError, Result};
pub use fixup::{Fixup, FixupKind, NOP, write_nops};
pub use index::{Index, IndexError, IndexWidth, pack_index, unpack_index};
pub use instruction::{Instruction, InstructionBuilder};
pub use opcode::Op;
pub use operand::{Immediate, ImmediateWidth, Operand, Register, SymbolRef};
pub use shape::{ShapeFlags, Slot, shapes_for};

/// Instruction alignment unit in bytes
pub const INSTRUCTION_ALIGNMENT: usize = 2;
