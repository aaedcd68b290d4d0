//! Codec errors

use thiserror::Error;

use crate::fixup::FixupKind;
use crate::opcode::Op;

/// Errors that can occur while encoding or decoding instructions
///
/// The first group describes malformed input seen by the decoder; a caller
/// scanning for code may resynchronise and retry at a later offset. The rest
/// are contract violations by whoever built the instruction and point at an
/// upstream lowering bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Byte stream ended before the instruction did
    #[error("Insufficient bytes: need {needed}, have {available}")]
    InsufficientBytes {
        /// Bytes required to finish the instruction
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Neither the one-byte nor the two-byte opcode tables match
    #[error("Unknown opcode: {byte0:#04x} {byte1:#04x}")]
    UnknownOpcode {
        /// First opcode byte
        byte0: u8,
        /// Second opcode byte (or the byte following a one-byte opcode)
        byte1: u8,
    },

    /// A register field holds a number its register class does not define
    #[error("Invalid register {value} in operand {field} register field")]
    InvalidRegister {
        /// Operand slot of the field (1 or 2)
        field: u8,
        /// Raw field value
        value: u8,
    },

    /// Index field whose length selector exceeds the field width
    #[error("Invalid {width}-bit index field {bits:#x}")]
    InvalidIndex {
        /// Raw field bits
        bits: u64,
        /// Field width in bits
        width: u32,
    },

    /// Natural and constant units of an index have different signs
    #[error("Operand {operand}: index signs differ (natural {natural}, constant {constant})")]
    IndexSignMismatch {
        /// Operand position within the instruction
        operand: usize,
        /// Natural unit
        natural: i64,
        /// Constant unit
        constant: i64,
    },

    /// Index units do not fit the field once the natural length is rounded up
    #[error(
        "Operand {operand}: unit length too long for {width}-bit index ({natural}, {constant}); \
         legal range is [{min}, {max}]"
    )]
    IndexOutOfRange {
        /// Operand position within the instruction
        operand: usize,
        /// Natural unit
        natural: i64,
        /// Constant unit
        constant: i64,
        /// Field width in bits
        width: u32,
        /// Smallest legal unit value
        min: i64,
        /// Largest legal unit value
        max: i64,
    },

    /// Immediate does not fit its declared width
    #[error("Operand {operand}: immediate {value} out of range for {width}-bit field [{min}, {max}]")]
    ImmediateOutOfRange {
        /// Operand position within the instruction
        operand: usize,
        /// Offending value
        value: i64,
        /// Declared width in bits
        width: u32,
        /// Smallest legal value
        min: i64,
        /// Largest legal value
        max: i64,
    },

    /// Operand kind or width does not match what the opcode expects
    #[error("Operand {operand}: expected {expected}, found {found}")]
    OperandMismatch {
        /// Operand position within the instruction
        operand: usize,
        /// What the opcode shape requires
        expected: String,
        /// What the instruction carries
        found: String,
    },

    /// Instruction has fewer operands than its shape requires
    #[error("Missing operand: expected {expected}")]
    MissingOperand {
        /// What the opcode shape requires next
        expected: String,
    },

    /// Instruction has more operands than its shape allows
    #[error("Unexpected operand {operand}")]
    UnexpectedOperand {
        /// Position of the first surplus operand
        operand: usize,
    },

    /// Modifier or control bits set a reserved bit or an illegal width
    #[error("{op}: opcode bytes {byte0:#04x} {byte1:#04x} are not a valid encoding")]
    InvalidEncoding {
        /// Opcode family
        op: Op,
        /// First opcode byte
        byte0: u8,
        /// Second opcode byte without register fields
        byte1: u8,
    },

    /// Control bits collide with the register sub-fields of byte 1
    #[error("{op}: control bits {control:#04x} overlap register fields")]
    ControlOverlapsRegisters {
        /// Opcode family
        op: Op,
        /// Offending control byte
        control: u8,
    },

    /// Relative fixup value is not 2-byte aligned
    #[error("Fixup {kind:?}: value {value} must be 2-byte aligned")]
    FixupMisaligned {
        /// Fixup kind
        kind: FixupKind,
        /// Adjusted value
        value: i64,
    },

    /// Fixup value does not fit its field
    #[error("Fixup {kind:?}: value {value} out of range")]
    FixupOutOfRange {
        /// Fixup kind
        kind: FixupKind,
        /// Adjusted value
        value: i64,
    },

    /// Fixup field lies outside the code it is applied to
    #[error("Fixup at offset {offset} ({width} bytes) outside {len}-byte code")]
    FixupOutOfBounds {
        /// Field offset
        offset: usize,
        /// Field width in bytes
        width: usize,
        /// Code length
        len: usize,
    },

    /// NOP padding must be a whole number of two-byte NOPs
    #[error("Cannot pad {0} bytes with two-byte NOPs")]
    OddNopPadding(usize),
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
