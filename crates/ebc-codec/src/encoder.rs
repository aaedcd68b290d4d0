//! Instruction encoder

use rustc_hash::FxHashMap;

use crate::error::{CodecError, Result};
use crate::fixup::{self, Fixup};
use crate::instruction::Instruction;
use crate::operand::{ImmediateWidth, Operand};
use crate::shape::{FamilyDesc, RegisterLayout, ShapeFlags, Slot};

/// Result of encoding one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Bytes appended to the output
    pub size: usize,
    /// Fixups, with offsets relative to the instruction start
    pub fixups: Vec<Fixup>,
}

/// Append the encoding of `inst` to `out`
///
/// Nothing is appended if the instruction is rejected.
pub fn encode(inst: &Instruction, out: &mut Vec<u8>) -> Result<Encoded> {
    let mut bytes = Vec::with_capacity(inst.size());
    let fixups = Emitter::new(inst, &mut bytes).emit()?;

    tracing::debug!(
        "Encoded {} ({} bytes, {} fixups)",
        inst.op(),
        bytes.len(),
        fixups.len()
    );
    for fixup in &fixups {
        tracing::debug!(
            "Fixup {:?} for {} at offset {}",
            fixup.kind,
            fixup.symbol,
            fixup.offset
        );
    }

    out.extend_from_slice(&bytes);
    Ok(Encoded {
        size: bytes.len(),
        fixups,
    })
}

/// Walks the operands of one instruction in encoding order
struct Emitter<'a> {
    inst: &'a Instruction,
    out: &'a mut Vec<u8>,
    desc: FamilyDesc,
    position: usize,
    fixups: Vec<Fixup>,
}

impl<'a> Emitter<'a> {
    fn new(inst: &'a Instruction, out: &'a mut Vec<u8>) -> Self {
        Self {
            inst,
            out,
            desc: FamilyDesc::of(inst.op()),
            position: 0,
            fixups: Vec::new(),
        }
    }

    fn emit(mut self) -> Result<Vec<Fixup>> {
        let op = self.inst.op();
        let byte0 = self.inst.byte0();
        let control = self.inst.control();

        if self.desc.size == 1 {
            if control != 0 || !self.desc.matches(byte0, 0) {
                return Err(CodecError::InvalidEncoding {
                    op,
                    byte0,
                    byte1: control,
                });
            }
            self.out.push(byte0);
        } else {
            let layout = self.desc.layout(byte0);
            if control & layout.mask() != 0 {
                return Err(CodecError::ControlOverlapsRegisters { op, control });
            }
            if !self.desc.matches(byte0, control) {
                return Err(CodecError::InvalidEncoding {
                    op,
                    byte0,
                    byte1: control,
                });
            }
            let registers = self.registers(layout)?;
            self.out.push(byte0);
            self.out.push(control | registers);
        }

        let shape = self.desc.shapes(byte0, control);
        debug_assert_eq!(shape, self.inst.shape());

        if shape.contains(ShapeFlags::BREAK_CODE) {
            self.break_code()?;
        } else {
            for slot in [shape.op1(), shape.op2()].into_iter().flatten() {
                self.field(slot, control)?;
            }
        }

        if self.position < self.inst.operands().len() {
            return Err(CodecError::UnexpectedOperand {
                operand: self.position,
            });
        }
        Ok(self.fixups)
    }

    /// Next operand, or a diagnostic naming what was expected
    fn next_operand(&mut self, expected: impl FnOnce() -> String) -> Result<&'a Operand> {
        let operand = self
            .inst
            .operands()
            .get(self.position)
            .ok_or_else(|| CodecError::MissingOperand {
                expected: expected(),
            })?;
        self.position += 1;
        Ok(operand)
    }

    fn mismatch(&self, expected: String, found: &Operand) -> CodecError {
        CodecError::OperandMismatch {
            operand: self.position - 1,
            expected,
            found: found.describe(),
        }
    }

    /// Register fields of byte 1
    fn registers(&mut self, layout: RegisterLayout) -> Result<u8> {
        let mut bits = 0u8;
        for (field, class) in layout.classes().iter().enumerate() {
            let operand = self.next_operand(|| class.describe().to_string())?;
            match operand {
                Operand::Register(reg) if class.accepts(*reg) => {
                    bits |= reg.encoding() << RegisterLayout::shift(field);
                }
                other => return Err(self.mismatch(class.describe().to_string(), other)),
            }
        }
        Ok(bits)
    }

    fn break_code(&mut self) -> Result<()> {
        let operand = self.next_operand(|| "break code".to_string())?;
        match operand {
            Operand::Immediate(imm) if imm.width == ImmediateWidth::W8 => {
                let code = u8::try_from(imm.value).map_err(|_| CodecError::ImmediateOutOfRange {
                    operand: self.position - 1,
                    value: imm.value,
                    width: 8,
                    min: 0,
                    max: i64::from(u8::MAX),
                })?;
                self.out.push(code);
                Ok(())
            }
            other => Err(self.mismatch("break code".to_string(), other)),
        }
    }

    fn field(&mut self, slot: Slot, control: u8) -> Result<()> {
        let operand = self.next_operand(|| slot.to_string())?;
        let position = self.position - 1;
        match (slot, operand) {
            (Slot::Imm(width), Operand::Immediate(imm)) if imm.width == width => {
                if !width.contains(imm.value) {
                    return Err(CodecError::ImmediateOutOfRange {
                        operand: position,
                        value: imm.value,
                        width: width.bits(),
                        min: width.min(),
                        max: width.max(),
                    });
                }
                self.out
                    .extend_from_slice(&imm.value.to_le_bytes()[..width.bytes()]);
            }
            (Slot::Imm(width), Operand::Symbol(sym)) => {
                let kind = self
                    .desc
                    .fixup_kind(width, control)
                    .ok_or_else(|| self.mismatch(slot.to_string(), operand))?;
                self.fixups.push(Fixup {
                    offset: self.out.len(),
                    kind,
                    symbol: sym.clone(),
                });
                let end = self.out.len() + width.bytes();
                self.out.resize(end, 0);
            }
            (Slot::Idx(width), Operand::Index(idx)) if idx.width == width => {
                let bits = idx.pack().map_err(|err| err.at_operand(position))?;
                self.out.extend_from_slice(&bits.to_le_bytes()[..width.bytes()]);
            }
            (_, other) => return Err(self.mismatch(slot.to_string(), other)),
        }
        Ok(())
    }
}

/// Code for a sequence of instructions
///
/// Fixup offsets are relative to the start of the buffer.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
    fixups: Vec<Fixup>,
}

impl CodeBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
            fixups: Vec::new(),
        }
    }

    /// Encode `inst` at the end of the buffer and return its offset
    pub fn push(&mut self, inst: &Instruction) -> Result<usize> {
        let offset = self.code.len();
        let encoded = encode(inst, &mut self.code)?;
        self.fixups
            .extend(encoded.fixups.into_iter().map(|fixup| fixup.rebased(offset)));
        Ok(offset)
    }

    /// Encode every instruction, stopping at the first failure
    pub fn extend<'a>(&mut self, insts: impl IntoIterator<Item = &'a Instruction>) -> Result<()> {
        for inst in insts {
            self.push(inst)?;
        }
        Ok(())
    }

    /// Pad with NOPs until the length is a multiple of `alignment`
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let padding = (alignment - self.code.len() % alignment) % alignment;
        fixup::write_nops(&mut self.code, padding)
    }

    /// Patch one fixup with a resolved value
    pub fn patch(&mut self, fixup: &Fixup, value: i64) -> Result<()> {
        fixup.apply(&mut self.code, value)
    }

    /// Encoded bytes
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Pending fixups, in emission order
    pub fn fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    /// Pending fixups grouped by symbol name
    pub fn fixups_by_symbol(&self) -> FxHashMap<&str, Vec<&Fixup>> {
        let mut groups: FxHashMap<&str, Vec<&Fixup>> = FxHashMap::default();
        for fixup in &self.fixups {
            groups.entry(&*fixup.symbol.name).or_default().push(fixup);
        }
        groups
    }

    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Is the buffer empty
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Take the bytes and fixups
    pub fn into_parts(self) -> (Vec<u8>, Vec<Fixup>) {
        (self.code, self.fixups)
    }
}
