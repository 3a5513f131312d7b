//! Bytecode encoding with label resolution.
//!
//! [`CodeEncoder`] appends instructions to a growing code array. Branches and switches refer to
//! [`Label`]s, which may be bound before or after the instruction that targets them; every such
//! reference is recorded as a fixup and patched in [`CodeEncoder::finish`]. Switch padding is
//! computed from the instruction's final position, so an encoder must always start at offset
//! zero of the method's code.
//!
//! # Examples
//!
//! ```rust
//! use classweave::assembly::{opcodes, CodeEncoder};
//! use classweave::classfile::{ConstantPool, ValueKind};
//!
//! let mut pool = ConstantPool::new();
//! let mut encoder = CodeEncoder::new();
//! let negative = encoder.new_label();
//!
//! encoder.load(ValueKind::Int, 0);
//! encoder.emit_branch(opcodes::IFLT, negative)?;
//! encoder.push_int(1, &mut pool)?;
//! encoder.emit(opcodes::IRETURN);
//! encoder.bind(negative)?;
//! encoder.push_int(-1, &mut pool)?;
//! encoder.emit(opcodes::IRETURN);
//!
//! let code = encoder.finish()?;
//! assert_eq!(code, [0x1A, 0x9B, 0x00, 0x05, 0x04, 0xAC, 0x02, 0xAC]);
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    assembly::{
        instruction::{info, OperandType},
        opcodes,
    },
    classfile::{ConstantPool, ValueKind},
    file::io::{push_be, write_be_at},
    Result,
};

/// Largest code array the format allows.
pub const MAX_CODE_LENGTH: usize = 65535;

/// A position in the code that branches can target before it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
struct Fixup {
    label: Label,
    /// Offset of the instruction's opcode; offsets are relative to it
    instruction: usize,
    /// Where the offset is written
    position: usize,
    /// 2 or 4 bytes
    width: u8,
}

/// Incremental bytecode encoder.
#[derive(Debug, Default)]
pub struct CodeEncoder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl CodeEncoder {
    /// Create an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the encoded code, i.e. the offset of the next instruction.
    #[must_use]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Allocate a new, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the label is unknown or already bound.
    pub fn bind(&mut self, label: Label) -> Result<()> {
        let position = self.code.len();
        match self.labels.get_mut(label.0) {
            Some(slot @ None) => {
                *slot = Some(position);
                Ok(())
            }
            Some(Some(bound)) => Err(malformed_error!(
                "Label {} already bound at {}",
                label.0,
                bound
            )),
            None => Err(malformed_error!("Unknown label {}", label.0)),
        }
    }

    /// Offset a label was bound to.
    #[must_use]
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0).copied().flatten()
    }

    /// Append a single opcode without operands.
    pub fn emit(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    /// Append raw, already encoded bytes.
    pub fn emit_raw(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Append a branch to `label`, using the operand width the opcode defines.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `opcode` is not a branch.
    pub fn emit_branch(&mut self, opcode: u8, label: Label) -> Result<()> {
        let width = match info(opcode).map(|i| i.operand_type) {
            Some(OperandType::Branch16) => 2,
            Some(OperandType::Branch32) => 4,
            _ => return Err(malformed_error!("Opcode 0x{:02X} is not a branch", opcode)),
        };

        let instruction = self.code.len();
        self.code.push(opcode);
        self.push_fixup(label, instruction, width);
        Ok(())
    }

    /// Append a `tableswitch` covering `low..=low + targets.len() - 1`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `targets` is empty or the key range overflows
    /// `i32`.
    pub fn emit_tableswitch(&mut self, default: Label, low: i32, targets: &[Label]) -> Result<()> {
        if targets.is_empty() {
            return Err(malformed_error!("tableswitch needs at least one target"));
        }
        let count = i32::try_from(targets.len())
            .map_err(|_| malformed_error!("tableswitch has too many targets"))?;
        let high = low
            .checked_add(count - 1)
            .ok_or_else(|| malformed_error!("tableswitch key range overflows"))?;

        let instruction = self.code.len();
        self.code.push(opcodes::TABLESWITCH);
        self.pad_switch();
        self.push_fixup(default, instruction, 4);
        push_be(&mut self.code, low);
        push_be(&mut self.code, high);
        for target in targets {
            self.push_fixup(*target, instruction, 4);
        }
        Ok(())
    }

    /// Append a `lookupswitch`; `pairs` must already be sorted by key.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the keys are not strictly increasing.
    pub fn emit_lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> Result<()> {
        if pairs.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(malformed_error!("lookupswitch keys are not sorted"));
        }
        let count = i32::try_from(pairs.len())
            .map_err(|_| malformed_error!("lookupswitch has too many pairs"))?;

        let instruction = self.code.len();
        self.code.push(opcodes::LOOKUPSWITCH);
        self.pad_switch();
        self.push_fixup(default, instruction, 4);
        push_be(&mut self.code, count);
        for (key, target) in pairs {
            push_be(&mut self.code, *key);
            self.push_fixup(*target, instruction, 4);
        }
        Ok(())
    }

    /// Push an `int` constant using the shortest encoding.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the constant pool is full.
    pub fn push_int(&mut self, value: i32, pool: &mut ConstantPool) -> Result<()> {
        match value {
            -1..=5 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let opcode = (i32::from(opcodes::ICONST_0) + value) as u8;
                self.code.push(opcode);
            }
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    self.code.push(opcodes::BIPUSH);
                    push_be(&mut self.code, byte);
                } else if let Ok(short) = i16::try_from(value) {
                    self.code.push(opcodes::SIPUSH);
                    push_be(&mut self.code, short);
                } else {
                    let index = pool.add_integer(value)?;
                    self.ldc(index);
                }
            }
        }
        Ok(())
    }

    /// Load a single-slot constant (`ldc`, or `ldc_w` for indices above 255).
    pub fn ldc(&mut self, index: u16) {
        if let Ok(short) = u8::try_from(index) {
            self.code.push(opcodes::LDC);
            self.code.push(short);
        } else {
            self.code.push(opcodes::LDC_W);
            push_be(&mut self.code, index);
        }
    }

    /// Load a local of the given kind.
    pub fn load(&mut self, kind: ValueKind, slot: u16) {
        self.local_insn(opcodes::ILOAD, opcodes::ILOAD_0, kind, slot);
    }

    /// Store into a local of the given kind.
    pub fn store(&mut self, kind: ValueKind, slot: u16) {
        self.local_insn(opcodes::ISTORE, opcodes::ISTORE_0, kind, slot);
    }

    /// Append an instruction with a two-byte constant pool operand (invocations, `new`,
    /// `anewarray`, `checkcast`, field access).
    pub fn emit_indexed(&mut self, opcode: u8, index: u16) {
        self.code.push(opcode);
        push_be(&mut self.code, index);
    }

    /// Resolve every fixup and return the code array.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a label was never bound, a 16-bit branch cannot
    /// reach its target, or the code exceeds 65535 bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.code.len() > MAX_CODE_LENGTH {
            return Err(malformed_error!(
                "Code length {} exceeds {}",
                self.code.len(),
                MAX_CODE_LENGTH
            ));
        }

        for fixup in std::mem::take(&mut self.fixups) {
            let Some(target) = self.label_offset(fixup.label) else {
                return Err(malformed_error!("Label {} was never bound", fixup.label.0));
            };

            // Both values are bounded by MAX_CODE_LENGTH
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let delta = target as i32 - fixup.instruction as i32;
            let mut position = fixup.position;
            if fixup.width == 2 {
                let short = i16::try_from(delta).map_err(|_| {
                    malformed_error!(
                        "Branch at {} cannot reach {} with a 16-bit offset",
                        fixup.instruction,
                        target
                    )
                })?;
                write_be_at(&mut self.code, &mut position, short)?;
            } else {
                write_be_at(&mut self.code, &mut position, delta)?;
            }
        }

        Ok(self.code)
    }

    fn push_fixup(&mut self, label: Label, instruction: usize, width: u8) {
        self.fixups.push(Fixup {
            label,
            instruction,
            position: self.code.len(),
            width,
        });
        self.code.extend(std::iter::repeat_n(0, usize::from(width)));
    }

    fn pad_switch(&mut self) {
        while !self.code.len().is_multiple_of(4) {
            self.code.push(0);
        }
    }

    fn local_insn(&mut self, long_form: u8, short_base: u8, kind: ValueKind, slot: u16) {
        let kind_index = match kind {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        };

        match slot {
            0..=3 => {
                #[allow(clippy::cast_possible_truncation)]
                let opcode = short_base + kind_index * 4 + slot as u8;
                self.code.push(opcode);
            }
            4..=255 => {
                self.code.push(long_form + kind_index);
                #[allow(clippy::cast_possible_truncation)]
                self.code.push(slot as u8);
            }
            _ => {
                self.code.push(opcodes::WIDE);
                self.code.push(long_form + kind_index);
                push_be(&mut self.code, slot);
            }
        }
    }
}

/// The return instruction for a value of `kind`, `return` for `None`.
#[must_use]
pub fn return_opcode(kind: Option<ValueKind>) -> u8 {
    match kind {
        None => opcodes::RETURN,
        Some(ValueKind::Int) => opcodes::IRETURN,
        Some(ValueKind::Long) => opcodes::LRETURN,
        Some(ValueKind::Float) => opcodes::FRETURN,
        Some(ValueKind::Double) => opcodes::DRETURN,
        Some(ValueKind::Reference) => opcodes::ARETURN,
    }
}
