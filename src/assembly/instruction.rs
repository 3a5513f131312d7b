//! Instruction representation, operand layouts and control-flow metadata.
//!
//! The module is organized around [`Instruction`], the decoded form of one bytecode
//! instruction. [`info`] is the static instruction table: for every defined opcode it yields the
//! mnemonic, the [`OperandType`] that tells the decoder how many bytes follow, and the
//! [`FlowType`] that tells the rewriter whether the instruction branches, switches, returns or
//! throws.
//!
//! Branch and switch operands are stored as absolute code offsets; the relative encoding only
//! exists in the raw bytes.
//!
//! # Examples
//!
//! ```rust
//! use classweave::assembly::{info, opcodes, FlowType, OperandType};
//!
//! let goto = info(opcodes::GOTO).unwrap();
//! assert_eq!(goto.mnemonic, "goto");
//! assert_eq!(goto.operand_type, OperandType::Branch16);
//! assert_eq!(goto.flow, FlowType::UnconditionalBranch);
//! assert_eq!(goto.flow.to_string(), "UnconditionalBranch");
//!
//! assert!(info(0xCA).is_none()); // breakpoint is reserved
//! ```

use strum::Display;

use crate::{assembly::opcodes, classfile::ValueKind};

/// The operand layout following an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed byte (`bipush`)
    Int8,
    /// Signed 16-bit value (`sipush`)
    Int16,
    /// One-byte constant pool index (`ldc`)
    Constant8,
    /// Two-byte constant pool index
    Constant16,
    /// Local variable index; one byte, two after `wide`
    Local,
    /// Local index and signed increment; widened after `wide`
    Iinc,
    /// Primitive array type code (`newarray`)
    ArrayType,
    /// Signed 16-bit branch offset
    Branch16,
    /// Signed 32-bit branch offset
    Branch32,
    /// Padded jump table
    TableSwitch,
    /// Padded match/offset pairs
    LookupSwitch,
    /// Constant pool index, argument count and a zero byte
    InvokeInterface,
    /// Constant pool index and two zero bytes
    InvokeDynamic,
    /// Constant pool index and dimension count
    MultiANewArray,
    /// The `wide` prefix
    Wide,
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Either branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Jumps to a subroutine (`jsr`)
    Subroutine,
    /// Returns from a subroutine (`ret`)
    SubroutineReturn,
    /// Invokes a method and continues
    Call,
    /// Returns from the method
    Return,
    /// Multi-way branch
    Switch,
    /// Throws the exception on top of the stack
    Throw,
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    /// Lower-case mnemonic
    pub mnemonic: &'static str,
    /// Layout of the operand bytes
    pub operand_type: OperandType,
    /// Control-flow behavior
    pub flow: FlowType,
}

const MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload",
    "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1", "lload_2", "lload_3",
    "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1", "dload_2", "dload_3",
    "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload", "faload", "daload", "aaload",
    "baload", "caload", "saload", "istore", "lstore", "fstore", "dstore", "astore", "istore_0",
    "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1", "lstore_2", "lstore_3",
    "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0", "dstore_1", "dstore_2",
    "dstore_3", "astore_0", "astore_1", "astore_2", "astore_3", "iastore", "lastore", "fastore",
    "dastore", "aastore", "bastore", "castore", "sastore", "pop", "pop2", "dup", "dup_x1",
    "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap", "iadd", "ladd", "fadd", "dadd", "isub", "lsub",
    "fsub", "dsub", "imul", "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem",
    "frem", "drem", "ineg", "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr",
    "lushr", "iand", "land", "ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i",
    "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl",
    "fcmpg", "dcmpl", "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq",
    "if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne",
    "goto", "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn",
    "dreturn", "areturn", "return", "getstatic", "putstatic", "getfield", "putfield",
    "invokevirtual", "invokespecial", "invokestatic", "invokeinterface", "invokedynamic", "new",
    "newarray", "anewarray", "arraylength", "athrow", "checkcast", "instanceof", "monitorenter",
    "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

/// Look up the static description of `opcode`.
///
/// Returns `None` for reserved and undefined opcodes (`breakpoint`, `impdep1`, `impdep2` and
/// everything above `jsr_w`).
#[must_use]
pub fn info(opcode: u8) -> Option<InstructionInfo> {
    let mnemonic = MNEMONICS.get(opcode as usize)?;

    let operand_type = match opcode {
        opcodes::BIPUSH => OperandType::Int8,
        opcodes::SIPUSH => OperandType::Int16,
        opcodes::LDC => OperandType::Constant8,
        opcodes::LDC_W
        | opcodes::LDC2_W
        | opcodes::GETSTATIC..=opcodes::INVOKESTATIC
        | opcodes::NEW
        | opcodes::ANEWARRAY
        | opcodes::CHECKCAST
        | opcodes::INSTANCEOF => OperandType::Constant16,
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
            OperandType::Local
        }
        opcodes::IINC => OperandType::Iinc,
        opcodes::NEWARRAY => OperandType::ArrayType,
        opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
            OperandType::Branch16
        }
        opcodes::GOTO_W | opcodes::JSR_W => OperandType::Branch32,
        opcodes::TABLESWITCH => OperandType::TableSwitch,
        opcodes::LOOKUPSWITCH => OperandType::LookupSwitch,
        opcodes::INVOKEINTERFACE => OperandType::InvokeInterface,
        opcodes::INVOKEDYNAMIC => OperandType::InvokeDynamic,
        opcodes::MULTIANEWARRAY => OperandType::MultiANewArray,
        opcodes::WIDE => OperandType::Wide,
        _ => OperandType::None,
    };

    let flow = match opcode {
        opcodes::IFEQ..=opcodes::IF_ACMPNE | opcodes::IFNULL | opcodes::IFNONNULL => {
            FlowType::ConditionalBranch
        }
        opcodes::GOTO | opcodes::GOTO_W => FlowType::UnconditionalBranch,
        opcodes::JSR | opcodes::JSR_W => FlowType::Subroutine,
        opcodes::RET => FlowType::SubroutineReturn,
        opcodes::TABLESWITCH | opcodes::LOOKUPSWITCH => FlowType::Switch,
        opcodes::IRETURN..=opcodes::RETURN => FlowType::Return,
        opcodes::ATHROW => FlowType::Throw,
        opcodes::INVOKEVIRTUAL..=opcodes::INVOKEDYNAMIC => FlowType::Call,
        _ => FlowType::Sequential,
    };

    Some(InstructionInfo {
        mnemonic,
        operand_type,
        flow,
    })
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate integer (`bipush`, `sipush`, `newarray` type code)
    Int(i32),
    /// Constant pool index
    Constant(u16),
    /// Local variable slot
    Local(u16),
    /// `iinc` slot and increment
    Iinc {
        /// Local variable slot
        index: u16,
        /// Signed increment
        delta: i16,
    },
    /// Absolute branch target
    Target(u32),
    /// `tableswitch` with absolute targets
    TableSwitch {
        /// Target when the key is outside `low..=high`
        default: u32,
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// One target per key in `low..=high`
        targets: Vec<u32>,
    },
    /// `lookupswitch` with absolute targets
    LookupSwitch {
        /// Target when no key matches
        default: u32,
        /// Sorted `(key, target)` pairs
        pairs: Vec<(i32, u32)>,
    },
    /// `invokeinterface` method reference and argument word count
    InvokeInterface {
        /// `InterfaceMethodref` index
        index: u16,
        /// Argument words including the receiver
        count: u8,
    },
    /// `multianewarray` class and dimension count
    MultiANewArray {
        /// `Class` index of the array type
        index: u16,
        /// Dimensions to create
        dimensions: u8,
    },
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte (the `wide` prefix if present)
    pub offset: u32,
    /// Encoded size in bytes, prefix and padding included
    pub size: u32,
    /// Opcode byte, the widened opcode for `wide` forms
    pub opcode: u8,
    /// Whether the instruction carried the `wide` prefix
    pub wide: bool,
    /// Lower-case mnemonic
    pub mnemonic: &'static str,
    /// Control-flow behavior
    pub flow_type: FlowType,
    /// Decoded operand
    pub operand: Operand,
    /// Absolute targets of branches and switches, default first for switches
    pub branch_targets: Vec<u32>,
}

impl Instruction {
    /// Offset of the following instruction.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Returns `true` for conditional and unconditional branches and subroutine jumps.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Subroutine
        )
    }

    /// Returns `true` for the six return instructions.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.flow_type == FlowType::Return
    }

    /// For a return instruction, the kind of value it returns (`None` for `return`).
    ///
    /// Returns `None` for every other instruction as well; check [`Instruction::is_return`].
    #[must_use]
    pub fn return_kind(&self) -> Option<ValueKind> {
        match self.opcode {
            opcodes::IRETURN => Some(ValueKind::Int),
            opcodes::LRETURN => Some(ValueKind::Long),
            opcodes::FRETURN => Some(ValueKind::Float),
            opcodes::DRETURN => Some(ValueKind::Double),
            opcodes::ARETURN => Some(ValueKind::Reference),
            _ => None,
        }
    }
}
