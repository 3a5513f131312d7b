//! Bytecode instruction set: opcode constants, decoding and encoding.
//!
//! # Architecture
//!
//! - [`opcodes`] - Raw opcode byte constants
//! - [`instruction`] - The static instruction table and the decoded [`Instruction`] model
//! - [`decoder`] - [`decode_stream`] turns a code array into instructions with absolute targets
//! - [`encoder`] - [`CodeEncoder`] writes instructions back with label-based fixups
//!
//! The weaver decodes each method body once, then re-encodes it through a [`CodeEncoder`] with
//! the injected instructions interleaved; every original branch target becomes a [`Label`].

pub mod decoder;
pub mod encoder;
pub mod instruction;
pub mod opcodes;

pub use decoder::{decode_instruction, decode_stream, is_return_opcode};
pub use encoder::{return_opcode, CodeEncoder, Label, MAX_CODE_LENGTH};
pub use instruction::{info, FlowType, Instruction, InstructionInfo, Operand, OperandType};
