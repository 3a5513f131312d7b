//! Bytecode instruction decoding.
//!
//! This module turns a method's raw code array into a linear sequence of [`Instruction`]s with
//! absolute branch targets. It is the first step of every body rewrite: the rewriter needs the
//! exact instruction boundaries to relocate branches, switches and table offsets.
//!
//! # Key Components
//!
//! - [`decode_instruction`] - Decode the instruction at the parser's position
//! - [`decode_stream`] - Decode a whole code array and validate every branch target
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::{Parser, assembly::{decode_instruction, decode_stream, Operand}};
//!
//! // iload_1; ifge +5; iconst_0; ireturn; iconst_1; ireturn
//! let code = [0x1B, 0x9C, 0x00, 0x05, 0x03, 0xAC, 0x04, 0xAC];
//!
//! let mut parser = Parser::new(&code);
//! parser.seek(1)?;
//! let branch = decode_instruction(&mut parser)?;
//! assert_eq!(branch.mnemonic, "ifge");
//! assert_eq!(branch.operand, Operand::Target(6));
//!
//! let instructions = decode_stream(&code)?;
//! assert_eq!(instructions.len(), 6);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! Switch operands are padded to a four byte boundary measured from the start of the code
//! array, so the parser handed to [`decode_instruction`] must be rooted at offset zero.

use std::collections::HashSet;

use crate::{
    assembly::{
        instruction::{info, FlowType, Instruction, Operand, OperandType},
        opcodes,
    },
    file::parser::Parser,
    Result,
};

/// Decode one instruction at the parser's current position.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for undefined opcodes, invalid `wide` forms, inverted
/// `tableswitch` bounds and branch targets outside the addressable range, and
/// [`crate::Error::OutOfBounds`] when the instruction is truncated.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let start = parser.pos();
    let offset = position_u32(start)?;
    let first = parser.read_be::<u8>()?;

    let Some(first_info) = info(first) else {
        return Err(malformed_error!(
            "Invalid opcode 0x{:02X} at offset {}",
            first,
            offset
        ));
    };

    let (opcode, wide, instr_info) = if first_info.operand_type == OperandType::Wide {
        let widened = parser.read_be::<u8>()?;
        match info(widened) {
            Some(widened_info)
                if matches!(
                    widened_info.operand_type,
                    OperandType::Local | OperandType::Iinc
                ) =>
            {
                (widened, true, widened_info)
            }
            _ => {
                return Err(malformed_error!(
                    "Opcode 0x{:02X} cannot follow wide at offset {}",
                    widened,
                    offset
                ))
            }
        }
    } else {
        (first, false, first_info)
    };

    let relative = |delta: i32| -> Result<u32> {
        let target = i64::from(offset) + i64::from(delta);
        u32::try_from(target).map_err(|_| {
            malformed_error!("Branch at {} targets negative offset {}", offset, target)
        })
    };

    let operand = match instr_info.operand_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Int(i32::from(parser.read_be::<i8>()?)),
        OperandType::Int16 => Operand::Int(i32::from(parser.read_be::<i16>()?)),
        OperandType::ArrayType => Operand::Int(i32::from(parser.read_be::<u8>()?)),
        OperandType::Constant8 => Operand::Constant(u16::from(parser.read_be::<u8>()?)),
        OperandType::Constant16 => Operand::Constant(parser.read_be::<u16>()?),
        OperandType::Local if wide => Operand::Local(parser.read_be::<u16>()?),
        OperandType::Local => Operand::Local(u16::from(parser.read_be::<u8>()?)),
        OperandType::Iinc if wide => Operand::Iinc {
            index: parser.read_be::<u16>()?,
            delta: parser.read_be::<i16>()?,
        },
        OperandType::Iinc => Operand::Iinc {
            index: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },
        OperandType::Branch16 => Operand::Target(relative(i32::from(parser.read_be::<i16>()?))?),
        OperandType::Branch32 => Operand::Target(relative(parser.read_be::<i32>()?)?),
        OperandType::TableSwitch => {
            parser.align(4)?;
            let default = relative(parser.read_be::<i32>()?)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at {} has high {} below low {}",
                    offset,
                    high,
                    low
                ));
            }

            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            if count > parser.remaining() / 4 {
                return Err(out_of_bounds_error!());
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(relative(parser.read_be::<i32>()?)?);
            }
            Operand::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        OperandType::LookupSwitch => {
            parser.align(4)?;
            let default = relative(parser.read_be::<i32>()?)?;
            let npairs = parser.read_be::<i32>()?;
            let Ok(count) = usize::try_from(npairs) else {
                return Err(malformed_error!(
                    "lookupswitch at {} has negative pair count {}",
                    offset,
                    npairs
                ));
            };
            if count > parser.remaining() / 8 {
                return Err(out_of_bounds_error!());
            }
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                pairs.push((key, relative(parser.read_be::<i32>()?)?));
            }
            Operand::LookupSwitch { default, pairs }
        }
        OperandType::InvokeInterface => {
            let index = parser.read_be::<u16>()?;
            let count = parser.read_be::<u8>()?;
            parser.advance_by(1)?;
            Operand::InvokeInterface { index, count }
        }
        OperandType::InvokeDynamic => {
            let index = parser.read_be::<u16>()?;
            parser.advance_by(2)?;
            Operand::Constant(index)
        }
        OperandType::MultiANewArray => Operand::MultiANewArray {
            index: parser.read_be::<u16>()?,
            dimensions: parser.read_be::<u8>()?,
        },
        OperandType::Wide => {
            return Err(malformed_error!("Nested wide prefix at offset {}", offset))
        }
    };

    let branch_targets = match (&instr_info.flow, &operand) {
        (
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Subroutine,
            Operand::Target(target),
        ) => vec![*target],
        (
            FlowType::Switch,
            Operand::TableSwitch {
                default,
                targets,
                ..
            },
        ) => std::iter::once(*default)
            .chain(targets.iter().copied())
            .collect(),
        (FlowType::Switch, Operand::LookupSwitch { default, pairs }) => std::iter::once(*default)
            .chain(pairs.iter().map(|(_, target)| *target))
            .collect(),
        _ => Vec::new(),
    };

    Ok(Instruction {
        offset,
        size: position_u32(parser.pos() - start)?,
        opcode,
        wide,
        mnemonic: instr_info.mnemonic,
        flow_type: instr_info.flow,
        operand,
        branch_targets,
    })
}

/// Decode an entire code array.
///
/// Beyond decoding each instruction this checks that every branch and switch target lands on
/// the first byte of an instruction.
///
/// # Errors
/// Returns [`crate::Error::Empty`] for an empty code array, [`crate::Error::Malformed`] for
/// invalid instructions or targets and [`crate::Error::OutOfBounds`] for truncated code.
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    if code.is_empty() {
        return Err(crate::Error::Empty);
    }

    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }

    let boundaries: HashSet<u32> = instructions.iter().map(|i| i.offset).collect();
    for instruction in &instructions {
        for target in &instruction.branch_targets {
            if !boundaries.contains(target) {
                return Err(malformed_error!(
                    "{} at {} targets {}, which is not an instruction boundary",
                    instruction.mnemonic,
                    instruction.offset,
                    target
                ));
            }
        }
    }

    Ok(instructions)
}

/// Returns `true` if `opcode` is one of the six return instructions.
#[must_use]
pub fn is_return_opcode(opcode: u8) -> bool {
    (opcodes::IRETURN..=opcodes::RETURN).contains(&opcode)
}

fn position_u32(position: usize) -> Result<u32> {
    u32::try_from(position).map_err(|_| malformed_error!("Code offset exceeds u32 range"))
}
