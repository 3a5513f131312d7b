//! `StackMapTable` frames.
//!
//! Frames in the attribute are delta-compressed against the previous frame, starting from an
//! implicit frame derived from the method descriptor. [`decode_frames`] expands them into
//! absolute [`StackMapFrame`] values; [`encode_full_frames`] writes frames back using the
//! uncompressed `full_frame` form only, which is always valid and keeps the encoder trivial.
//!
//! Verification types for `long` and `double` occupy a single list entry but two local slots.

use crate::{
    classfile::{
        constpool::ConstantPool,
        descriptor::{FieldType, MethodDescriptor, ValueKind},
    },
    file::{io::push_be, parser::Parser},
    Result,
};

const SAME_MAX: u8 = 63;
const SAME_LOCALS_1_STACK_ITEM_MAX: u8 = 127;
const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const CHOP_MIN: u8 = 248;
const CHOP_MAX: u8 = 250;
const SAME_FRAME_EXTENDED: u8 = 251;
const APPEND_MIN: u8 = 252;
const APPEND_MAX: u8 = 254;
const FULL_FRAME: u8 = 255;

/// The type of one local variable or stack entry at a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// Unusable slot
    Top,
    /// `int`, `short`, `char`, `byte` or `boolean`
    Integer,
    /// `float`
    Float,
    /// `double`, covering two slots
    Double,
    /// `long`, covering two slots
    Long,
    /// The null reference
    Null,
    /// Receiver of a constructor before the super constructor call
    UninitializedThis,
    /// Instance of the `Class` entry at this index
    Object(u16),
    /// Result of the `new` instruction at this offset, not yet initialized
    Uninitialized(u16),
}

impl VerificationType {
    /// Local slots covered by this type.
    #[must_use]
    pub fn width(self) -> u16 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }

    /// Verification type for a declared field type, adding the `Class` entry if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the constant pool is full.
    pub fn from_field_type(field: &FieldType, pool: &mut ConstantPool) -> Result<Self> {
        Ok(match field.kind() {
            ValueKind::Int => VerificationType::Integer,
            ValueKind::Float => VerificationType::Float,
            ValueKind::Long => VerificationType::Long,
            ValueKind::Double => VerificationType::Double,
            ValueKind::Reference => match field.class_entry_name() {
                Some(name) => VerificationType::Object(pool.add_class(&name)?),
                None => return Err(malformed_error!("Reference type without a class name")),
            },
        })
    }

    fn parse(parser: &mut Parser) -> Result<Self> {
        Ok(match parser.read_be::<u8>()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(parser.read_be()?),
            8 => VerificationType::Uninitialized(parser.read_be()?),
            tag => return Err(malformed_error!("Invalid verification type tag - {}", tag)),
        })
    }

    fn write(self, out: &mut Vec<u8>) {
        match self {
            VerificationType::Top => out.push(0),
            VerificationType::Integer => out.push(1),
            VerificationType::Float => out.push(2),
            VerificationType::Double => out.push(3),
            VerificationType::Long => out.push(4),
            VerificationType::Null => out.push(5),
            VerificationType::UninitializedThis => out.push(6),
            VerificationType::Object(index) => {
                out.push(7);
                push_be(out, index);
            }
            VerificationType::Uninitialized(offset) => {
                out.push(8);
                push_be(out, offset);
            }
        }
    }
}

/// A frame with an absolute offset and fully expanded locals and stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Bytecode offset the frame describes
    pub offset: u16,
    /// Local variable types, one entry per value
    pub locals: Vec<VerificationType>,
    /// Operand stack types, bottom first
    pub stack: Vec<VerificationType>,
}

impl StackMapFrame {
    /// Number of local slots the frame's locals cover.
    #[must_use]
    pub fn local_slots(&self) -> u16 {
        self.locals.iter().map(|local| local.width()).sum()
    }
}

/// Build the implicit frame a method starts with.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the constant pool is full.
pub fn initial_locals(
    this_class: u16,
    is_static: bool,
    is_constructor: bool,
    descriptor: &MethodDescriptor,
    pool: &mut ConstantPool,
) -> Result<Vec<VerificationType>> {
    let mut locals = Vec::with_capacity(descriptor.parameters.len() + 1);
    if !is_static {
        locals.push(if is_constructor {
            VerificationType::UninitializedThis
        } else {
            VerificationType::Object(this_class)
        });
    }
    for parameter in &descriptor.parameters {
        locals.push(VerificationType::from_field_type(parameter, pool)?);
    }
    Ok(locals)
}

/// Expand a `StackMapTable` payload into absolute frames.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on reserved frame types, chops past the available locals
/// or offsets beyond 65535, and [`crate::Error::OutOfBounds`] on truncation.
pub fn decode_frames(info: &[u8], initial: &[VerificationType]) -> Result<Vec<StackMapFrame>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;

    let mut frames: Vec<StackMapFrame> = Vec::with_capacity(count as usize);
    let mut locals = initial.to_vec();
    let mut previous: Option<u16> = None;

    for _ in 0..count {
        let frame_type = parser.read_be::<u8>()?;
        let (delta, stack) = match frame_type {
            0..=SAME_MAX => (u16::from(frame_type), Vec::new()),
            64..=SAME_LOCALS_1_STACK_ITEM_MAX => (
                u16::from(frame_type - 64),
                vec![VerificationType::parse(&mut parser)?],
            ),
            SAME_LOCALS_1_STACK_ITEM_EXTENDED => {
                let delta = parser.read_be::<u16>()?;
                (delta, vec![VerificationType::parse(&mut parser)?])
            }
            CHOP_MIN..=CHOP_MAX => {
                let delta = parser.read_be::<u16>()?;
                let chop = usize::from(SAME_FRAME_EXTENDED - frame_type);
                if chop > locals.len() {
                    return Err(malformed_error!(
                        "Chop frame removes {} of {} locals",
                        chop,
                        locals.len()
                    ));
                }
                locals.truncate(locals.len() - chop);
                (delta, Vec::new())
            }
            SAME_FRAME_EXTENDED => (parser.read_be::<u16>()?, Vec::new()),
            APPEND_MIN..=APPEND_MAX => {
                let delta = parser.read_be::<u16>()?;
                for _ in 0..(frame_type - SAME_FRAME_EXTENDED) {
                    locals.push(VerificationType::parse(&mut parser)?);
                }
                (delta, Vec::new())
            }
            FULL_FRAME => {
                let delta = parser.read_be::<u16>()?;
                let local_count = parser.read_be::<u16>()?;
                locals.clear();
                for _ in 0..local_count {
                    locals.push(VerificationType::parse(&mut parser)?);
                }
                let stack_count = parser.read_be::<u16>()?;
                let mut stack = Vec::with_capacity(stack_count as usize);
                for _ in 0..stack_count {
                    stack.push(VerificationType::parse(&mut parser)?);
                }
                (delta, stack)
            }
            reserved => {
                return Err(malformed_error!(
                    "Reserved stack map frame type - {}",
                    reserved
                ))
            }
        };

        let offset = match previous {
            None => Some(delta),
            Some(previous) => previous
                .checked_add(delta)
                .and_then(|offset| offset.checked_add(1)),
        }
        .ok_or_else(|| malformed_error!("Stack map frame offset exceeds 65535"))?;

        frames.push(StackMapFrame {
            offset,
            locals: locals.clone(),
            stack,
        });
        previous = Some(offset);
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after StackMapTable",
            parser.remaining()
        ));
    }

    Ok(frames)
}

/// Encode frames as a `StackMapTable` payload of `full_frame` entries.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if offsets are not strictly increasing or a list is too
/// long.
pub fn encode_full_frames(frames: &[StackMapFrame]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    push_be(
        &mut out,
        u16::try_from(frames.len()).map_err(|_| malformed_error!("Too many stack map frames"))?,
    );

    let mut previous: Option<u16> = None;
    for frame in frames {
        let delta = match previous {
            None => frame.offset,
            Some(previous) if frame.offset > previous => frame.offset - previous - 1,
            Some(previous) => {
                return Err(malformed_error!(
                    "Stack map frame at {} does not follow frame at {}",
                    frame.offset,
                    previous
                ))
            }
        };

        out.push(FULL_FRAME);
        push_be(&mut out, delta);
        write_types(&frame.locals, &mut out)?;
        write_types(&frame.stack, &mut out)?;
        previous = Some(frame.offset);
    }

    Ok(out)
}

fn write_types(types: &[VerificationType], out: &mut Vec<u8>) -> Result<()> {
    push_be(
        out,
        u16::try_from(types.len()).map_err(|_| malformed_error!("Too many frame entries"))?,
    );
    for entry in types {
        entry.write(out);
    }
    Ok(())
}
