//! Argument materialization and boxing.
//!
//! The entry hook receives the method's arguments as an `Object[]`. [`materialize`] emits the
//! code that builds that array from the parameter slots, boxing each primitive through its
//! wrapper's `valueOf`:
//!
//! ```text
//! <length>; anewarray java/lang/Object
//! dup; <i>; <xload slot_i>; [invokestatic Wrapper.valueOf]; aastore    (per parameter)
//! ```
//!
//! Parameter slots start at 1 for instance methods (slot 0 holds the receiver) and at 0 for
//! static methods, and advance by each parameter's width, so a `long` or `double` parameter
//! moves the next one two slots along.

use strum::EnumIter;

use crate::{
    assembly::{opcodes, CodeEncoder},
    classfile::{BaseType, ConstantPool, FieldType, MethodDescriptor, ValueKind},
    Result,
};

/// Internal name of `java.lang.Object`.
pub const OBJECT_CLASS: &str = "java/lang/Object";

/// The closed set of parameter kinds the materializer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum ParamKind {
    /// `boolean`, boxed to `java.lang.Boolean`
    Boolean,
    /// `byte`, boxed to `java.lang.Byte`
    Byte,
    /// `char`, boxed to `java.lang.Character`
    Char,
    /// `short`, boxed to `java.lang.Short`
    Short,
    /// `int`, boxed to `java.lang.Integer`
    Int,
    /// `long`, boxed to `java.lang.Long`
    Long,
    /// `float`, boxed to `java.lang.Float`
    Float,
    /// `double`, boxed to `java.lang.Double`
    Double,
    /// Any object or array, passed through unchanged
    Reference,
}

impl ParamKind {
    /// Classify a declared type.
    #[must_use]
    pub fn of(field: &FieldType) -> Self {
        match field {
            FieldType::Base(BaseType::Boolean) => ParamKind::Boolean,
            FieldType::Base(BaseType::Byte) => ParamKind::Byte,
            FieldType::Base(BaseType::Char) => ParamKind::Char,
            FieldType::Base(BaseType::Short) => ParamKind::Short,
            FieldType::Base(BaseType::Int) => ParamKind::Int,
            FieldType::Base(BaseType::Long) => ParamKind::Long,
            FieldType::Base(BaseType::Float) => ParamKind::Float,
            FieldType::Base(BaseType::Double) => ParamKind::Double,
            FieldType::Object(_) | FieldType::Array(_) => ParamKind::Reference,
        }
    }

    /// How values of this kind are loaded and stored.
    #[must_use]
    pub fn value_kind(self) -> ValueKind {
        match self {
            ParamKind::Boolean
            | ParamKind::Byte
            | ParamKind::Char
            | ParamKind::Short
            | ParamKind::Int => ValueKind::Int,
            ParamKind::Long => ValueKind::Long,
            ParamKind::Float => ValueKind::Float,
            ParamKind::Double => ValueKind::Double,
            ParamKind::Reference => ValueKind::Reference,
        }
    }

    /// Wrapper class internal name and `valueOf` descriptor, `None` for references.
    #[must_use]
    pub fn boxing(self) -> Option<(&'static str, &'static str)> {
        match self {
            ParamKind::Boolean => Some(("java/lang/Boolean", "(Z)Ljava/lang/Boolean;")),
            ParamKind::Byte => Some(("java/lang/Byte", "(B)Ljava/lang/Byte;")),
            ParamKind::Char => Some(("java/lang/Character", "(C)Ljava/lang/Character;")),
            ParamKind::Short => Some(("java/lang/Short", "(S)Ljava/lang/Short;")),
            ParamKind::Int => Some(("java/lang/Integer", "(I)Ljava/lang/Integer;")),
            ParamKind::Long => Some(("java/lang/Long", "(J)Ljava/lang/Long;")),
            ParamKind::Float => Some(("java/lang/Float", "(F)Ljava/lang/Float;")),
            ParamKind::Double => Some(("java/lang/Double", "(D)Ljava/lang/Double;")),
            ParamKind::Reference => None,
        }
    }
}

/// Emit the boxing call for a value of `kind` on top of the stack; no-op for references.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the constant pool is full.
pub fn emit_box(encoder: &mut CodeEncoder, pool: &mut ConstantPool, kind: ParamKind) -> Result<()> {
    if let Some((wrapper, descriptor)) = kind.boxing() {
        let method = pool.add_method_ref(wrapper, "valueOf", descriptor)?;
        encoder.emit_indexed(opcodes::INVOKESTATIC, method);
    }
    Ok(())
}

/// Emit code leaving a new `Object[]` of all arguments on the stack.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the constant pool is full.
pub fn materialize(
    encoder: &mut CodeEncoder,
    pool: &mut ConstantPool,
    descriptor: &MethodDescriptor,
    is_static: bool,
) -> Result<()> {
    let count = i32::try_from(descriptor.parameters.len())
        .map_err(|_| malformed_error!("Too many parameters"))?;
    encoder.push_int(count, pool)?;
    let object = pool.add_class(OBJECT_CLASS)?;
    encoder.emit_indexed(opcodes::ANEWARRAY, object);

    let mut slot: u16 = u16::from(!is_static);
    for (index, parameter) in (0_i32..).zip(&descriptor.parameters) {
        let kind = ParamKind::of(parameter);
        encoder.emit(opcodes::DUP);
        encoder.push_int(index, pool)?;
        encoder.load(kind.value_kind(), slot);
        emit_box(encoder, pool, kind)?;
        encoder.emit(opcodes::AASTORE);
        slot += parameter.width();
    }
    Ok(())
}

/// Highest operand stack depth reached by the entry sequence, receiver and label included.
#[must_use]
pub fn entry_stack_peak(descriptor: &MethodDescriptor) -> u16 {
    // receiver-or-null, label, array
    let base = 3;
    descriptor
        .parameters
        .iter()
        .map(|parameter| base + 2 + parameter.width())
        .max()
        .unwrap_or(base)
}
