//! Field and method descriptors.
//!
//! Descriptors are the compact type strings of the class file format, e.g.
//! `(ILjava/lang/String;[J)V` for a method taking an `int`, a `String` and a `long[]` and
//! returning nothing. [`MethodDescriptor::parse`] turns them into typed values that know their
//! local-variable slot width, their computational kind and their source-level spelling.
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::{MethodDescriptor, ReturnType};
//!
//! let descriptor = MethodDescriptor::parse("(ILjava/lang/String;[J)V")?;
//! let names: Vec<String> = descriptor.parameters.iter().map(|p| p.source_name()).collect();
//!
//! assert_eq!(names, ["int", "java.lang.String", "long[]"]);
//! assert_eq!(descriptor.return_type, ReturnType::Void);
//! assert_eq!(descriptor.parameter_slots(), 3);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::fmt;

use crate::Result;

/// Primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
}

impl BaseType {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    /// The descriptor character.
    #[must_use]
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// The keyword used in source code.
    #[must_use]
    pub fn source_name(self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }
}

/// How a value is held on the operand stack and in locals.
///
/// `boolean`, `byte`, `char`, `short` and `int` all compute as [`ValueKind::Int`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 32-bit integer
    Int,
    /// 64-bit integer, two slots
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float, two slots
    Double,
    /// Object or array reference
    Reference,
}

impl ValueKind {
    /// Number of local variable slots a value of this kind occupies.
    #[must_use]
    pub fn width(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            ValueKind::Int | ValueKind::Float | ValueKind::Reference => 1,
        }
    }
}

/// The type of a field, parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A primitive
    Base(BaseType),
    /// A class or interface, by internal name (`java/lang/String`)
    Object(String),
    /// An array of the component type
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse exactly one field descriptor, e.g. `[[Ljava/lang/String;`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the string is not a single valid field descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut chars = descriptor.chars().peekable();
        let field = parse_field(&mut chars, descriptor)?;
        if chars.next().is_some() {
            return Err(malformed_error!(
                "Trailing characters in field descriptor '{}'",
                descriptor
            ));
        }
        Ok(field)
    }

    /// The computational kind of values of this type.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldType::Base(BaseType::Long) => ValueKind::Long,
            FieldType::Base(BaseType::Double) => ValueKind::Double,
            FieldType::Base(BaseType::Float) => ValueKind::Float,
            FieldType::Base(_) => ValueKind::Int,
            FieldType::Object(_) | FieldType::Array(_) => ValueKind::Reference,
        }
    }

    /// Number of local variable slots this type occupies.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.kind().width()
    }

    /// Source-level spelling: `int`, `java.lang.String`, `int[][]`.
    ///
    /// Nested class names keep their `$` separator.
    #[must_use]
    pub fn source_name(&self) -> String {
        match self {
            FieldType::Base(base) => base.source_name().to_string(),
            FieldType::Object(name) => name.replace('/', "."),
            FieldType::Array(component) => format!("{}[]", component.source_name()),
        }
    }

    /// The name a `CONSTANT_Class` entry uses for this type: the internal name for classes
    /// and the full descriptor for arrays. `None` for primitives.
    #[must_use]
    pub fn class_entry_name(&self) -> Option<String> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_string()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => write!(f, "{}", base.descriptor_char()),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// The return type of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// `V`
    Void,
    /// Any field type
    Value(FieldType),
}

impl ReturnType {
    /// Computational kind of the returned value, `None` for `void`.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            ReturnType::Void => None,
            ReturnType::Value(field) => Some(field.kind()),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Declared parameters in order
    pub parameters: Vec<FieldType>,
    /// Declared return type
    pub return_type: ReturnType,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(IJ)Ljava/lang/Object;`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is not well-formed.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(malformed_error!(
                "Method descriptor '{}' must start with '('",
                descriptor
            ));
        }

        let mut parameters = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => parameters.push(parse_field(&mut chars, descriptor)?),
                None => {
                    return Err(malformed_error!(
                        "Unterminated parameter list in '{}'",
                        descriptor
                    ))
                }
            }
        }

        let return_type = if chars.peek() == Some(&'V') {
            chars.next();
            ReturnType::Void
        } else {
            ReturnType::Value(parse_field(&mut chars, descriptor)?)
        };

        if chars.next().is_some() {
            return Err(malformed_error!(
                "Trailing characters in method descriptor '{}'",
                descriptor
            ));
        }

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Total local variable slots taken by the declared parameters, receiver excluded.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::width).sum()
    }
}

fn parse_field(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    descriptor: &str,
) -> Result<FieldType> {
    match chars.next() {
        Some('L') => {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(';') => break,
                    Some(c) => name.push(c),
                    None => {
                        return Err(malformed_error!(
                            "Unterminated class name in '{}'",
                            descriptor
                        ))
                    }
                }
            }
            if name.is_empty() {
                return Err(malformed_error!("Empty class name in '{}'", descriptor));
            }
            Ok(FieldType::Object(name))
        }
        Some('[') => Ok(FieldType::Array(Box::new(parse_field(chars, descriptor)?))),
        Some(c) => match BaseType::from_char(c) {
            Some(base) => Ok(FieldType::Base(base)),
            None => Err(malformed_error!(
                "Invalid type character '{}' in '{}'",
                c,
                descriptor
            )),
        },
        None => Err(malformed_error!("Truncated descriptor '{}'", descriptor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_parameters() {
        let descriptor =
            MethodDescriptor::parse("(IZLjava/lang/String;)Ljava/lang/Object;").unwrap();

        assert_eq!(
            descriptor.parameters,
            vec![
                FieldType::Base(BaseType::Int),
                FieldType::Base(BaseType::Boolean),
                FieldType::Object("java/lang/String".into()),
            ]
        );
        assert_eq!(
            descriptor.return_type,
            ReturnType::Value(FieldType::Object("java/lang/Object".into()))
        );
    }

    #[test]
    fn wide_parameters_take_two_slots() {
        let descriptor = MethodDescriptor::parse("(JID)V").unwrap();
        assert_eq!(descriptor.parameter_slots(), 5);
        assert_eq!(descriptor.return_type.kind(), None);
    }

    #[test]
    fn source_names() {
        let descriptor =
            MethodDescriptor::parse("([I[[Ljava/lang/String;Lcom/acme/Outer$Inner;C)V").unwrap();
        let names: Vec<String> = descriptor
            .parameters
            .iter()
            .map(FieldType::source_name)
            .collect();
        assert_eq!(
            names,
            ["int[]", "java.lang.String[][]", "com.acme.Outer$Inner", "char"]
        );
    }

    #[test]
    fn class_entry_names() {
        let array = FieldType::parse("[Ljava/lang/String;").unwrap();
        assert_eq!(
            array.class_entry_name().as_deref(),
            Some("[Ljava/lang/String;")
        );
        let object = FieldType::parse("Ljava/util/List;").unwrap();
        assert_eq!(object.class_entry_name().as_deref(), Some("java/util/List"));
        assert_eq!(FieldType::parse("S").unwrap().class_entry_name(), None);
    }

    #[test]
    fn display_round_trips() {
        for text in ["I", "[[J", "Ljava/lang/Object;", "[Lcom/acme/Foo;"] {
            assert_eq!(FieldType::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn malformed_descriptors() {
        for text in ["", "I)V", "(I", "(Ljava/lang/String)V", "(Q)V", "()", "()VV", "(L;)V"] {
            assert!(MethodDescriptor::parse(text).is_err(), "{text}");
        }
    }
}
