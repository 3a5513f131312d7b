//! Raw attributes and class members.
//!
//! Attributes are kept as undecoded byte blobs; only the handful the weaver rewrites (`Code`
//! and its nested tables) are ever decoded, and everything else is written back exactly as
//! read.

use crate::{
    classfile::{access::MethodAccessFlags, constpool::ConstantPool},
    file::{io::push_be, parser::Parser},
    Result,
};

/// `Code`
pub const CODE: &str = "Code";
/// `StackMapTable`
pub const STACK_MAP_TABLE: &str = "StackMapTable";
/// `LineNumberTable`
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
/// `LocalVariableTable`
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
/// `LocalVariableTypeTable`
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
/// `RuntimeVisibleTypeAnnotations`
pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
/// `RuntimeInvisibleTypeAnnotations`
pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";

/// An attribute whose payload is kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Index of the `Utf8` name
    pub name_index: u16,
    /// Payload following the length field
    pub info: Vec<u8>,
}

impl Attribute {
    /// Resolve the attribute name through `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is not a `Utf8` entry.
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    /// Parse a `u16` count followed by that many attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if an attribute's length runs past the input.
    pub fn parse_list(parser: &mut Parser) -> Result<Vec<Attribute>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = parser.read_be::<u16>()?;
            let length = parser.read_be::<u32>()?;
            let info = parser.read_bytes(length as usize)?.to_vec();
            attributes.push(Attribute { name_index, info });
        }
        Ok(attributes)
    }

    /// Write a `u16` count followed by every attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than 65535 attributes or a payload
    /// exceeds the `u32` length field.
    pub fn write_list(attributes: &[Attribute], out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(attributes.len())
            .map_err(|_| malformed_error!("Too many attributes - {}", attributes.len()))?;
        push_be(out, count);
        for attribute in attributes {
            let length = u32::try_from(attribute.info.len())
                .map_err(|_| malformed_error!("Attribute payload exceeds u32 range"))?;
            push_be(out, attribute.name_index);
            push_be(out, length);
            out.extend_from_slice(&attribute.info);
        }
        Ok(())
    }
}

/// A field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Raw access flags
    pub access_flags: u16,
    /// Index of the `Utf8` name
    pub name_index: u16,
    /// Index of the `Utf8` descriptor
    pub descriptor_index: u16,
    /// Member attributes
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub(crate) fn parse(parser: &mut Parser) -> Result<Self> {
        Ok(MemberInfo {
            access_flags: parser.read_be()?,
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            attributes: Attribute::parse_list(parser)?,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        push_be(out, self.access_flags);
        push_be(out, self.name_index);
        push_be(out, self.descriptor_index);
        Attribute::write_list(&self.attributes, out)
    }

    /// Interpret the access flags as method flags, keeping unknown bits.
    #[must_use]
    pub fn method_flags(&self) -> MethodAccessFlags {
        MethodAccessFlags::from_bits_retain(self.access_flags)
    }

    /// Position of the first attribute called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an attribute name cannot be resolved.
    pub fn find_attribute(&self, pool: &ConstantPool, name: &str) -> Result<Option<usize>> {
        for (position, attribute) in self.attributes.iter().enumerate() {
            if attribute.name(pool)? == name {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }
}
