//! The `Code` attribute and the offset tables nested in it.
//!
//! [`CodeAttribute`] decodes the fixed layout of a method body: limits, bytecode, exception
//! table and nested attributes. The nested tables whose entries refer to bytecode offsets
//! ([`LineNumberEntry`], [`LocalVariableEntry`]) are decoded on demand so that a rewritten body
//! can move their offsets along with the code.

use crate::{
    classfile::attribute::Attribute,
    file::{io::push_be, parser::Parser},
    Result,
};

/// One row of a method's exception table.
///
/// Handlers are searched in table order; the first entry whose `[start_pc, end_pc)` range covers
/// the faulting instruction and whose `catch_type` matches wins. A `catch_type` of zero catches
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First covered offset
    pub start_pc: u16,
    /// First offset past the covered range
    pub end_pc: u16,
    /// Handler entry point
    pub handler_pc: u16,
    /// `Class` index of the caught type, or 0 for any
    pub catch_type: u16,
}

/// A decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots, parameters and receiver included
    pub max_locals: u16,
    /// The bytecode
    pub code: Vec<u8>,
    /// Exception table in priority order
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Decode the payload of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation, [`crate::Error::Malformed`] on an
    /// empty code array or trailing bytes.
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(info);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()?;
        if code_length == 0 || code_length > u32::from(u16::MAX) {
            return Err(malformed_error!("Invalid code length - {}", code_length));
        }
        let code = parser.read_bytes(code_length as usize)?.to_vec();

        let table_length = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(table_length as usize);
        for _ in 0..table_length {
            exception_table.push(ExceptionTableEntry {
                start_pc: parser.read_be()?,
                end_pc: parser.read_be()?,
                handler_pc: parser.read_be()?,
                catch_type: parser.read_be()?,
            });
        }

        let attributes = Attribute::parse_list(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after Code attribute",
                parser.remaining()
            ));
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Encode the attribute payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code or a table is too large for its length
    /// field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let code_length = u16::try_from(self.code.len())
            .map_err(|_| malformed_error!("Code length {} exceeds 65535", self.code.len()))?;
        let table_length = u16::try_from(self.exception_table.len())
            .map_err(|_| malformed_error!("Exception table exceeds 65535 entries"))?;

        let mut out = Vec::with_capacity(self.code.len() + 32);
        push_be(&mut out, self.max_stack);
        push_be(&mut out, self.max_locals);
        push_be(&mut out, u32::from(code_length));
        out.extend_from_slice(&self.code);
        push_be(&mut out, table_length);
        for entry in &self.exception_table {
            push_be(&mut out, entry.start_pc);
            push_be(&mut out, entry.end_pc);
            push_be(&mut out, entry.handler_pc);
            push_be(&mut out, entry.catch_type);
        }
        Attribute::write_list(&self.attributes, &mut out)?;
        Ok(out)
    }
}

/// One row of a `LineNumberTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    /// First offset of the line
    pub start_pc: u16,
    /// Source line number
    pub line_number: u16,
}

impl LineNumberEntry {
    /// Decode a `LineNumberTable` payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation.
    pub fn parse_table(info: &[u8]) -> Result<Vec<LineNumberEntry>> {
        let mut parser = Parser::new(info);
        let count = parser.read_be::<u16>()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LineNumberEntry {
                start_pc: parser.read_be()?,
                line_number: parser.read_be()?,
            });
        }
        Ok(entries)
    }

    /// Encode a `LineNumberTable` payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than 65535 rows.
    pub fn write_table(entries: &[LineNumberEntry]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(2 + entries.len() * 4);
        push_be(
            &mut out,
            u16::try_from(entries.len())
                .map_err(|_| malformed_error!("LineNumberTable exceeds 65535 entries"))?,
        );
        for entry in entries {
            push_be(&mut out, entry.start_pc);
            push_be(&mut out, entry.line_number);
        }
        Ok(out)
    }
}

/// One row of a `LocalVariableTable` or `LocalVariableTypeTable`.
///
/// Both tables share a layout; the fourth field is a descriptor in the former and a generic
/// signature in the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    /// First offset where the variable has a value
    pub start_pc: u16,
    /// Length of the live range in bytes
    pub length: u16,
    /// Index of the `Utf8` name
    pub name_index: u16,
    /// Index of the `Utf8` descriptor or signature
    pub type_index: u16,
    /// Local variable slot
    pub index: u16,
}

impl LocalVariableEntry {
    /// Decode a `LocalVariableTable` or `LocalVariableTypeTable` payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation.
    pub fn parse_table(info: &[u8]) -> Result<Vec<LocalVariableEntry>> {
        let mut parser = Parser::new(info);
        let count = parser.read_be::<u16>()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LocalVariableEntry {
                start_pc: parser.read_be()?,
                length: parser.read_be()?,
                name_index: parser.read_be()?,
                type_index: parser.read_be()?,
                index: parser.read_be()?,
            });
        }
        Ok(entries)
    }

    /// Encode a `LocalVariableTable` or `LocalVariableTypeTable` payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than 65535 rows.
    pub fn write_table(entries: &[LocalVariableEntry]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(2 + entries.len() * 10);
        push_be(
            &mut out,
            u16::try_from(entries.len())
                .map_err(|_| malformed_error!("LocalVariableTable exceeds 65535 entries"))?,
        );
        for entry in entries {
            push_be(&mut out, entry.start_pc);
            push_be(&mut out, entry.length);
            push_be(&mut out, entry.name_index);
            push_be(&mut out, entry.type_index);
            push_be(&mut out, entry.index);
        }
        Ok(out)
    }
}
