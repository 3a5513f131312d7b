//! Class file structure.
//!
//! [`ClassFile`] is a lossless model of a compiled class: the constant pool is decoded entry by
//! entry, members and attributes are kept with raw payloads, and [`ClassFile::to_bytes`] writes
//! back exactly what was parsed. Only the pieces the weaver needs are decoded further:
//!
//! - [`MethodDescriptor`] for parameter and return types
//! - [`CodeAttribute`] and its offset tables for method bodies
//! - [`StackMapFrame`] for the verifier's type frames
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::classfile::ClassFile;
//!
//! let bytes = std::fs::read("Sample.class")?;
//! let class = ClassFile::parse(&bytes)?;
//!
//! println!("{} (version {})", class.this_class_name()?, class.major_version);
//! for method in &class.methods {
//!     let name = class.constant_pool.utf8(method.name_index)?;
//!     let descriptor = class.constant_pool.utf8(method.descriptor_index)?;
//!     println!("  {name}{descriptor}");
//! }
//! assert_eq!(class.to_bytes()?, bytes);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod access;
pub mod attribute;
pub mod code;
pub mod constpool;
pub mod descriptor;
pub mod mutf8;
pub mod stackmap;

pub use access::{ClassAccessFlags, MethodAccessFlags};
pub use attribute::{Attribute, MemberInfo};
pub use code::{CodeAttribute, ExceptionTableEntry, LineNumberEntry, LocalVariableEntry};
pub use constpool::{ConstantPool, ConstantPoolEntry, ConstantTag};
pub use descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType, ValueKind};
pub use stackmap::{StackMapFrame, VerificationType};

use std::path::Path;

use crate::{
    file::{io::push_be, parser::Parser},
    Error, Result,
};

/// Magic number identifying a class file.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// First major version whose verifier requires `StackMapTable` frames.
pub const STACK_MAP_MIN_VERSION: u16 = 50;

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor format version
    pub minor_version: u16,
    /// Major format version
    pub major_version: u16,
    /// The constant pool
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access_flags: ClassAccessFlags,
    /// `Class` index of this class
    pub this_class: u16,
    /// `Class` index of the superclass, 0 for `java/lang/Object`
    pub super_class: u16,
    /// `Class` indices of the direct superinterfaces
    pub interfaces: Vec<u16>,
    /// Declared fields
    pub fields: Vec<MemberInfo>,
    /// Declared methods, in declaration order
    pub methods: Vec<MemberInfo>,
    /// Class-level attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Read and parse the class file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise the errors of
    /// [`ClassFile::parse`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Parse a complete class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] if the
    /// magic number is wrong, [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] on
    /// structural damage.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut parser = Parser::new(data);
        if data.len() < 4 || parser.read_be::<u32>()? != MAGIC {
            return Err(Error::NotSupported);
        }

        let minor_version = parser.read_be()?;
        let major_version = parser.read_be()?;
        let constant_pool = ConstantPool::parse(&mut parser)?;
        let access_flags = ClassAccessFlags::from_bits_retain(parser.read_be()?);
        let this_class = parser.read_be()?;
        let super_class = parser.read_be()?;

        let interface_count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(parser.read_be()?);
        }

        let fields = parse_members(&mut parser)?;
        let methods = parse_members(&mut parser)?;
        let attributes = Attribute::parse_list(&mut parser)?;

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class file",
                parser.remaining()
            ));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serialize the class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if any table outgrew its length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        push_be(&mut out, MAGIC);
        push_be(&mut out, self.minor_version);
        push_be(&mut out, self.major_version);
        self.constant_pool.write(&mut out)?;
        push_be(&mut out, self.access_flags.bits());
        push_be(&mut out, self.this_class);
        push_be(&mut out, self.super_class);

        push_be(
            &mut out,
            u16::try_from(self.interfaces.len())
                .map_err(|_| malformed_error!("Too many interfaces"))?,
        );
        for interface in &self.interfaces {
            push_be(&mut out, *interface);
        }

        write_members(&self.fields, &mut out)?;
        write_members(&self.methods, &mut out)?;
        Attribute::write_list(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// Internal name of this class, e.g. `com/acme/Foo$Bar`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `this_class` is not a `Class` entry.
    pub fn this_class_name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Returns `true` if the verifier for this version expects `StackMapTable` frames.
    #[must_use]
    pub fn uses_stack_maps(&self) -> bool {
        self.major_version >= STACK_MAP_MIN_VERSION
    }
}

fn parse_members(parser: &mut Parser) -> Result<Vec<MemberInfo>> {
    let count = parser.read_be::<u16>()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(MemberInfo::parse(parser)?);
    }
    Ok(members)
}

fn write_members(members: &[MemberInfo], out: &mut Vec<u8>) -> Result<()> {
    push_be(
        out,
        u16::try_from(members.len()).map_err(|_| malformed_error!("Too many members"))?,
    );
    for member in members {
        member.write(out)?;
    }
    Ok(())
}
