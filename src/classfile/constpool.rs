//! The class file constant pool.
//!
//! The pool is parsed into a [`ConstantPool`] that keeps every entry in its original order so the
//! class can be written back with all existing indices intact. The weaver only ever *appends*
//! entries; each `add_*` method first looks for an identical existing entry and reuses it.
//!
//! `CONSTANT_Long` and `CONSTANT_Double` take two pool slots. The second slot is represented by
//! [`ConstantPoolEntry::Unusable`], as is slot zero.

use std::collections::HashMap;

use strum::{Display, FromRepr};

use crate::{
    classfile::mutf8,
    file::{io::push_be, parser::Parser},
    Result,
};

/// Tag byte of a constant pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    FieldRef = 9,
    MethodRef = 10,
    InterfaceMethodRef = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// One constant pool entry.
///
/// Floating point constants keep their raw bits so that NaN payloads survive a round trip and
/// entries can be hashed for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantPoolEntry {
    /// Slot 0, and the second slot of a `Long` or `Double`
    Unusable,
    /// Modified UTF-8 bytes, kept undecoded
    Utf8(Vec<u8>),
    /// `int` constant
    Integer(i32),
    /// `float` constant, as raw bits
    Float(u32),
    /// `long` constant
    Long(i64),
    /// `double` constant, as raw bits
    Double(u64),
    /// Class or array type reference
    Class {
        /// Index of the internal name
        name_index: u16,
    },
    /// String literal
    String {
        /// Index of the literal's `Utf8`
        string_index: u16,
    },
    /// Field reference
    FieldRef {
        /// Owning class
        class_index: u16,
        /// Name and descriptor
        name_and_type_index: u16,
    },
    /// Class method reference
    MethodRef {
        /// Owning class
        class_index: u16,
        /// Name and descriptor
        name_and_type_index: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Owning interface
        class_index: u16,
        /// Name and descriptor
        name_and_type_index: u16,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Index of the name
        name_index: u16,
        /// Index of the descriptor
        descriptor_index: u16,
    },
    /// Method handle
    MethodHandle {
        /// Kind of the handle (1..=9)
        reference_kind: u8,
        /// Referenced member
        reference_index: u16,
    },
    /// Method type
    MethodType {
        /// Index of the method descriptor
        descriptor_index: u16,
    },
    /// Dynamically computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method_attr_index: u16,
        /// Name and descriptor
        name_and_type_index: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method_attr_index: u16,
        /// Name and descriptor
        name_and_type_index: u16,
    },
    /// Module name
    Module {
        /// Index of the name
        name_index: u16,
    },
    /// Package name
    Package {
        /// Index of the name
        name_index: u16,
    },
}

impl ConstantPoolEntry {
    /// Whether this entry occupies two slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    fn parse(parser: &mut Parser) -> Result<Self> {
        let tag_byte = parser.read_be::<u8>()?;
        let Some(tag) = ConstantTag::from_repr(tag_byte) else {
            return Err(malformed_error!("Invalid constant pool tag - {}", tag_byte));
        };

        Ok(match tag {
            ConstantTag::Utf8 => ConstantPoolEntry::Utf8(parser.read_prefixed_bytes()?.to_vec()),
            ConstantTag::Integer => ConstantPoolEntry::Integer(parser.read_be()?),
            ConstantTag::Float => ConstantPoolEntry::Float(parser.read_be()?),
            ConstantTag::Long => ConstantPoolEntry::Long(parser.read_be()?),
            ConstantTag::Double => ConstantPoolEntry::Double(parser.read_be()?),
            ConstantTag::Class => ConstantPoolEntry::Class {
                name_index: parser.read_be()?,
            },
            ConstantTag::String => ConstantPoolEntry::String {
                string_index: parser.read_be()?,
            },
            ConstantTag::FieldRef => ConstantPoolEntry::FieldRef {
                class_index: parser.read_be()?,
                name_and_type_index: parser.read_be()?,
            },
            ConstantTag::MethodRef => ConstantPoolEntry::MethodRef {
                class_index: parser.read_be()?,
                name_and_type_index: parser.read_be()?,
            },
            ConstantTag::InterfaceMethodRef => ConstantPoolEntry::InterfaceMethodRef {
                class_index: parser.read_be()?,
                name_and_type_index: parser.read_be()?,
            },
            ConstantTag::NameAndType => ConstantPoolEntry::NameAndType {
                name_index: parser.read_be()?,
                descriptor_index: parser.read_be()?,
            },
            ConstantTag::MethodHandle => ConstantPoolEntry::MethodHandle {
                reference_kind: parser.read_be()?,
                reference_index: parser.read_be()?,
            },
            ConstantTag::MethodType => ConstantPoolEntry::MethodType {
                descriptor_index: parser.read_be()?,
            },
            ConstantTag::Dynamic => ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index: parser.read_be()?,
                name_and_type_index: parser.read_be()?,
            },
            ConstantTag::InvokeDynamic => ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index: parser.read_be()?,
                name_and_type_index: parser.read_be()?,
            },
            ConstantTag::Module => ConstantPoolEntry::Module {
                name_index: parser.read_be()?,
            },
            ConstantTag::Package => ConstantPoolEntry::Package {
                name_index: parser.read_be()?,
            },
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            ConstantPoolEntry::Unusable => {}
            ConstantPoolEntry::Utf8(bytes) => {
                let length = u16::try_from(bytes.len())
                    .map_err(|_| malformed_error!("Utf8 constant exceeds 65535 bytes"))?;
                push_be(out, ConstantTag::Utf8 as u8);
                push_be(out, length);
                out.extend_from_slice(bytes);
            }
            ConstantPoolEntry::Integer(value) => {
                push_be(out, ConstantTag::Integer as u8);
                push_be(out, *value);
            }
            ConstantPoolEntry::Float(bits) => {
                push_be(out, ConstantTag::Float as u8);
                push_be(out, *bits);
            }
            ConstantPoolEntry::Long(value) => {
                push_be(out, ConstantTag::Long as u8);
                push_be(out, *value);
            }
            ConstantPoolEntry::Double(bits) => {
                push_be(out, ConstantTag::Double as u8);
                push_be(out, *bits);
            }
            ConstantPoolEntry::Class { name_index } => {
                push_be(out, ConstantTag::Class as u8);
                push_be(out, *name_index);
            }
            ConstantPoolEntry::String { string_index } => {
                push_be(out, ConstantTag::String as u8);
                push_be(out, *string_index);
            }
            ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                push_be(out, ConstantTag::FieldRef as u8);
                push_be(out, *class_index);
                push_be(out, *name_and_type_index);
            }
            ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            } => {
                push_be(out, ConstantTag::MethodRef as u8);
                push_be(out, *class_index);
                push_be(out, *name_and_type_index);
            }
            ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                push_be(out, ConstantTag::InterfaceMethodRef as u8);
                push_be(out, *class_index);
                push_be(out, *name_and_type_index);
            }
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => {
                push_be(out, ConstantTag::NameAndType as u8);
                push_be(out, *name_index);
                push_be(out, *descriptor_index);
            }
            ConstantPoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                push_be(out, ConstantTag::MethodHandle as u8);
                push_be(out, *reference_kind);
                push_be(out, *reference_index);
            }
            ConstantPoolEntry::MethodType { descriptor_index } => {
                push_be(out, ConstantTag::MethodType as u8);
                push_be(out, *descriptor_index);
            }
            ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                push_be(out, ConstantTag::Dynamic as u8);
                push_be(out, *bootstrap_method_attr_index);
                push_be(out, *name_and_type_index);
            }
            ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                push_be(out, ConstantTag::InvokeDynamic as u8);
                push_be(out, *bootstrap_method_attr_index);
                push_be(out, *name_and_type_index);
            }
            ConstantPoolEntry::Module { name_index } => {
                push_be(out, ConstantTag::Module as u8);
                push_be(out, *name_index);
            }
            ConstantPoolEntry::Package { name_index } => {
                push_be(out, ConstantTag::Package as u8);
                push_be(out, *name_index);
            }
        }
        Ok(())
    }
}

/// The constant pool of one class file.
///
/// # Examples
///
/// ```rust
/// use classweave::classfile::ConstantPool;
///
/// let mut pool = ConstantPool::new();
/// let valueof = pool.add_method_ref("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;")?;
///
/// // Identical requests resolve to the same entry
/// assert_eq!(pool.add_method_ref("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;")?, valueof);
/// let integer = pool.add_class("java/lang/Integer")?;
/// assert_eq!(pool.class_name(integer)?, "java/lang/Integer");
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
    lookup: HashMap<ConstantPoolEntry, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool holding only the reserved slot zero.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![ConstantPoolEntry::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Parse `constant_pool_count` followed by the entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on an unknown tag or a count of zero, and
    /// [`crate::Error::OutOfBounds`] on truncated input.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count must be at least 1"));
        }

        let mut pool = ConstantPool::new();
        pool.entries.reserve(count as usize);
        while pool.entries.len() < count as usize {
            let entry = ConstantPoolEntry::parse(parser)?;
            let wide = entry.is_wide();
            pool.push_indexed(entry);
            if wide {
                pool.entries.push(ConstantPoolEntry::Unusable);
            }
        }

        if pool.entries.len() != count as usize {
            return Err(malformed_error!(
                "Wide constant overruns the constant pool count {}",
                count
            ));
        }

        Ok(pool)
    }

    /// Serialize the count and every entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool outgrew the format's 65535 slot limit.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        push_be(out, self.count()?);
        for entry in &self.entries {
            entry.write(out)?;
        }
        Ok(())
    }

    /// The `constant_pool_count` value, one more than the highest valid index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool has more than 65535 slots.
    pub fn count(&self) -> Result<u16> {
        u16::try_from(self.entries.len())
            .map_err(|_| malformed_error!("Constant pool exceeds 65535 entries"))
    }

    /// Number of slots including slot zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool holds nothing but slot zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterate `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, ConstantPoolEntry::Unusable))
            .filter_map(|(index, entry)| u16::try_from(index).ok().map(|index| (index, entry)))
    }

    /// Get the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is zero, out of range or the second
    /// slot of a wide constant.
    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry> {
        match self.entries.get(index as usize) {
            Some(ConstantPoolEntry::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index - {}",
                index
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Decode the `Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing, not `Utf8` or badly encoded.
    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(bytes) => mutf8::decode(bytes),
            other => Err(malformed_error!(
                "Expected Utf8 at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Internal name referenced by the `Class` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `Class`.
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(malformed_error!(
                "Expected Class at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolve a `Methodref`/`InterfaceMethodref`/`Fieldref` into `(owner, name, descriptor)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<(String, String, String)> {
        let (class_index, name_and_type_index) = match self.get(index)? {
            ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at constant pool index {}, found {:?}",
                    index,
                    other
                ))
            }
        };

        let ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        } = self.get(name_and_type_index)?
        else {
            return Err(malformed_error!(
                "Expected NameAndType at constant pool index {}",
                name_and_type_index
            ));
        };

        Ok((
            self.class_name(class_index)?,
            self.utf8(*name_index)?,
            self.utf8(*descriptor_index)?,
        ))
    }

    /// Append `entry` unless an identical one exists, returning its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool would exceed 65535 slots.
    pub fn add(&mut self, entry: ConstantPoolEntry) -> Result<u16> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }

        let needed = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            return Err(malformed_error!("Constant pool exceeds 65535 entries"));
        }

        let wide = entry.is_wide();
        let index = self.push_indexed(entry);
        if wide {
            self.entries.push(ConstantPoolEntry::Unusable);
        }
        Ok(index)
    }

    /// Add (or find) a `Utf8` entry.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.add(ConstantPoolEntry::Utf8(mutf8::encode(value)))
    }

    /// Add (or find) a `Class` entry for an internal name or array descriptor.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.add_utf8(internal_name)?;
        self.add(ConstantPoolEntry::Class { name_index })
    }

    /// Add (or find) a `String` literal.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.add(ConstantPoolEntry::String { string_index })
    }

    /// Add (or find) an `Integer` constant.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add(ConstantPoolEntry::Integer(value))
    }

    /// Add (or find) a `NameAndType` entry.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Add (or find) a class `Methodref`.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(ConstantPoolEntry::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Add (or find) a `Fieldref`.
    ///
    /// # Errors
    /// See [`ConstantPool::add`].
    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(ConstantPoolEntry::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    fn push_indexed(&mut self, entry: ConstantPoolEntry) -> u16 {
        // Callers bound the pool size before pushing
        #[allow(clippy::cast_possible_truncation)]
        let index = self.entries.len() as u16;
        self.lookup.entry(entry.clone()).or_insert(index);
        self.entries.push(entry);
        index
    }
}
