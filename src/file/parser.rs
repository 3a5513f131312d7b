//! Bounds-checked cursor over class file bytes.
//!
//! Every structure in a class file is big-endian and laid out sequentially, so the whole crate
//! reads through one [`Parser`]: the constant pool and member tables through
//! [`Parser::read_be`] and [`Parser::read_prefixed_bytes`], attribute payloads through
//! [`Parser::read_bytes`], and method code through [`Parser::align`] for switch padding.
//!
//! ```rust
//! use classweave::Parser;
//!
//! let header = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&header);
//!
//! let magic = parser.read_be::<u32>()?;
//! let minor = parser.read_be::<u16>()?;
//! let major = parser.read_be::<u16>()?;
//! assert_eq!((magic, minor, major), (0xCAFE_BABE, 0, 52));
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Result,
};

/// Reads big-endian values and borrowed slices, failing with [`crate::Error::OutOfBounds`]
/// instead of panicking on truncated input.
///
/// ```rust
/// use classweave::Parser;
///
/// let utf8_then_byte = [0x00, 0x03, b'a', b'b', b'c', 0x2A];
/// let mut parser = Parser::new(&utf8_then_byte);
///
/// assert_eq!(parser.read_prefixed_bytes()?, b"abc");
/// assert_eq!(parser.read_be::<u8>()?, 0x2A);
/// assert!(!parser.has_more_data());
/// # Ok::<(), classweave::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Start reading at offset 0 of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total input length, independent of the position.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for empty input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Jump to absolute offset `pos`; the end of the input is a valid target.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(out_of_bounds_error!());
        }
        self.position += step;
        Ok(())
    }

    /// Current offset.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Align the position to a specific boundary, relative to the start of the data.
    ///
    /// `tableswitch` and `lookupswitch` pad their operands to a 4-byte boundary measured from
    /// the start of the method's code array; parse code arrays with a parser rooted at offset 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if aligning would exceed the data length.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read one big-endian `T` and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow `length` bytes from the current position and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(out_of_bounds_error!());
        }
        let slice = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }

    /// Borrow a byte string prefixed with its `u16` length (the `CONSTANT_Utf8` layout).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the prefix or the payload is truncated.
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let length = self.read_be::<u16>()?;
        self.read_bytes(length as usize)
    }

    /// Number of bytes left after the current position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }
}
