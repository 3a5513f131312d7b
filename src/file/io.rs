//! Big-endian primitives.
//!
//! Every multi-byte quantity in a class file is big-endian. [`ClassIO`] maps the primitive
//! types to their byte arrays; the free functions read, patch and append them with bounds
//! checks. [`crate::file::parser::Parser`] reads through [`read_be_at`], the class file writer
//! and the code encoder write through [`push_be`] and [`write_be_at`].

use crate::{Error::OutOfBounds, Result};

/// A primitive with a fixed-size big-endian encoding.
pub trait ClassIO: Sized {
    /// `[u8; size_of::<Self>()]`
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Encode as big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty),*) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Read a `T` at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes; `offset` is then left
/// unchanged.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let end = offset
        .checked_add(std::mem::size_of::<T>())
        .ok_or(OutOfBounds)?;
    let bytes = data.get(*offset..end).ok_or(OutOfBounds)?;
    let Ok(bytes) = bytes.try_into() else {
        return Err(OutOfBounds);
    };
    *offset = end;
    Ok(T::from_be_bytes(bytes))
}

/// Writes `value` in big-endian byte order at `offset`, advancing the offset.
///
/// Used to patch placeholders (branch offsets, attribute lengths) after the fact.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let end = *offset + bytes.as_ref().len();
    data.get_mut(*offset..end)
        .ok_or(OutOfBounds)?
        .copy_from_slice(bytes.as_ref());
    *offset = end;
    Ok(())
}

/// Appends `value` in big-endian byte order to a growable buffer.
pub fn push_be<T: ClassIO>(data: &mut Vec<u8>, value: T) {
    data.extend_from_slice(value.to_be_bytes().as_ref());
}
