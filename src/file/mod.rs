//! Binary input handling for class files.
//!
//! [`io`] holds the endian-aware primitives and [`parser`] the bounds-checked cursor that every
//! other layer of the crate reads through.

pub mod io;
pub mod parser;
