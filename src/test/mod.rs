//! Fixtures and an interpreter for tests that weave real class files.

mod emulator;

pub use builder::*;
pub use emulator::*;
