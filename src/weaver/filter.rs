//! Method eligibility.

use crate::classfile::MethodAccessFlags;

/// Name of static initializers.
pub const STATIC_INIT: &str = "<clinit>";
/// Name of instance constructors.
pub const CONSTRUCTOR: &str = "<init>";

/// Whether a method may be woven at all.
///
/// Static initializers and constructors are never woven; neither are abstract or native
/// methods, which have no bytecode body. Everything else is a candidate, subject to the
/// listener resolver.
#[must_use]
pub fn is_eligible(flags: MethodAccessFlags, name: &str) -> bool {
    name != STATIC_INIT && name != CONSTRUCTOR && !flags.has_no_body()
}
