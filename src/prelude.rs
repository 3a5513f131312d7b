//! # classweave Prelude
//!
//! The types needed to weave classes, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

// ================================================================================================
// Weaving
// ================================================================================================

/// Per-class weaver and its batch counterpart
pub use crate::weaver::{weave_all, ClassWeaver, WovenClass};

/// Hook configuration
pub use crate::weaver::WeaveConfig;

/// Method selection
pub use crate::weaver::{ListenerRegistry, ListenerResolver, ListenerSet};

/// Pass outcomes
pub use crate::weaver::{MethodReport, MonitoringLabel, StatsSnapshot, WeaveDecision, WeaveStats};

// ================================================================================================
// Class File Model
// ================================================================================================

/// Parsed class files and method descriptors
pub use crate::classfile::{ClassFile, MethodDescriptor};
