//! Weaving configuration
//!
//! This module names the monitoring context that woven code calls into. The weaver never loads
//! or inspects that class; it only emits references to it, so the names must match whatever
//! runtime the woven classes are deployed with.

/// Default internal name of the monitoring context class.
pub const DEFAULT_CONTEXT_CLASS: &str = "io/classweave/runtime/WeaveContext";

/// Configuration of the hooks injected into woven methods.
///
/// The three hooks are emitted with fixed descriptors:
///
/// | Hook | Invocation | Descriptor |
/// |---|---|---|
/// | `start_method` | `invokestatic` | `(Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)L<context_class>;` |
/// | `stop_method` | `invokevirtual` | `(Ljava/lang/Object;)V` |
/// | `stop_with_exception_method` | `invokevirtual` | `(Ljava/lang/Throwable;)V` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveConfig {
    /// Internal name of the context class, e.g. `com/acme/monitor/Context`
    pub context_class: String,

    /// Static factory called on entry with the receiver (or null), the label and the boxed
    /// arguments; returns the context handle
    pub start_method: String,

    /// Instance method called on the handle for each normal return with the boxed result
    /// (or null for `void`)
    pub stop_method: String,

    /// Instance method called on the handle when an exception escapes the method
    pub stop_with_exception_method: String,

    /// Remap `LineNumberTable`, `LocalVariableTable` and `LocalVariableTypeTable` of woven
    /// methods; when `false` they are dropped instead
    pub keep_debug_tables: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            context_class: DEFAULT_CONTEXT_CLASS.to_string(),
            start_method: "start".to_string(),
            stop_method: "stop".to_string(),
            stop_with_exception_method: "stopWithException".to_string(),
            keep_debug_tables: true,
        }
    }
}

impl WeaveConfig {
    /// Default hook names on a different context class.
    #[must_use]
    pub fn with_context(context_class: &str) -> Self {
        Self {
            context_class: context_class.to_string(),
            ..Self::default()
        }
    }

    /// Default hooks, dropping debug tables from woven methods.
    ///
    /// Produces smaller classes at the cost of line numbers and local variable names in
    /// stack traces and debuggers.
    #[must_use]
    pub fn stripped() -> Self {
        Self {
            keep_debug_tables: false,
            ..Self::default()
        }
    }

    /// Descriptor of the entry hook.
    #[must_use]
    pub fn start_descriptor(&self) -> String {
        format!(
            "(Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)L{};",
            self.context_class
        )
    }

    /// Descriptor of the normal-exit hook.
    #[must_use]
    pub fn stop_descriptor(&self) -> &'static str {
        "(Ljava/lang/Object;)V"
    }

    /// Descriptor of the exceptional-exit hook.
    #[must_use]
    pub fn stop_with_exception_descriptor(&self) -> &'static str {
        "(Ljava/lang/Throwable;)V"
    }
}
