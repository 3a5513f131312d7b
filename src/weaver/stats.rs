//! Weaving counters.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free counters shared by any number of weaving passes.
///
/// Pass one to [`crate::ClassWeaver::with_stats`] or [`crate::weaver::weave_all`]; each pass
/// adds its outcome when it finishes.
#[derive(Debug, Default)]
pub struct WeaveStats {
    classes: AtomicUsize,
    classes_woven: AtomicUsize,
    classes_failed: AtomicUsize,
    methods_woven: AtomicUsize,
    methods_declined: AtomicUsize,
    methods_ineligible: AtomicUsize,
}

/// A point-in-time copy of [`WeaveStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Classes processed
    pub classes: usize,
    /// Classes with at least one woven method
    pub classes_woven: usize,
    /// Classes whose pass failed
    pub classes_failed: usize,
    /// Methods woven
    pub methods_woven: usize,
    /// Eligible methods the resolver declined
    pub methods_declined: usize,
    /// Constructors, static initializers, abstract and native methods
    pub methods_ineligible: usize,
}

impl WeaveStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_class(&self, woven: usize, declined: usize, ineligible: usize) {
        self.classes.fetch_add(1, Ordering::Relaxed);
        if woven > 0 {
            self.classes_woven.fetch_add(1, Ordering::Relaxed);
        }
        self.methods_woven.fetch_add(woven, Ordering::Relaxed);
        self.methods_declined.fetch_add(declined, Ordering::Relaxed);
        self.methods_ineligible.fetch_add(ineligible, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.classes.fetch_add(1, Ordering::Relaxed);
        self.classes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            classes: self.classes.load(Ordering::Relaxed),
            classes_woven: self.classes_woven.load(Ordering::Relaxed),
            classes_failed: self.classes_failed.load(Ordering::Relaxed),
            methods_woven: self.methods_woven.load(Ordering::Relaxed),
            methods_declined: self.methods_declined.load(Ordering::Relaxed),
            methods_ineligible: self.methods_ineligible.load(Ordering::Relaxed),
        }
    }
}
