//! The listener resolver boundary.
//!
//! The weaver asks a [`ListenerResolver`] whether a method is monitored. It calls the resolver
//! at most once per eligible method, passing the method's monitoring label and the class bytes
//! as they were before weaving, and only looks at whether the answer is `Some`.
//!
//! Any `Fn(&str, &[u8]) -> Option<T>` closure is a resolver. [`ListenerRegistry`] is a ready-made
//! implementation backed by concurrent maps, suitable for sharing across weaving threads while
//! listeners are still being registered.

use std::sync::Arc;

use dashmap::DashMap;

/// Decides which methods are monitored.
pub trait ListenerResolver {
    /// Opaque token returned for monitored methods
    type Listeners;

    /// Resolve the listeners for `label`, or `None` if the method is not monitored.
    ///
    /// `original` holds the complete class bytes before any weaving.
    fn resolve(&self, label: &str, original: &[u8]) -> Option<Self::Listeners>;
}

impl<F, T> ListenerResolver for F
where
    F: Fn(&str, &[u8]) -> Option<T>,
{
    type Listeners = T;

    fn resolve(&self, label: &str, original: &[u8]) -> Option<T> {
        self(label, original)
    }
}

/// An immutable, cheaply cloned set of listener names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSet(Arc<[String]>);

impl Default for ListenerSet {
    fn default() -> Self {
        ListenerSet(Arc::from(Vec::new()))
    }
}

impl ListenerSet {
    /// Create a set from listener names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ListenerSet(names.into_iter().map(Into::into).collect())
    }

    /// The listener names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set holds no listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Thread-safe registry mapping labels or whole classes to listeners.
///
/// An exact label registration takes precedence over a registration for the label's class.
/// Class names use the dotted form that appears in labels (`com.acme.Foo$Bar`).
///
/// # Thread Safety
///
/// All methods take `&self`; the registry can be shared by concurrent weaving passes (e.g.
/// through [`crate::weaver::weave_all`]) and updated while they run.
///
/// # Examples
///
/// ```rust
/// use classweave::weaver::{ListenerRegistry, ListenerResolver, ListenerSet};
///
/// let registry = ListenerRegistry::new();
/// registry.register_class("com.acme.Service", ListenerSet::new(["timing"]));
/// registry.register_method("com.acme.Repo.find(long)", ListenerSet::new(["timing", "sql"]));
///
/// assert!(registry.resolve("com.acme.Service.run()", &[]).is_some());
/// assert_eq!(registry.resolve("com.acme.Repo.find(long)", &[]).unwrap().len(), 2);
/// assert!(registry.resolve("com.acme.Repo.save(java.lang.Object)", &[]).is_none());
/// ```
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    by_method: DashMap<String, ListenerSet>,
    by_class: DashMap<String, ListenerSet>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor the method with this exact label, replacing any previous registration.
    pub fn register_method(&self, label: &str, listeners: ListenerSet) {
        self.by_method.insert(label.to_string(), listeners);
    }

    /// Monitor every method of a class, replacing any previous registration.
    pub fn register_class(&self, class_name: &str, listeners: ListenerSet) {
        self.by_class.insert(class_name.to_string(), listeners);
    }

    /// Remove a method registration, returning its listeners.
    pub fn unregister_method(&self, label: &str) -> Option<ListenerSet> {
        self.by_method.remove(label).map(|(_, listeners)| listeners)
    }

    /// Remove a class registration, returning its listeners.
    pub fn unregister_class(&self, class_name: &str) -> Option<ListenerSet> {
        self.by_class
            .remove(class_name)
            .map(|(_, listeners)| listeners)
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_method.len() + self.by_class.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.by_class.is_empty()
    }
}

impl ListenerResolver for ListenerRegistry {
    type Listeners = ListenerSet;

    fn resolve(&self, label: &str, _original: &[u8]) -> Option<ListenerSet> {
        if let Some(listeners) = self.by_method.get(label) {
            return Some(listeners.clone());
        }

        let head = label.split_once('(').map_or(label, |(head, _)| head);
        let (class_name, _) = head.rsplit_once('.')?;
        self.by_class
            .get(class_name)
            .map(|listeners| listeners.clone())
    }
}
