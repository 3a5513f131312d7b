//! Monitoring labels.
//!
//! A label identifies a method to the listener resolver and, at runtime, to the monitoring
//! context: `fully.qualified.Class.method(type1,type2)`. Parameter types are spelled the way
//! they appear in source code, joined by `,` without spaces.

use std::{collections::HashMap, fmt};

use crate::classfile::{FieldType, MethodDescriptor};

/// A method's monitoring label.
///
/// # Examples
///
/// ```rust
/// use classweave::classfile::MethodDescriptor;
/// use classweave::weaver::MonitoringLabel;
///
/// let descriptor = MethodDescriptor::parse("(I[Ljava/lang/String;J)V")?;
/// let label = MonitoringLabel::new("com/acme/Outer$Inner", "run", &descriptor);
/// assert_eq!(label.as_str(), "com.acme.Outer$Inner.run(int,java.lang.String[],long)");
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitoringLabel(String);

impl MonitoringLabel {
    /// Build the label from the owning class's internal name, the method name and its
    /// descriptor.
    #[must_use]
    pub fn new(class_name: &str, method_name: &str, descriptor: &MethodDescriptor) -> Self {
        let parameters: Vec<String> = descriptor
            .parameters
            .iter()
            .map(FieldType::source_name)
            .collect();

        MonitoringLabel(format!(
            "{}.{}({})",
            class_name.replace('/', "."),
            method_name,
            parameters.join(",")
        ))
    }

    /// The label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dotted class name part of the label.
    #[must_use]
    pub fn class_name(&self) -> &str {
        let head = self.0.split_once('(').map_or(self.0.as_str(), |(head, _)| head);
        head.rsplit_once('.').map_or(head, |(class, _)| class)
    }
}

impl fmt::Display for MonitoringLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MonitoringLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-pass cache of labels keyed by method name and descriptor.
///
/// Overloads with identical descriptors cannot exist in one class, so the key is unique within
/// a pass. The cache is dropped with the pass; nothing is shared between classes.
#[derive(Debug, Default)]
pub struct LabelCache {
    labels: HashMap<(String, String), MonitoringLabel>,
}

impl LabelCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for `method_name` + `raw_descriptor`, computed on first use.
    pub fn get_or_insert(
        &mut self,
        class_name: &str,
        method_name: &str,
        raw_descriptor: &str,
        descriptor: &MethodDescriptor,
    ) -> MonitoringLabel {
        self.labels
            .entry((method_name.to_string(), raw_descriptor.to_string()))
            .or_insert_with(|| MonitoringLabel::new(class_name, method_name, descriptor))
            .clone()
    }

    /// Number of cached labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if nothing was cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(class: &str, method: &str, descriptor: &str) -> MonitoringLabel {
        MonitoringLabel::new(class, method, &MethodDescriptor::parse(descriptor).unwrap())
    }

    #[test]
    fn no_parameters() {
        assert_eq!(
            label("com/acme/Foo", "a", "()V").as_str(),
            "com.acme.Foo.a()"
        );
    }

    #[test]
    fn primitive_object_and_array_parameters() {
        assert_eq!(
            label("com/acme/Foo", "f", "(IZLjava/lang/String;)V").as_str(),
            "com.acme.Foo.f(int,boolean,java.lang.String)"
        );
        assert_eq!(
            label("Foo", "g", "([[D[Ljava/util/List;CSB)Ljava/lang/Object;").as_str(),
            "Foo.g(double[][],java.util.List[],char,short,byte)"
        );
    }

    #[test]
    fn class_name_part() {
        let l = label("com/acme/Foo$Bar", "run", "(Ljava/lang/String;)V");
        assert_eq!(l.class_name(), "com.acme.Foo$Bar");
        assert_eq!(l.to_string(), "com.acme.Foo$Bar.run(java.lang.String)");
    }

    #[test]
    fn cache_is_keyed_by_descriptor() {
        let mut cache = LabelCache::new();
        let int = MethodDescriptor::parse("(I)V").unwrap();
        let long = MethodDescriptor::parse("(J)V").unwrap();

        let first = cache.get_or_insert("Foo", "m", "(I)V", &int);
        let again = cache.get_or_insert("Foo", "m", "(I)V", &int);
        let other = cache.get_or_insert("Foo", "m", "(J)V", &long);

        assert_eq!(first, again);
        assert_eq!(other.as_str(), "Foo.m(long)");
        assert_eq!(cache.len(), 2);
    }
}
