//! Field transforms.
//!
//! A transform receives the value read from the source side together with the
//! full source record, and returns the value to write. Returning `None` omits
//! the field from the output entirely.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use syncbridge_core::Record;

type TransformFn = dyn Fn(&Value, &Record) -> Option<Value> + Send + Sync;

/// A single field transform.
#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl Transform {
    /// Wraps a closure as a transform.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &Record) -> Option<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Returns the value unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(|value, _| Some(value.clone()))
    }

    /// Builds a transform that only looks at string values; anything else is
    /// passed through untouched.
    pub fn on_str<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(move |value, _| match value {
            Value::String(s) => Some(Value::String(f(s))),
            other => Some(other.clone()),
        })
    }

    /// Applies the transform.
    #[must_use]
    pub fn apply(&self, value: &Value, record: &Record) -> Option<Value> {
        (self.0)(value, record)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

/// Transforms keyed by transform key (the path being written).
#[derive(Debug, Clone, Default)]
pub struct TransformSet {
    transforms: HashMap<String, Transform>,
}

impl TransformSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transform, replacing any existing one under the same key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, transform: Transform) -> Self {
        self.insert(key, transform);
        self
    }

    /// Adds a transform, replacing any existing one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, transform: Transform) {
        self.transforms.insert(key.into(), transform);
    }

    /// Returns the transform for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Transform> {
        self.transforms.get(key)
    }

    /// Returns true if the set holds no transforms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Number of transforms in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Iterates over the transform keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    /// A copy of this set with `overrides` replacing it key by key.
    #[must_use]
    pub fn layered(&self, overrides: &TransformSet) -> Self {
        let mut transforms = self.transforms.clone();
        transforms.extend(
            overrides
                .transforms
                .iter()
                .map(|(key, transform)| (key.clone(), transform.clone())),
        );
        Self { transforms }
    }
}

/// Named transforms available to declarative configs.
///
/// Declarations refer to transforms by name (`"MailingCountry": "uppercase"`);
/// the registry resolves those names to functions at load time.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    named: HashMap<String, Transform>,
}

impl TransformRegistry {
    /// Creates a registry pre-populated with the built-in transforms:
    /// `identity`, `uppercase`, `lowercase`, `trim` and `to_string`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", Transform::identity());
        registry.register("uppercase", Transform::on_str(str::to_uppercase));
        registry.register("lowercase", Transform::on_str(str::to_lowercase));
        registry.register("trim", Transform::on_str(|s| s.trim().to_string()));
        registry.register(
            "to_string",
            Transform::new(|value, _| match value {
                Value::String(_) => Some(value.clone()),
                other => Some(Value::String(other.to_string())),
            }),
        );
        registry
    }

    /// Creates a registry with no transforms.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            named: HashMap::new(),
        }
    }

    /// Registers (or replaces) a named transform.
    pub fn register(&mut self, name: impl Into<String>, transform: Transform) {
        self.named.insert(name.into(), transform);
    }

    /// Looks up a transform by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.named.get(name)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_returns_input() {
        let record = Record::new();
        assert_eq!(
            Transform::identity().apply(&json!({"a": 1}), &record),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn string_transform_ignores_non_strings() {
        let upper = Transform::on_str(str::to_uppercase);
        let record = Record::new();
        assert_eq!(upper.apply(&json!("us"), &record), Some(json!("US")));
        assert_eq!(upper.apply(&json!(42), &record), Some(json!(42)));
    }

    #[test]
    fn transform_sees_full_record() {
        let full_name = Transform::new(|value, record| {
            let last = record.get("lastName")?.as_str()?;
            Some(json!(format!("{} {last}", value.as_str()?)))
        });
        let mut record = Record::new();
        record.insert("lastName".to_string(), json!("Doe"));
        assert_eq!(
            full_name.apply(&json!("John"), &record),
            Some(json!("John Doe"))
        );
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TransformRegistry::with_builtins();
        for name in ["identity", "uppercase", "lowercase", "trim", "to_string"] {
            assert!(registry.get(name).is_some(), "missing builtin {name}");
        }
        let to_string = registry.get("to_string").expect("builtin");
        assert_eq!(to_string.apply(&json!(12), &Record::new()), Some(json!("12")));
    }

    #[test]
    fn transform_set_replaces_by_key() {
        let set = TransformSet::new()
            .with("Name", Transform::identity())
            .with("Name", Transform::on_str(str::to_lowercase));
        assert_eq!(set.len(), 1);
        let applied = set
            .get("Name")
            .expect("present")
            .apply(&json!("ACME"), &Record::new());
        assert_eq!(applied, Some(json!("acme")));
    }

    #[test]
    fn layered_sets_override_key_by_key() {
        let base = TransformSet::new()
            .with("Name", Transform::on_str(str::to_lowercase))
            .with("Email", Transform::identity());
        let layered = base.layered(&TransformSet::new().with("Name", Transform::on_str(str::to_uppercase)));

        assert_eq!(layered.len(), 2);
        let name = layered.get("Name").expect("present");
        assert_eq!(name.apply(&json!("Acme"), &Record::new()), Some(json!("ACME")));
        assert_eq!(base.len(), 2);
    }
}
