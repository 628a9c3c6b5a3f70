//! Field maps: `sourcePath -> targetPath` pairs plus their transforms.

use crate::error::MappingError;
use crate::transform::{TransformRegistry, TransformSet};
use serde_json::Value;

/// Key under which a declarative field map carries its named transforms.
const TRANSFORMS_KEY: &str = "transforms";

/// One mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// Dot-separated path on the internal record.
    pub source: String,
    /// Dot-separated path on the vendor record.
    pub target: String,
}

/// An ordered set of field mappings with their transforms.
///
/// Source paths are unique within one map. Transforms are keyed by the path
/// being written: the target path when mapping forward, the source path when
/// mapping in reverse.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<FieldMapping>,
    transforms: TransformSet,
}

impl FieldMap {
    /// Creates an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a field map from `(source, target)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if a source path appears twice.
    pub fn from_pairs<I, S, T>(pairs: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut map = Self::new();
        for (source, target) in pairs {
            map.insert(source, target)?;
        }
        Ok(map)
    }

    /// Builds a field map from a JSON declaration.
    ///
    /// The declaration is an object of `source: "target"` entries. An optional
    /// `transforms` object maps transform keys to names in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration is not an object, a target is not a
    /// string, or a named transform is unknown.
    pub fn from_value(value: &Value, registry: &TransformRegistry) -> Result<Self, MappingError> {
        let Value::Object(entries) = value else {
            return Err(MappingError::NotAnObject { what: "field map" });
        };

        let mut map = Self::new();
        for (source, target) in entries {
            if source == TRANSFORMS_KEY {
                map.transforms = transforms_from_value(target, registry).map_err(|err| {
                    MappingError::InvalidFieldMap {
                        key: TRANSFORMS_KEY.to_string(),
                        reason: err.to_string(),
                    }
                })?;
                continue;
            }
            let Value::String(target) = target else {
                return Err(MappingError::InvalidFieldMap {
                    key: source.clone(),
                    reason: "target path must be a string".to_string(),
                });
            };
            map.insert(source.clone(), target.clone())?;
        }
        Ok(map)
    }

    /// Adds a mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` is already mapped.
    pub fn insert(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), MappingError> {
        let source = source.into();
        if self.entries.iter().any(|entry| entry.source == source) {
            return Err(MappingError::DuplicateMapping { key: source });
        }
        self.entries.push(FieldMapping {
            source,
            target: target.into(),
        });
        Ok(())
    }

    /// Replaces the map's own transforms.
    #[must_use]
    pub fn with_transforms(mut self, transforms: TransformSet) -> Self {
        self.transforms = transforms;
        self
    }

    /// The mapping entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[FieldMapping] {
        &self.entries
    }

    /// The map's own transforms.
    #[must_use]
    pub fn transforms(&self) -> &TransformSet {
        &self.transforms
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a named-transform object could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransformLookupError {
    NotAnObject,
    NotAName { key: String },
    Unknown { name: String },
}

impl std::fmt::Display for TransformLookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "transforms must be an object of transform names"),
            Self::NotAName { key } => write!(f, "transform for '{key}' must be a transform name"),
            Self::Unknown { name } => write!(f, "unknown transform '{name}'"),
        }
    }
}

/// Resolves a `{ key: "transformName" }` object against a registry.
pub(crate) fn transforms_from_value(
    value: &Value,
    registry: &TransformRegistry,
) -> Result<TransformSet, TransformLookupError> {
    let Value::Object(named) = value else {
        return Err(TransformLookupError::NotAnObject);
    };

    let mut set = TransformSet::new();
    for (key, name) in named {
        let Value::String(name) = name else {
            return Err(TransformLookupError::NotAName { key: key.clone() });
        };
        let transform = registry
            .get(name)
            .ok_or_else(|| TransformLookupError::Unknown { name: name.clone() })?;
        set.insert(key.clone(), transform.clone());
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_pairs_keeps_order() {
        let map = FieldMap::from_pairs([("b", "B"), ("a", "A")]).expect("valid map");
        let sources: Vec<_> = map.entries().iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["b", "a"]);
    }

    #[test]
    fn duplicate_source_rejected() {
        let err = FieldMap::from_pairs([("a", "A"), ("a", "B")]).expect_err("duplicate");
        assert_eq!(
            err,
            MappingError::DuplicateMapping {
                key: "a".to_string()
            }
        );
    }

    #[test]
    fn from_value_resolves_named_transforms() {
        let registry = TransformRegistry::with_builtins();
        let map = FieldMap::from_value(
            &json!({
                "firstName": "FirstName",
                "address.country": "MailingCountry",
                "transforms": {"MailingCountry": "uppercase"}
            }),
            &registry,
        )
        .expect("valid declaration");

        assert_eq!(map.entries().len(), 2);
        assert!(map.transforms().get("MailingCountry").is_some());
    }

    #[test]
    fn from_value_applies_entries_in_declaration_order() {
        use crate::mapper::{Direction, FieldMapper};

        let registry = TransformRegistry::with_builtins();
        let map = FieldMap::from_value(&json!({"z": "meta", "a": "meta.x"}), &registry)
            .expect("valid declaration");
        let sources: Vec<_> = map.entries().iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["z", "a"]);

        let mapped = FieldMapper::map(
            &json!({"z": "S", "a": 1}),
            &map,
            Direction::Forward,
            &TransformSet::new(),
        )
        .expect("mapped");
        assert_eq!(Value::Object(mapped), json!({"meta": {"x": 1}}));
    }

    #[test]
    fn from_value_rejects_non_object() {
        let registry = TransformRegistry::with_builtins();
        let err = FieldMap::from_value(&json!(["a", "b"]), &registry).expect_err("array");
        assert_eq!(err, MappingError::NotAnObject { what: "field map" });
    }

    #[test]
    fn from_value_rejects_non_string_target() {
        let registry = TransformRegistry::with_builtins();
        let err = FieldMap::from_value(&json!({"a": 1}), &registry).expect_err("number");
        assert!(matches!(err, MappingError::InvalidFieldMap { key, .. } if key == "a"));
    }

    #[test]
    fn from_value_rejects_unknown_transform() {
        let registry = TransformRegistry::with_builtins();
        let err = FieldMap::from_value(
            &json!({"a": "A", "transforms": {"A": "rot13"}}),
            &registry,
        )
        .expect_err("unknown transform");
        assert!(err.to_string().contains("rot13"));
    }
}
