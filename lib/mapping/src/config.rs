//! Integration configuration.
//!
//! An integration binds one internal object to one vendor object: the field
//! map between them, the transforms to apply, and the lifecycle events that
//! trigger synchronization. Configs are built once at startup and never
//! mutated afterwards.

use crate::error::ConfigError;
use crate::field_map::{FieldMap, TransformLookupError, transforms_from_value};
use crate::transform::{TransformRegistry, TransformSet};
use crate::validator::ConfigValidator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Lifecycle events that can trigger synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// A record was created.
    AfterCreate,
    /// A record was updated.
    AfterUpdate,
    /// A record was deleted.
    AfterDelete,
}

impl LifecycleEvent {
    /// All lifecycle events.
    pub const ALL: [Self; 3] = [Self::AfterCreate, Self::AfterUpdate, Self::AfterDelete];

    /// The wire name of the event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AfterCreate => "afterCreate",
            Self::AfterUpdate => "afterUpdate",
            Self::AfterDelete => "afterDelete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownEvent {
                name: s.to_string(),
            })
    }
}

/// One event an integration reacts to.
#[derive(Debug, Clone)]
pub struct EventBinding {
    /// Which lifecycle event.
    pub name: LifecycleEvent,
    /// Named handler to invoke; the gateway's default handler when absent.
    pub handler: Option<String>,
    /// Forward transforms for this event. Replaces the config's global
    /// transforms when non-empty.
    pub transforms: TransformSet,
    /// Reverse transforms for this event. Replaces the config's global after
    /// transforms when non-empty.
    pub after_transforms: TransformSet,
}

impl EventBinding {
    /// Creates a binding with no handler override and no transforms.
    #[must_use]
    pub fn new(name: LifecycleEvent) -> Self {
        Self {
            name,
            handler: None,
            transforms: TransformSet::new(),
            after_transforms: TransformSet::new(),
        }
    }

    /// Sets the named handler.
    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Sets the forward transforms.
    #[must_use]
    pub fn with_transforms(mut self, transforms: TransformSet) -> Self {
        self.transforms = transforms;
        self
    }

    /// Sets the reverse transforms.
    #[must_use]
    pub fn with_after_transforms(mut self, transforms: TransformSet) -> Self {
        self.after_transforms = transforms;
        self
    }
}

/// Configuration of one integration.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    /// Internal object name.
    pub source: String,
    /// Vendor object name.
    pub target: String,
    /// Inactive configs are skipped at registration.
    pub active: bool,
    /// Field map between the two records.
    pub map: FieldMap,
    /// Forward transforms used when an event declares none.
    pub global_transforms: TransformSet,
    /// Reverse transforms used when an event declares none.
    pub global_after_transforms: TransformSet,
    /// Events that trigger synchronization.
    pub events: Vec<EventBinding>,
    /// Vendor object type to write to; defaults to the registered object name.
    pub map_to_object: Option<String>,
    /// Extra forward transforms layered over the map's own.
    pub additional_transforms: Option<TransformSet>,
}

impl IntegrationConfig {
    /// Creates an active config with no events.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, map: FieldMap) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            active: true,
            map,
            global_transforms: TransformSet::new(),
            global_after_transforms: TransformSet::new(),
            events: Vec::new(),
            map_to_object: None,
            additional_transforms: None,
        }
    }

    /// Adds an event binding.
    #[must_use]
    pub fn with_event(mut self, binding: EventBinding) -> Self {
        self.events.push(binding);
        self
    }

    /// Sets the global forward transforms.
    #[must_use]
    pub fn with_global_transforms(mut self, transforms: TransformSet) -> Self {
        self.global_transforms = transforms;
        self
    }

    /// Sets the global reverse transforms.
    #[must_use]
    pub fn with_global_after_transforms(mut self, transforms: TransformSet) -> Self {
        self.global_after_transforms = transforms;
        self
    }

    /// Sets the vendor object type.
    #[must_use]
    pub fn with_map_to_object(mut self, object: impl Into<String>) -> Self {
        self.map_to_object = Some(object.into());
        self
    }

    /// Sets the additional forward transforms.
    #[must_use]
    pub fn with_additional_transforms(mut self, transforms: TransformSet) -> Self {
        self.additional_transforms = Some(transforms);
        self
    }

    /// Marks the config inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns the binding for `event`, if declared.
    #[must_use]
    pub fn binding(&self, event: LifecycleEvent) -> Option<&EventBinding> {
        self.events.iter().find(|binding| binding.name == event)
    }

    /// Builds a config from a JSON declaration.
    ///
    /// The declaration is validated first; named transforms are resolved
    /// through `registry`.
    ///
    /// ```json
    /// {
    ///   "source": "contact",
    ///   "target": "Contact",
    ///   "map": { "firstName": "FirstName", "transforms": { "FirstName": "trim" } },
    ///   "globalTransforms": { "MailingCountry": "uppercase" },
    ///   "events": [{ "name": "afterCreate", "handler": "salesforce" }]
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration violates the schema or names an
    /// unknown transform.
    pub fn from_declaration(value: &Value, registry: &TransformRegistry) -> Result<Self, ConfigError> {
        ConfigValidator::validate_declaration(value)?;
        let Value::Object(decl) = value else {
            return Err(ConfigError::InvalidType {
                field: "config".to_string(),
                expected: "an object",
            });
        };

        let map = FieldMap::from_value(decl.get("map").unwrap_or(&Value::Null), registry)?;
        let mut config = Self::new(string_field(decl, "source"), string_field(decl, "target"), map);
        config.active = decl.get("active").and_then(Value::as_bool).unwrap_or(true);
        config.global_transforms = named_transforms(decl, "globalTransforms", registry)?;
        config.global_after_transforms = named_transforms(decl, "globalAfterTransforms", registry)?;
        config.map_to_object = decl
            .get("mapToObject")
            .and_then(Value::as_str)
            .map(str::to_string);
        if decl.contains_key("additionalTransforms") {
            config.additional_transforms =
                Some(named_transforms(decl, "additionalTransforms", registry)?);
        }

        for (name, event) in event_entries(decl.get("events").unwrap_or(&Value::Null)) {
            let mut binding = EventBinding::new(name.parse()?);
            if let Value::Object(event) = event {
                binding.handler = event
                    .get("handler")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                binding.transforms = named_transforms(event, "transforms", registry)?;
                binding.after_transforms = named_transforms(event, "afterTransforms", registry)?;
            }
            config.events.push(binding);
        }

        Ok(config)
    }
}

fn string_field(decl: &Map<String, Value>, field: &str) -> String {
    decl.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn named_transforms(
    decl: &Map<String, Value>,
    field: &str,
    registry: &TransformRegistry,
) -> Result<TransformSet, ConfigError> {
    match decl.get(field) {
        None | Some(Value::Null) => Ok(TransformSet::new()),
        Some(value) => transforms_from_value(value, registry).map_err(|err| match err {
            TransformLookupError::Unknown { name } => ConfigError::UnknownTransform { name },
            TransformLookupError::NotAnObject | TransformLookupError::NotAName { .. } => {
                ConfigError::InvalidType {
                    field: field.to_string(),
                    expected: "an object of transform names",
                }
            }
        }),
    }
}

/// Yields `(event name, event declaration)` pairs from either the array form
/// (`[{"name": "afterCreate"}]`) or the object form (`{"afterCreate": {}}`).
pub(crate) fn event_entries(events: &Value) -> Vec<(&str, &Value)> {
    match events {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                (name, item)
            })
            .collect(),
        Value::Object(items) => items.iter().map(|(name, item)| (name.as_str(), item)).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_event_parses_wire_names() {
        assert_eq!(
            "afterUpdate".parse::<LifecycleEvent>().expect("known"),
            LifecycleEvent::AfterUpdate
        );
        assert!("beforeCreate".parse::<LifecycleEvent>().is_err());
    }

    #[test]
    fn lifecycle_event_serde_uses_camel_case() {
        let json = serde_json::to_string(&LifecycleEvent::AfterDelete).expect("serialize");
        assert_eq!(json, "\"afterDelete\"");
    }

    #[test]
    fn from_declaration_builds_full_config() {
        let registry = TransformRegistry::with_builtins();
        let config = IntegrationConfig::from_declaration(
            &json!({
                "source": "contact",
                "target": "Contact",
                "map": {"firstName": "FirstName", "address.country": "MailingCountry"},
                "globalTransforms": {"MailingCountry": "uppercase"},
                "globalAfterTransforms": {"address.country": "lowercase"},
                "mapToObject": "Contact",
                "events": [
                    {"name": "afterCreate", "handler": "salesforce"},
                    {"name": "afterUpdate", "transforms": {"FirstName": "trim"}}
                ]
            }),
            &registry,
        )
        .expect("valid declaration");

        assert!(config.active);
        assert_eq!(config.source, "contact");
        assert_eq!(config.map.entries().len(), 2);
        assert_eq!(config.events.len(), 2);
        assert_eq!(config.events[0].handler.as_deref(), Some("salesforce"));
        assert_eq!(config.events[1].transforms.len(), 1);
        assert_eq!(config.map_to_object.as_deref(), Some("Contact"));
        assert!(config.additional_transforms.is_none());
    }

    #[test]
    fn from_declaration_accepts_object_form_events() {
        let registry = TransformRegistry::with_builtins();
        let config = IntegrationConfig::from_declaration(
            &json!({
                "source": "deal",
                "target": "deals",
                "active": false,
                "map": {"amount": "amount"},
                "events": {"afterDelete": {}}
            }),
            &registry,
        )
        .expect("valid declaration");

        assert!(!config.active);
        assert!(config.binding(LifecycleEvent::AfterDelete).is_some());
    }

    #[test]
    fn from_declaration_rejects_unknown_transform_name() {
        let registry = TransformRegistry::with_builtins();
        let err = IntegrationConfig::from_declaration(
            &json!({
                "source": "contact",
                "target": "Contact",
                "map": {"a": "A"},
                "globalTransforms": {"A": "reverse"},
                "events": [{"name": "afterCreate"}]
            }),
            &registry,
        )
        .expect_err("unknown transform");

        assert_eq!(
            err,
            ConfigError::UnknownTransform {
                name: "reverse".to_string()
            }
        );
    }
}
