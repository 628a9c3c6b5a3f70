//! Integration config validation and transform resolution.

use crate::config::{IntegrationConfig, LifecycleEvent, event_entries};
use crate::error::ConfigError;
use crate::transform::TransformSet;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Forward and reverse transforms in effect for one event.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTransforms<'a> {
    /// Applied when mapping outbound.
    pub transforms: &'a TransformSet,
    /// Applied when mapping vendor data back.
    pub after_transforms: &'a TransformSet,
}

/// Validates integration configs, typed or declarative.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates one config.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` or `target` is empty, no events are
    /// declared, or two events share a name.
    pub fn validate_config(config: &IntegrationConfig) -> Result<(), ConfigError> {
        require_non_empty("source", &config.source)?;
        require_non_empty("target", &config.target)?;
        if config.events.is_empty() {
            return Err(ConfigError::NoEvents);
        }

        let mut seen = HashSet::new();
        for binding in &config.events {
            if !seen.insert(binding.name) {
                return Err(ConfigError::DuplicateEvent {
                    name: binding.name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validates every config, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] naming the index and source of
    /// the failing config.
    pub fn validate_configs(configs: &[IntegrationConfig]) -> Result<(), ConfigError> {
        for (index, config) in configs.iter().enumerate() {
            Self::validate_config(config).map_err(|reason| ConfigError::InvalidConfig {
                index,
                source_name: config.source.clone(),
                reason: Box::new(reason),
            })?;
        }
        Ok(())
    }

    /// Validates a JSON declaration against the integration schema.
    ///
    /// Required: `source` and `target` (non-empty strings), `map` (object),
    /// `events` (non-empty array of `{name, ...}` or object keyed by event
    /// name). Optional: `active` (bool), `mapToObject` (string), the
    /// transform objects, and per event `handler` (string).
    ///
    /// # Errors
    ///
    /// Returns the first schema violation found.
    pub fn validate_declaration(value: &Value) -> Result<(), ConfigError> {
        let Value::Object(decl) = value else {
            return Err(ConfigError::InvalidType {
                field: "config".to_string(),
                expected: "an object",
            });
        };

        for field in ["source", "target"] {
            match decl.get(field) {
                None | Some(Value::Null) => {
                    return Err(ConfigError::MissingField {
                        field: field.to_string(),
                    });
                }
                Some(Value::String(s)) => require_non_empty(field, s)?,
                Some(_) => return Err(invalid_type(field, "a string")),
            }
        }

        optional_type(decl, "active", "a boolean", Value::is_boolean)?;
        optional_type(decl, "mapToObject", "a string", Value::is_string)?;
        for field in [
            "globalTransforms",
            "globalAfterTransforms",
            "additionalTransforms",
        ] {
            optional_type(decl, field, "an object", Value::is_object)?;
        }

        match decl.get("map") {
            None | Some(Value::Null) => {
                return Err(ConfigError::MissingField {
                    field: "map".to_string(),
                });
            }
            Some(Value::Object(_)) => {}
            Some(_) => return Err(invalid_type("map", "an object")),
        }

        let events = match decl.get("events") {
            None | Some(Value::Null) => return Err(ConfigError::NoEvents),
            Some(events @ (Value::Array(_) | Value::Object(_))) => events,
            Some(_) => return Err(invalid_type("events", "an array or an object")),
        };

        let entries = event_entries(events);
        if entries.is_empty() {
            return Err(ConfigError::NoEvents);
        }

        let mut seen = HashSet::new();
        for (name, event) in entries {
            let event_name: LifecycleEvent = name.parse()?;
            if !seen.insert(event_name) {
                return Err(ConfigError::DuplicateEvent {
                    name: name.to_string(),
                });
            }
            match event {
                Value::Object(event) => {
                    optional_type(event, "handler", "a string", Value::is_string)?;
                    optional_type(event, "transforms", "an object", Value::is_object)?;
                    optional_type(event, "afterTransforms", "an object", Value::is_object)?;
                }
                Value::Null => {}
                _ => return Err(invalid_type("events", "a list of event objects")),
            }
        }
        Ok(())
    }

    /// Validates a list of declarations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] naming the index and source of
    /// the failing declaration.
    pub fn validate_declarations(values: &[Value]) -> Result<(), ConfigError> {
        for (index, value) in values.iter().enumerate() {
            Self::validate_declaration(value).map_err(|reason| ConfigError::InvalidConfig {
                index,
                source_name: value
                    .get("source")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>")
                    .to_string(),
                reason: Box::new(reason),
            })?;
        }
        Ok(())
    }

    /// Resolves the transforms in effect for `event`.
    ///
    /// A non-empty event-level set replaces the config's global set
    /// wholesale; the two are never merged. Forward and reverse sets are
    /// resolved independently.
    #[must_use]
    pub fn resolve_transforms(
        config: &IntegrationConfig,
        event: LifecycleEvent,
    ) -> ResolvedTransforms<'_> {
        let binding = config.binding(event);
        let transforms = binding
            .map(|b| &b.transforms)
            .filter(|set| !set.is_empty())
            .unwrap_or(&config.global_transforms);
        let after_transforms = binding
            .map(|b| &b.after_transforms)
            .filter(|set| !set.is_empty())
            .unwrap_or(&config.global_after_transforms);

        ResolvedTransforms {
            transforms,
            after_transforms,
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn invalid_type(field: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidType {
        field: field.to_string(),
        expected,
    }
}

fn optional_type(
    decl: &Map<String, Value>,
    field: &str,
    expected: &'static str,
    check: fn(&Value) -> bool,
) -> Result<(), ConfigError> {
    match decl.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(value) if check(value) => Ok(()),
        Some(_) => Err(invalid_type(field, expected)),
    }
}
