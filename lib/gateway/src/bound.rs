//! An integration config bound to the object it was registered for.

use serde_json::Value;
use syncbridge_core::Record;
use syncbridge_mapping::{
    ConfigValidator, Direction, FieldMapper, IntegrationConfig, LifecycleEvent, MappingError,
    TransformSet,
};

/// Integration config with registration defaults applied.
///
/// The vendor object defaults to the registered object name and the
/// additional transforms to none.
#[derive(Debug, Clone)]
pub struct BoundIntegration {
    object: String,
    vendor_object: String,
    config: IntegrationConfig,
    additional: TransformSet,
}

impl BoundIntegration {
    /// Binds `config` to `object`.
    pub fn new(object: impl Into<String>, config: IntegrationConfig) -> Self {
        let object = object.into();
        let vendor_object = config
            .map_to_object
            .clone()
            .unwrap_or_else(|| object.clone());
        let additional = config.additional_transforms.clone().unwrap_or_default();
        Self {
            object,
            vendor_object,
            config,
            additional,
        }
    }

    /// The internal object name.
    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }

    /// The vendor object type records are written to.
    #[must_use]
    pub fn vendor_object(&self) -> &str {
        &self.vendor_object
    }

    /// The underlying config.
    #[must_use]
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Maps an internal record to the vendor shape for `event`.
    ///
    /// The event's transforms (or the global ones) apply first, with the
    /// additional transforms layered over them.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not an object.
    pub fn outbound(&self, data: &Value, event: LifecycleEvent) -> Result<Record, MappingError> {
        let resolved = ConfigValidator::resolve_transforms(&self.config, event);
        let transforms = resolved.transforms.layered(&self.additional);
        FieldMapper::map(data, &self.config.map, Direction::Forward, &transforms)
    }

    /// Maps a vendor record back to the internal shape for `event`, using
    /// the event's after-transforms (or the global ones).
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not an object.
    pub fn inbound(&self, data: &Value, event: LifecycleEvent) -> Result<Record, MappingError> {
        let resolved = ConfigValidator::resolve_transforms(&self.config, event);
        FieldMapper::map(
            data,
            &self.config.map,
            Direction::Reverse,
            resolved.after_transforms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncbridge_mapping::{EventBinding, FieldMap, Transform};

    fn config() -> IntegrationConfig {
        let map = FieldMap::from_pairs([
            ("firstName", "FirstName"),
            ("address.country", "MailingCountry"),
        ])
        .expect("valid map");
        IntegrationConfig::new("contact", "Contact", map)
            .with_global_transforms(
                TransformSet::new().with("MailingCountry", Transform::on_str(str::to_lowercase)),
            )
            .with_event(EventBinding::new(LifecycleEvent::AfterCreate))
            .with_event(
                EventBinding::new(LifecycleEvent::AfterUpdate).with_transforms(
                    TransformSet::new().with("FirstName", Transform::on_str(str::to_uppercase)),
                ),
            )
    }

    #[test]
    fn defaults_vendor_object_to_registered_name() {
        let bound = BoundIntegration::new("contact", config());
        assert_eq!(bound.object(), "contact");
        assert_eq!(bound.vendor_object(), "contact");

        let bound = BoundIntegration::new("contact", config().with_map_to_object("Contact"));
        assert_eq!(bound.vendor_object(), "Contact");
    }

    #[test]
    fn outbound_uses_event_transforms_instead_of_global() {
        let bound = BoundIntegration::new("contact", config());
        let data = json!({"firstName": "Ada", "address": {"country": "UK"}});

        let created = bound.outbound(&data, LifecycleEvent::AfterCreate).expect("mapped");
        assert_eq!(Value::Object(created), json!({"FirstName": "Ada", "MailingCountry": "uk"}));

        let updated = bound.outbound(&data, LifecycleEvent::AfterUpdate).expect("mapped");
        assert_eq!(Value::Object(updated), json!({"FirstName": "ADA", "MailingCountry": "UK"}));
    }

    #[test]
    fn additional_transforms_layer_over_resolved_ones() {
        let bound = BoundIntegration::new(
            "contact",
            config().with_additional_transforms(
                TransformSet::new().with("MailingCountry", Transform::on_str(|s| format!("{s}!"))),
            ),
        );
        let data = json!({"firstName": "Ada", "address": {"country": "UK"}});
        let mapped = bound.outbound(&data, LifecycleEvent::AfterCreate).expect("mapped");
        assert_eq!(mapped["MailingCountry"], "UK!");
    }

    #[test]
    fn inbound_restores_internal_paths() {
        let bound = BoundIntegration::new("contact", config());
        let vendor = json!({"Id": "003A", "FirstName": "Ada", "MailingCountry": "UK"});
        let internal = bound.inbound(&vendor, LifecycleEvent::AfterCreate).expect("mapped");
        assert_eq!(
            Value::Object(internal),
            json!({"firstName": "Ada", "address": {"country": "UK"}})
        );
    }

    #[test]
    fn non_object_input_is_rejected() {
        let bound = BoundIntegration::new("contact", config());
        assert!(bound.outbound(&json!([1, 2]), LifecycleEvent::AfterCreate).is_err());
    }
}
