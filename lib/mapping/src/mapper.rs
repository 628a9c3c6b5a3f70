//! The field mapper.
//!
//! Maps a record through a [`FieldMap`] in either direction. For every entry
//! the value is read from the source path; `null` or missing values skip the
//! entry, otherwise the resolved transform (if any) is applied and the result
//! is written at the target path.

use crate::error::MappingError;
use crate::field_map::FieldMap;
use crate::transform::{Transform, TransformSet};
use serde_json::Value;
use syncbridge_core::{Record, get_path, set_path};
use tracing::trace;

/// Mapping direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Internal record to vendor record.
    #[default]
    Forward,
    /// Vendor record back to internal record.
    Reverse,
}

/// Stateless mapping evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMapper;

impl FieldMapper {
    /// Maps `data`, which must be a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a plain object.
    pub fn map(
        data: &Value,
        field_map: &FieldMap,
        direction: Direction,
        additional: &TransformSet,
    ) -> Result<Record, MappingError> {
        let Value::Object(record) = data else {
            return Err(MappingError::NotAnObject { what: "data" });
        };
        Ok(Self::map_record(record, field_map, direction, additional))
    }

    /// Maps an already-typed record.
    ///
    /// Transforms in `additional` override the map's own transforms entry by
    /// entry.
    #[must_use]
    pub fn map_record(
        record: &Record,
        field_map: &FieldMap,
        direction: Direction,
        additional: &TransformSet,
    ) -> Record {
        let mut result = Record::new();

        for entry in field_map.entries() {
            let (from, to) = match direction {
                Direction::Forward => (entry.source.as_str(), entry.target.as_str()),
                Direction::Reverse => (entry.target.as_str(), entry.source.as_str()),
            };

            let value = match get_path(record, from) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };

            let output = match resolve(to, field_map.transforms(), additional) {
                Some(transform) => transform.apply(value, record),
                None => Some(value.clone()),
            };

            match output {
                Some(output) => set_path(&mut result, to, output),
                None => trace!(field = to, "transform omitted field"),
            }
        }

        result
    }
}

fn resolve<'a>(
    key: &str,
    own: &'a TransformSet,
    additional: &'a TransformSet,
) -> Option<&'a Transform> {
    additional.get(key).or_else(|| own.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact_map() -> FieldMap {
        FieldMap::from_pairs([("firstName", "FirstName"), ("address.country", "MailingCountry")])
            .expect("valid map")
            .with_transforms(
                TransformSet::new().with("MailingCountry", Transform::on_str(str::to_uppercase)),
            )
    }

    fn forward(data: Value, map: &FieldMap) -> Value {
        Value::Object(
            FieldMapper::map(&data, map, Direction::Forward, &TransformSet::new())
                .expect("object input"),
        )
    }

    fn reverse(data: Value, map: &FieldMap) -> Value {
        Value::Object(
            FieldMapper::map(&data, map, Direction::Reverse, &TransformSet::new())
                .expect("object input"),
        )
    }

    #[test]
    fn maps_nested_source_with_transform() {
        let result = forward(
            json!({"firstName": "John", "address": {"country": "us"}}),
            &contact_map(),
        );
        assert_eq!(result, json!({"FirstName": "John", "MailingCountry": "US"}));
    }

    #[test]
    fn reverse_maps_back_to_source_names() {
        let result = reverse(json!({"FirstName": "Jane"}), &contact_map());
        assert_eq!(result, json!({"firstName": "Jane"}));
    }

    #[test]
    fn reverse_uses_source_path_as_transform_key() {
        let map = contact_map().with_transforms(
            TransformSet::new().with("address.country", Transform::on_str(str::to_lowercase)),
        );
        let result = reverse(json!({"MailingCountry": "US"}), &map);
        assert_eq!(result, json!({"address": {"country": "us"}}));
    }

    #[test]
    fn identity_round_trip_restores_keys() {
        let map = FieldMap::from_pairs([
            ("firstName", "FirstName"),
            ("address.city", "MailingCity"),
            ("company.name", "Account.Name"),
        ])
        .expect("valid map");
        let original = json!({
            "firstName": "Ada",
            "address": {"city": "London"},
            "company": {"name": "Analytical Engines"}
        });

        let there = forward(original.clone(), &map);
        assert_eq!(
            there,
            json!({"FirstName": "Ada", "MailingCity": "London", "Account": {"Name": "Analytical Engines"}})
        );
        assert_eq!(reverse(there, &map), original);
    }

    #[test]
    fn null_and_missing_values_are_skipped() {
        let result = forward(
            json!({"firstName": null, "address": {"city": "Paris"}}),
            &contact_map(),
        );
        assert_eq!(result, json!({}));
    }

    #[test]
    fn transform_returning_none_omits_field() {
        let map = FieldMap::from_pairs([("email", "Email"), ("firstName", "FirstName")])
            .expect("valid map")
            .with_transforms(TransformSet::new().with(
                "Email",
                Transform::new(|value, _| value.as_str().filter(|s| s.contains('@')).map(|s| json!(s))),
            ));

        let result = forward(json!({"email": "not-an-email", "firstName": "Bo"}), &map);
        assert_eq!(result, json!({"FirstName": "Bo"}));
    }

    #[test]
    fn additional_transforms_override_entry_by_entry() {
        let map = FieldMap::from_pairs([("firstName", "FirstName"), ("address.country", "MailingCountry")])
            .expect("valid map")
            .with_transforms(
                TransformSet::new()
                    .with("MailingCountry", Transform::on_str(str::to_uppercase))
                    .with("FirstName", Transform::on_str(str::to_uppercase)),
            );
        let additional =
            TransformSet::new().with("FirstName", Transform::on_str(str::to_lowercase));

        let result = FieldMapper::map(
            &json!({"firstName": "John", "address": {"country": "us"}}),
            &map,
            Direction::Forward,
            &additional,
        )
        .expect("object input");

        assert_eq!(
            Value::Object(result),
            json!({"FirstName": "john", "MailingCountry": "US"})
        );
    }

    #[test]
    fn later_entry_overwrites_scalar_intermediate() {
        let map = FieldMap::from_pairs([("kind", "meta"), ("source", "meta.source")])
            .expect("valid map");
        let result = forward(json!({"kind": "lead", "source": "web"}), &map);
        assert_eq!(result, json!({"meta": {"source": "web"}}));
    }

    #[test]
    fn non_object_data_is_rejected() {
        let err = FieldMapper::map(
            &json!("nope"),
            &contact_map(),
            Direction::Forward,
            &TransformSet::new(),
        )
        .expect_err("string input");
        assert_eq!(err, MappingError::NotAnObject { what: "data" });
    }
}
