//! Records and dot-separated nested paths.
//!
//! A record is a plain JSON object. Paths such as `address.country` address
//! nested objects one segment at a time.

use serde_json::{Map, Value};

/// A plain JSON object, the unit of data flowing through syncbridge.
pub type Record = Map<String, Value>;

/// Reads the value at a dot-separated `path`.
///
/// Returns `None` as soon as an intermediate segment is missing or is not an
/// object.
#[must_use]
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at a dot-separated `path`.
///
/// Intermediate objects are created as needed. A non-object value found at an
/// intermediate segment is overwritten with an empty object.
pub fn set_path(record: &mut Record, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = record;
    for segment in parents {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(map) = slot else {
            return;
        };
        current = map;
    }
    current.insert((*last).to_string(), value);
}

/// Removes and returns the value at a dot-separated `path`.
pub fn remove_path(record: &mut Record, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => record.remove(path),
        Some((parent, last)) => {
            let mut current = record;
            for segment in parent.split('.') {
                current = current.get_mut(segment)?.as_object_mut()?;
            }
            current.remove(last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn get_top_level_and_nested() {
        let data = record(json!({"firstName": "John", "address": {"country": "us"}}));
        assert_eq!(get_path(&data, "firstName"), Some(&json!("John")));
        assert_eq!(get_path(&data, "address.country"), Some(&json!("us")));
    }

    #[test]
    fn get_stops_at_missing_intermediate() {
        let data = record(json!({"address": "not an object"}));
        assert_eq!(get_path(&data, "address.country"), None);
        assert_eq!(get_path(&data, "missing.country"), None);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut data = Record::new();
        set_path(&mut data, "a.b.c", json!(1));
        assert_eq!(Value::Object(data), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_overwrites_scalar_intermediate() {
        let mut data = record(json!({"a": 5}));
        set_path(&mut data, "a.b", json!("x"));
        assert_eq!(Value::Object(data), json!({"a": {"b": "x"}}));
    }

    #[test]
    fn set_keeps_sibling_fields() {
        let mut data = record(json!({"a": {"keep": true}}));
        set_path(&mut data, "a.added", json!(2));
        assert_eq!(Value::Object(data), json!({"a": {"keep": true, "added": 2}}));
    }

    #[test]
    fn remove_nested() {
        let mut data = record(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(remove_path(&mut data, "a.b"), Some(json!(1)));
        assert_eq!(Value::Object(data), json!({"a": {"c": 2}}));
    }
}
