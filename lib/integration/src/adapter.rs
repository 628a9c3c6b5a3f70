//! The vendor adapter contract.

use crate::error::{AdapterResult, StandardError};
use crate::query::{PaginatedResult, QueryOptions};
use crate::reference::RefData;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use syncbridge_core::Record;

/// Key under which records carry relationships to other records.
pub const ASSOCIATIONS_KEY: &str = "associations";

/// Uniform CRUD surface over one vendor API.
///
/// Every method authenticates through the adapter's token lifecycle and
/// retries once if the vendor rejects the token. Writes read the record back
/// so callers see server-computed fields.
#[async_trait]
pub trait VendorAdapter: Send + Sync + fmt::Debug {
    /// Vendor name, as used in credential keys.
    fn vendor(&self) -> &str;

    /// Returns a usable access token.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be obtained.
    async fn authenticate(&self) -> AdapterResult<String>;

    /// Creates a record and returns it as stored.
    ///
    /// An `associations` entry is removed from the scalar payload and linked
    /// after the record exists.
    ///
    /// # Errors
    ///
    /// Returns the vendor's error for the write, the link or the read-back.
    async fn create(&self, object_type: &str, data: Record) -> AdapterResult<Record>;

    /// Finds one page of records.
    ///
    /// # Errors
    ///
    /// Returns the vendor's error.
    async fn find(&self, object_type: &str, options: &QueryOptions)
    -> AdapterResult<PaginatedResult>;

    /// Reads one record, or `None` if the vendor reports it missing.
    ///
    /// # Errors
    ///
    /// Returns any vendor error other than not-found.
    async fn find_one(
        &self,
        object_type: &str,
        id: &str,
        options: &QueryOptions,
    ) -> AdapterResult<Option<Record>>;

    /// Partially updates a record and returns it as stored, restricted to
    /// `options.select` when set.
    ///
    /// # Errors
    ///
    /// Returns the vendor's error for the write or the read-back.
    async fn update(
        &self,
        object_type: &str,
        id: &str,
        data: Record,
        options: &QueryOptions,
    ) -> AdapterResult<Record>;

    /// Deletes a record. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns any vendor error other than not-found.
    async fn delete(&self, object_type: &str, id: &str) -> AdapterResult<bool>;

    /// Link to the record in the vendor's UI.
    fn get_ref_url(&self, object_type: &str, id: &str) -> String;

    /// Id and UI link of the record.
    fn get_ref_data(&self, object_type: &str, id: &str) -> RefData {
        RefData {
            ref_id: id.to_string(),
            ref_url: self.get_ref_url(object_type, id),
        }
    }
}

/// A link from a record to another record.
///
/// `to` names the relationship: a lookup field for Salesforce, an object
/// type for HubSpot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Relationship name.
    pub to: String,
    /// Id of the linked record.
    pub id: String,
}

/// Removes the `associations` entry from `data`.
///
/// Accepted shapes are an object of `to: id | [id, ..]` or an array of
/// `{"to": .., "id": ..}` objects.
///
/// # Errors
///
/// Returns a validation error for any other shape.
pub fn split_associations(data: &mut Record) -> AdapterResult<Vec<Association>> {
    let Some(raw) = data.remove(ASSOCIATIONS_KEY) else {
        return Ok(Vec::new());
    };

    let mut associations = Vec::new();
    match raw {
        Value::Null => {}
        Value::Object(entries) => {
            for (to, ids) in entries {
                match ids {
                    Value::Array(ids) => {
                        for id in &ids {
                            associations.push(Association {
                                to: to.clone(),
                                id: id_string(id, &to)?,
                            });
                        }
                    }
                    id => associations.push(Association {
                        id: id_string(&id, &to)?,
                        to,
                    }),
                }
            }
        }
        Value::Array(items) => {
            for item in &items {
                let to = item
                    .get("to")
                    .and_then(Value::as_str)
                    .ok_or_else(|| StandardError::validation("association is missing 'to'"))?;
                let id = item
                    .get("id")
                    .ok_or_else(|| StandardError::validation("association is missing 'id'"))?;
                associations.push(Association {
                    to: to.to_string(),
                    id: id_string(id, to)?,
                });
            }
        }
        other => {
            return Err(StandardError::validation(format!(
                "associations must be an object or an array, got {other}"
            )));
        }
    }
    Ok(associations)
}

fn id_string(value: &Value, to: &str) -> AdapterResult<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(StandardError::validation(format!(
            "association '{to}' has an invalid id {other}"
        ))),
    }
}

/// Maps a not-found error to `None`.
pub(crate) fn none_if_not_found<T>(result: AdapterResult<T>) -> AdapterResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Reads the id the vendor returned for a new record.
pub(crate) fn response_id(response: &Value, field: &str) -> AdapterResult<String> {
    match response.get(field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(StandardError::new(
            crate::error::ErrorKind::Http,
            format!("vendor response has no '{field}'"),
        )
        .with_details(response.clone())),
    }
}

/// Keeps `id_field` and the selected fields; keeps everything when nothing
/// is selected.
pub(crate) fn retain_selected(record: &mut Record, select: &[String], id_field: &str) {
    if select.is_empty() {
        return;
    }
    record.retain(|key, _| key == id_field || select.iter().any(|field| field == key));
}
