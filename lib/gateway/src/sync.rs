//! Synchronization handlers.
//!
//! The gateway hands every lifecycle event to a [`SyncHandler`]. Most
//! deployments use [`AdapterSyncHandler`], which maps the record and writes
//! it through a vendor adapter.

use crate::bound::BoundIntegration;
use crate::error::SyncError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use syncbridge_core::{Record, get_path};
use syncbridge_events::Event;
use syncbridge_integration::{QueryOptions, RefData, StandardError, VendorAdapter};
use syncbridge_mapping::LifecycleEvent;
use tracing::{debug, info, instrument};

/// Field of the internal record holding the vendor id, by default.
pub const DEFAULT_REF_ID_FIELD: &str = "refId";

/// Reacts to one lifecycle event of one integration.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Handles `event`, a `lifecycle` event of `object`.
    ///
    /// # Errors
    ///
    /// Returns an error if the synchronization failed; the bus's fault mode
    /// decides what happens next.
    async fn handle(
        &self,
        object: &str,
        integration: &BoundIntegration,
        lifecycle: LifecycleEvent,
        event: &Event,
    ) -> Result<(), SyncError>;
}

/// A vendor record created for an internal record.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedReference {
    /// Internal object name.
    pub object: String,
    /// The internal record as dispatched.
    pub record: Value,
    /// Vendor id and UI link.
    pub reference: RefData,
    /// The vendor record mapped back to internal field names.
    pub mapped_back: Record,
}

/// Receives references to newly created vendor records, typically to store
/// the vendor id on the internal record.
#[async_trait]
pub trait ReferenceSink: Send + Sync {
    /// Stores one reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be stored.
    async fn store(&self, created: CreatedReference) -> Result<(), SyncError>;
}

/// Writes mapped records through a vendor adapter.
///
/// `afterCreate` creates the vendor record, `afterUpdate` updates it and
/// `afterDelete` deletes it. Updates and deletes find the vendor record by
/// the id stored in the internal record's ref-id field.
pub struct AdapterSyncHandler {
    adapter: Arc<dyn VendorAdapter>,
    sink: Option<Arc<dyn ReferenceSink>>,
    ref_id_field: String,
}

impl AdapterSyncHandler {
    /// Creates a handler over `adapter`.
    pub fn new(adapter: Arc<dyn VendorAdapter>) -> Self {
        Self {
            adapter,
            sink: None,
            ref_id_field: DEFAULT_REF_ID_FIELD.to_string(),
        }
    }

    /// Reports created records to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ReferenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Reads the vendor id from `field` (a dot-separated path).
    #[must_use]
    pub fn with_ref_id_field(mut self, field: impl Into<String>) -> Self {
        self.ref_id_field = field.into();
        self
    }

    fn ref_id<'a>(&self, object: &str, payload: &'a Value) -> Result<&'a str, SyncError> {
        payload
            .as_object()
            .and_then(|record| get_path(record, &self.ref_id_field))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::MissingRefId {
                object: object.to_string(),
                field: self.ref_id_field.clone(),
            })
    }
}

impl fmt::Debug for AdapterSyncHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSyncHandler")
            .field("vendor", &self.adapter.vendor())
            .field("sink", &self.sink.is_some())
            .field("ref_id_field", &self.ref_id_field)
            .finish()
    }
}

#[async_trait]
impl SyncHandler for AdapterSyncHandler {
    #[instrument(skip_all, fields(vendor = self.adapter.vendor(), %object, %lifecycle))]
    async fn handle(
        &self,
        object: &str,
        integration: &BoundIntegration,
        lifecycle: LifecycleEvent,
        event: &Event,
    ) -> Result<(), SyncError> {
        let data = integration.outbound(&event.payload, lifecycle)?;
        let vendor_object = integration.vendor_object();

        match lifecycle {
            LifecycleEvent::AfterCreate => {
                let created = self.adapter.create(vendor_object, data).await?;
                let id = vendor_id(&created).ok_or_else(|| {
                    SyncError::Adapter(StandardError::validation(format!(
                        "created {vendor_object} has no id"
                    )))
                })?;
                let reference = self.adapter.get_ref_data(vendor_object, &id);
                info!(ref_id = %reference.ref_id, "vendor record created");

                if let Some(sink) = &self.sink {
                    let mapped_back = integration.inbound(&Value::Object(created), lifecycle)?;
                    sink.store(CreatedReference {
                        object: object.to_string(),
                        record: event.payload.clone(),
                        reference,
                        mapped_back,
                    })
                    .await?;
                }
            }
            LifecycleEvent::AfterUpdate => {
                let id = self.ref_id(object, &event.payload)?;
                self.adapter
                    .update(vendor_object, id, data, &QueryOptions::new())
                    .await?;
                debug!(ref_id = %id, "vendor record updated");
            }
            LifecycleEvent::AfterDelete => {
                let id = self.ref_id(object, &event.payload)?;
                if self.adapter.delete(vendor_object, id).await? {
                    debug!(ref_id = %id, "vendor record deleted");
                } else {
                    debug!(ref_id = %id, "vendor record already gone");
                }
            }
        }
        Ok(())
    }
}

/// Vendors disagree on the casing of the id field.
fn vendor_id(record: &Record) -> Option<String> {
    ["id", "Id"].into_iter().find_map(|key| match record.get(key)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}
