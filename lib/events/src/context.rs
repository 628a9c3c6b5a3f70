//! Events and the ambient event supplied by the hosting context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use syncbridge_core::DispatchId;

/// One event as seen by a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name, e.g. `contact.afterCreate`.
    pub name: String,
    /// Event payload, usually the record that changed.
    pub payload: Value,
    /// The dispatch delivering this event.
    pub dispatch: DispatchId,
}

impl Event {
    pub(crate) fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            dispatch: DispatchId::new(),
        }
    }
}

/// The event the hosting context is running for.
///
/// Passed to the bus at construction; the bus dispatches it once when
/// started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientEvent {
    /// Event name.
    pub name: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
}

impl AmbientEvent {
    /// Creates an ambient event.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}
