//! Error types for the events crate.
//!
//! - `ListenerFault`: What a listener returns when it fails
//! - `Fault`: A listener fault annotated with the dispatch it happened in

use std::fmt;
use syncbridge_core::{DispatchId, ListenerId};

/// Failure reported by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFault {
    message: String,
}

impl ListenerFault {
    /// Creates a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates a fault from any error, keeping its display text.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(err.to_string())
    }

    /// The fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ListenerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ListenerFault {}

impl From<String> for ListenerFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ListenerFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A listener fault with its dispatch context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Event being dispatched.
    pub event: String,
    /// Listener that failed.
    pub listener: ListenerId,
    /// Dispatch the failure belongs to.
    pub dispatch: DispatchId,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener {} for event '{}' failed: {}",
            self.listener, self.event, self.message
        )
    }
}

impl std::error::Error for Fault {}
