//! Error types for the gateway crate.
//!
//! - `GatewayError`: Registration and initialization failures; these abort
//!   startup
//! - `SyncError`: Failures of one synchronization, reported to the event bus
//!   as listener faults

use std::fmt;
use syncbridge_integration::StandardError;
use syncbridge_mapping::{ConfigError, LifecycleEvent, MappingError};

/// Errors from gateway registration and initialization.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// An integration config failed validation.
    InvalidConfig { object: String, reason: ConfigError },
    /// An event names a handler that was never registered.
    UnknownHandler {
        object: String,
        event: LifecycleEvent,
        handler: String,
    },
    /// The ambient event faulted while being dispatched.
    AmbientDispatch { reason: String },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { object, reason } => {
                write!(f, "invalid integration config for '{object}': {reason}")
            }
            Self::UnknownHandler {
                object,
                event,
                handler,
            } => write!(
                f,
                "event '{event}' of '{object}' names unknown handler '{handler}'"
            ),
            Self::AmbientDispatch { reason } => {
                write!(f, "ambient event dispatch failed: {reason}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}

/// Errors from one synchronization.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The record could not be mapped.
    Mapping(MappingError),
    /// The vendor call failed.
    Adapter(StandardError),
    /// The record carries no vendor id to update or delete by.
    MissingRefId { object: String, field: String },
    /// The vendor reference could not be stored.
    Reference { reason: String },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping(err) => write!(f, "mapping failed: {err}"),
            Self::Adapter(err) => write!(f, "vendor call failed: {err}"),
            Self::MissingRefId { object, field } => {
                write!(f, "'{object}' record has no vendor id in '{field}'")
            }
            Self::Reference { reason } => {
                write!(f, "storing vendor reference failed: {reason}")
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl From<MappingError> for SyncError {
    fn from(err: MappingError) -> Self {
        Self::Mapping(err)
    }
}

impl From<StandardError> for SyncError {
    fn from(err: StandardError) -> Self {
        Self::Adapter(err)
    }
}
