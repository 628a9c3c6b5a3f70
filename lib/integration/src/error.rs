//! Error types for the integration crate.
//!
//! - `StandardError`: What every adapter operation fails with, classified
//!   by `ErrorKind` so callers (and the retry executor) can react to it
//! - `CredentialError`: Errors from credential storage

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Classification of an adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// No response was received.
    Network,
    /// The vendor answered with a non-2xx status.
    Http,
    /// The vendor rejected the access token (HTTP 401).
    AuthInvalidation,
    /// Adapter or integration misconfiguration.
    Config,
    /// Input that violates the expected shape.
    Validation,
}

impl ErrorKind {
    /// The wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Http => "http",
            Self::AuthInvalidation => "auth-invalidation",
            Self::Config => "config",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error every adapter operation returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardError {
    /// Failure class.
    pub kind: ErrorKind,
    /// HTTP status, when a response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Human-readable message, vendor-supplied where available.
    pub message: String,
    /// Vendor-supplied error body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl StandardError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            details: None,
        }
    }

    /// No response was received.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Non-2xx response. A 401 is classified as auth-invalidation.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let kind = if status == 401 {
            ErrorKind::AuthInvalidation
        } else {
            ErrorKind::Http
        };
        Self {
            status: Some(status),
            ..Self::new(kind, message)
        }
    }

    /// Misconfiguration.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Invalid input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Attaches the vendor's error body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns true if the access token was rejected.
    #[must_use]
    pub fn is_auth_invalidation(&self) -> bool {
        self.kind == ErrorKind::AuthInvalidation
    }

    /// Returns true for an HTTP 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::Http && self.status == Some(404)
    }
}

impl fmt::Display for StandardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error ({status}): {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for StandardError {}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, StandardError>;

/// Errors from credential operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Stored credential could not be decoded.
    InvalidFormat { key: String, reason: String },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { key, reason } => {
                write!(f, "invalid credential format under '{key}': {reason}")
            }
            Self::StorageFailed { reason } => {
                write!(f, "storage operation failed: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

impl From<CredentialError> for StandardError {
    fn from(err: CredentialError) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unauthorized_is_auth_invalidation() {
        let err = StandardError::http(401, "Session expired or invalid");
        assert!(err.is_auth_invalidation());
        assert_eq!(err.status, Some(401));
        assert!(!StandardError::http(403, "forbidden").is_auth_invalidation());
    }

    #[test]
    fn not_found_only_for_http_404() {
        assert!(StandardError::http(404, "missing").is_not_found());
        assert!(!StandardError::http(400, "bad").is_not_found());
        assert!(!StandardError::network("404").is_not_found());
    }

    #[test]
    fn display_includes_kind_and_status() {
        let err = StandardError::http(400, "MALFORMED_QUERY");
        assert_eq!(err.to_string(), "http error (400): MALFORMED_QUERY");
        let err = StandardError::network("connection refused");
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn serializes_kind_in_kebab_case() {
        let err = StandardError::http(401, "expired").with_details(json!({"errorCode": "INVALID_SESSION_ID"}));
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["kind"], "auth-invalidation");
        assert_eq!(value["details"]["errorCode"], "INVALID_SESSION_ID");
    }

    #[test]
    fn credential_error_display() {
        let err = CredentialError::StorageFailed {
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("disk full"));
    }
}
