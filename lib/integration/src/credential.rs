//! Vendor credentials and their storage.
//!
//! Adapters cache the credential they obtained from the vendor. When a
//! `CredentialStore` is injected the credential is persisted there as JSON
//! under a per-vendor, per-environment key; otherwise it only lives in
//! adapter memory.

use crate::error::CredentialError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Default window before expiry in which a credential counts as expiring.
pub const DEFAULT_REFRESH_BUFFER_MS: i64 = 300_000;

/// A cached access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorCredential {
    /// Bearer token sent with each request.
    pub access_token: String,
    /// Token used to obtain a new access token, for refreshable grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token.
    pub expires_in_seconds: u64,
    /// When the access token was issued.
    pub issued_at_epoch_ms: i64,
}

impl VendorCredential {
    /// Creates a credential issued now.
    pub fn issued_now(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_seconds: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in_seconds,
            issued_at_epoch_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Epoch milliseconds at which the access token expires.
    #[must_use]
    pub fn expires_at_epoch_ms(&self) -> i64 {
        let lifetime_ms = i64::try_from(self.expires_in_seconds)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        self.issued_at_epoch_ms.saturating_add(lifetime_ms)
    }

    /// Returns true if the token is usable at `now_ms` and does not expire
    /// within `refresh_buffer_ms`.
    #[must_use]
    pub fn is_valid_at(&self, now_ms: i64, refresh_buffer_ms: i64) -> bool {
        now_ms < self.expires_at_epoch_ms().saturating_sub(refresh_buffer_ms)
    }

    /// [`is_valid_at`](Self::is_valid_at) for the current time.
    #[must_use]
    pub fn is_valid(&self, refresh_buffer_ms: i64) -> bool {
        self.is_valid_at(Utc::now().timestamp_millis(), refresh_buffer_ms)
    }

    /// Returns true if the token has not yet expired, ignoring the buffer.
    #[must_use]
    pub fn is_unexpired(&self) -> bool {
        self.is_valid(0)
    }
}

/// Storage key for a vendor's credential in one environment.
#[must_use]
pub fn credential_key(vendor: &str, environment: &str) -> String {
    format!("{vendor}-token-{environment}")
}

/// Key/value persistence for cached credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    async fn set(&self, key: &str, value: String) -> Result<(), CredentialError>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CredentialError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Reads and decodes a credential from a store.
pub(crate) async fn load_credential(
    store: &dyn CredentialStore,
    key: &str,
) -> Result<Option<VendorCredential>, CredentialError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| CredentialError::InvalidFormat {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Encodes and writes a credential to a store.
pub(crate) async fn save_credential(
    store: &dyn CredentialStore,
    key: &str,
    credential: &VendorCredential,
) -> Result<(), CredentialError> {
    let raw = serde_json::to_string(credential).map_err(|e| CredentialError::InvalidFormat {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, raw).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(issued_at_epoch_ms: i64) -> VendorCredential {
        VendorCredential {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_in_seconds: 1800,
            issued_at_epoch_ms,
        }
    }

    #[test]
    fn validity_window_respects_refresh_buffer() {
        let now = 1_700_000_000_000;
        assert!(credential(now - 1000 * 1000).is_valid_at(now, DEFAULT_REFRESH_BUFFER_MS));
        assert!(!credential(now - 1750 * 1000).is_valid_at(now, DEFAULT_REFRESH_BUFFER_MS));
    }

    #[test]
    fn validity_boundary_is_exclusive() {
        let now = 1_700_000_000_000;
        let cred = credential(now - 1500 * 1000);
        assert!(!cred.is_valid_at(now, DEFAULT_REFRESH_BUFFER_MS));
        assert!(cred.is_valid_at(now - 1, DEFAULT_REFRESH_BUFFER_MS));
    }

    #[test]
    fn huge_lifetimes_do_not_overflow() {
        let cred = VendorCredential {
            expires_in_seconds: u64::MAX,
            ..credential(0)
        };
        assert!(cred.is_valid_at(4_000_000_000_000, DEFAULT_REFRESH_BUFFER_MS));
    }

    #[test]
    fn credential_key_format() {
        assert_eq!(credential_key("hubspot", "production"), "hubspot-token-production");
    }

    #[test]
    fn credential_serializes_in_camel_case() {
        let value = serde_json::to_value(credential(42)).expect("serialize");
        assert_eq!(value["accessToken"], "token");
        assert_eq!(value["expiresInSeconds"], 1800);
        assert_eq!(value["issuedAtEpochMs"], 42);
        assert!(value.get("refreshToken").is_none());
    }

    #[tokio::test]
    async fn store_round_trip() {
        let store = InMemoryCredentialStore::new();
        let key = credential_key("salesforce", "sandbox");
        assert_eq!(load_credential(&store, &key).await.expect("readable"), None);

        save_credential(&store, &key, &credential(7)).await.expect("writable");
        let loaded = load_credential(&store, &key).await.expect("readable");
        assert_eq!(loaded, Some(credential(7)));
    }

    #[tokio::test]
    async fn corrupt_entry_is_reported() {
        let store = InMemoryCredentialStore::new();
        store.set("k", "not json".to_string()).await.expect("writable");
        let err = load_credential(&store, "k").await.expect_err("corrupt");
        assert!(matches!(err, CredentialError::InvalidFormat { key, .. } if key == "k"));
    }
}
