//! Token lifecycle.
//!
//! ```text
//! Absent --authenticate--> Valid --enters refresh buffer--> Expiring
//!   ^                        ^                                 |
//!   |                        +---------authenticate------------+
//!   |
//! Invalidated <--401 from the vendor-- (any state)
//! ```
//!
//! Invalidation drops the access token but keeps the refresh token, so a
//! refreshable grant can recover without the initial grant. Concurrent
//! callers are not coordinated: two `authenticate` calls racing through an
//! expiry window each obtain a token, and the last one written wins.

use crate::auth::Authenticator;
use crate::credential::{
    CredentialStore, DEFAULT_REFRESH_BUFFER_MS, VendorCredential, load_credential, save_credential,
};
use crate::error::AdapterResult;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Observable state of the cached credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Nothing cached.
    Absent,
    /// Cached and outside the refresh buffer.
    Valid,
    /// Cached but inside the refresh buffer, or past expiry.
    Expiring,
    /// Rejected by the vendor; the next `authenticate` obtains a new token.
    Invalidated,
}

#[derive(Debug, Default)]
struct Slot {
    credential: Option<VendorCredential>,
    invalidated: bool,
}

/// Per-adapter credential cache.
pub struct TokenLifecycle {
    vendor: String,
    store_key: String,
    authenticator: Arc<dyn Authenticator>,
    store: Option<Arc<dyn CredentialStore>>,
    slot: RwLock<Slot>,
    refresh_buffer_ms: i64,
    exchanges: AtomicU64,
}

impl TokenLifecycle {
    /// Creates a lifecycle with nothing cached.
    pub fn new(
        vendor: impl Into<String>,
        store_key: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            store_key: store_key.into(),
            authenticator,
            store: None,
            slot: RwLock::new(Slot::default()),
            refresh_buffer_ms: DEFAULT_REFRESH_BUFFER_MS,
            exchanges: AtomicU64::new(0),
        }
    }

    /// Persists credentials through `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the refresh buffer.
    #[must_use]
    pub fn with_refresh_buffer_ms(mut self, refresh_buffer_ms: i64) -> Self {
        self.refresh_buffer_ms = refresh_buffer_ms;
        self
    }

    /// The key credentials are stored under.
    #[must_use]
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// How many times a credential was obtained from the vendor.
    #[must_use]
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Current state of the in-memory cache.
    pub async fn state(&self) -> TokenState {
        let slot = self.slot.read().await;
        if slot.invalidated {
            return TokenState::Invalidated;
        }
        match &slot.credential {
            None => TokenState::Absent,
            Some(credential) if credential.is_valid(self.refresh_buffer_ms) => TokenState::Valid,
            Some(_) => TokenState::Expiring,
        }
    }

    /// Returns a usable access token.
    ///
    /// A valid cached token is returned as is. Otherwise the credential
    /// store is consulted, and failing that a new credential is obtained and
    /// persisted before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if a new credential cannot be obtained or persisted.
    #[instrument(skip(self), fields(vendor = %self.vendor))]
    pub async fn authenticate(&self) -> AdapterResult<String> {
        let (cached, invalidated) = {
            let slot = self.slot.read().await;
            (slot.credential.clone(), slot.invalidated)
        };

        if !invalidated {
            if let Some(credential) = cached.as_ref().filter(|c| c.is_valid(self.refresh_buffer_ms)) {
                debug!("using cached token");
                return Ok(credential.access_token.clone());
            }
        }

        let mut previous = cached;
        if previous.is_none() && !invalidated {
            if let Some(stored) = self.load().await {
                if stored.is_valid(self.refresh_buffer_ms) {
                    debug!("using stored token");
                    let token = stored.access_token.clone();
                    self.slot.write().await.credential = Some(stored);
                    return Ok(token);
                }
                previous = Some(stored);
            }
        }

        debug!("obtaining new token");
        let fresh = self.authenticator.obtain(previous.as_ref()).await?;
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        self.persist(&fresh).await?;

        let token = fresh.access_token.clone();
        let mut slot = self.slot.write().await;
        slot.credential = Some(fresh);
        slot.invalidated = false;
        Ok(token)
    }

    /// Marks the cached token as rejected.
    ///
    /// The refresh token, if any, is kept for the next `authenticate`.
    #[instrument(skip(self), fields(vendor = %self.vendor))]
    pub async fn invalidate(&self) {
        let refresh_only = {
            let mut slot = self.slot.write().await;
            slot.invalidated = true;
            slot.credential = slot.credential.take().and_then(|credential| {
                credential.refresh_token.map(|refresh_token| VendorCredential {
                    access_token: String::new(),
                    refresh_token: Some(refresh_token),
                    expires_in_seconds: 0,
                    issued_at_epoch_ms: credential.issued_at_epoch_ms,
                })
            });
            slot.credential.clone()
        };
        debug!("token invalidated");

        if let Some(credential) = refresh_only {
            if let Err(e) = self.persist(&credential).await {
                warn!(error = %e, "failed to persist invalidated credential");
            }
        }
    }

    async fn load(&self) -> Option<VendorCredential> {
        if !self.authenticator.persistent() {
            return None;
        }
        let store = self.store.as_ref()?;
        match load_credential(store.as_ref(), &self.store_key).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, key = %self.store_key, "ignoring stored credential");
                None
            }
        }
    }

    async fn persist(&self, credential: &VendorCredential) -> AdapterResult<()> {
        if !self.authenticator.persistent() {
            return Ok(());
        }
        if let Some(store) = &self.store {
            save_credential(store.as_ref(), &self.store_key, credential).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for TokenLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLifecycle")
            .field("vendor", &self.vendor)
            .field("store_key", &self.store_key)
            .field("strategy", &self.authenticator.strategy())
            .field("refresh_buffer_ms", &self.refresh_buffer_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::AuthStrategy;
    use crate::credential::{InMemoryCredentialStore, credential_key};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hands out `token-1`, `token-2`, ... and records the refresh token it
    /// was given each time.
    #[derive(Debug, Default)]
    pub(crate) struct CountingAuth {
        issued: AtomicU64,
        pub(crate) seen_refresh: Mutex<Vec<Option<String>>>,
        pub(crate) lifetime_seconds: u64,
    }

    impl CountingAuth {
        pub(crate) fn with_lifetime(lifetime_seconds: u64) -> Self {
            Self {
                lifetime_seconds,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuth {
        fn strategy(&self) -> AuthStrategy {
            AuthStrategy::RefreshToken
        }

        async fn obtain(
            &self,
            previous: Option<&VendorCredential>,
        ) -> AdapterResult<VendorCredential> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen_refresh
                .lock()
                .expect("lock")
                .push(previous.and_then(|c| c.refresh_token.clone()));
            Ok(VendorCredential::issued_now(
                format!("token-{n}"),
                Some("refresh".to_string()),
                self.lifetime_seconds,
            ))
        }
    }

    fn lifecycle(auth: Arc<CountingAuth>) -> TokenLifecycle {
        TokenLifecycle::new("hubspot", credential_key("hubspot", "test"), auth)
    }

    #[tokio::test]
    async fn caches_valid_token() {
        let auth = Arc::new(CountingAuth::with_lifetime(1800));
        let tokens = lifecycle(Arc::clone(&auth));
        assert_eq!(tokens.state().await, TokenState::Absent);

        assert_eq!(tokens.authenticate().await.expect("token"), "token-1");
        assert_eq!(tokens.authenticate().await.expect("token"), "token-1");
        assert_eq!(tokens.exchange_count(), 1);
        assert_eq!(tokens.state().await, TokenState::Valid);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_with_refresh_token() {
        let auth = Arc::new(CountingAuth::with_lifetime(60));
        let tokens = lifecycle(Arc::clone(&auth));

        assert_eq!(tokens.authenticate().await.expect("token"), "token-1");
        assert_eq!(tokens.state().await, TokenState::Expiring);
        assert_eq!(tokens.authenticate().await.expect("token"), "token-2");

        let seen = auth.seen_refresh.lock().expect("lock").clone();
        assert_eq!(seen, [None, Some("refresh".to_string())]);
    }

    #[tokio::test]
    async fn invalidation_keeps_refresh_token() {
        let auth = Arc::new(CountingAuth::with_lifetime(1800));
        let tokens = lifecycle(Arc::clone(&auth));

        tokens.authenticate().await.expect("token");
        tokens.invalidate().await;
        assert_eq!(tokens.state().await, TokenState::Invalidated);

        assert_eq!(tokens.authenticate().await.expect("token"), "token-2");
        assert_eq!(tokens.state().await, TokenState::Valid);
        let seen = auth.seen_refresh.lock().expect("lock").clone();
        assert_eq!(seen[1].as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn persists_and_reuses_stored_credential() {
        let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let auth = Arc::new(CountingAuth::with_lifetime(1800));

        let first = lifecycle(Arc::clone(&auth)).with_store(Arc::clone(&store));
        assert_eq!(first.authenticate().await.expect("token"), "token-1");
        let raw = store
            .get("hubspot-token-test")
            .await
            .expect("readable")
            .expect("persisted");
        assert!(raw.contains("\"accessToken\":\"token-1\""));

        let second = lifecycle(Arc::clone(&auth)).with_store(Arc::clone(&store));
        assert_eq!(second.authenticate().await.expect("token"), "token-1");
        assert_eq!(second.exchange_count(), 0);
    }

    #[tokio::test]
    async fn invalidation_is_persisted() {
        let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let auth = Arc::new(CountingAuth::with_lifetime(1800));

        let tokens = lifecycle(Arc::clone(&auth)).with_store(Arc::clone(&store));
        tokens.authenticate().await.expect("token");
        tokens.invalidate().await;

        let other = lifecycle(Arc::clone(&auth)).with_store(Arc::clone(&store));
        assert_eq!(other.authenticate().await.expect("token"), "token-2");
    }
}
