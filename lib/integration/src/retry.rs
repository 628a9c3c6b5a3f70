//! Retry on auth invalidation.
//!
//! Only one failure class is retried: a vendor rejecting the access token.
//! The token is invalidated, a new one obtained, and the operation retried
//! exactly once. Rate limiting and server errors propagate unchanged.

use crate::error::AdapterResult;
use crate::token::TokenLifecycle;
use std::future::Future;
use tracing::warn;

/// Runs vendor operations with a single auth-invalidation retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor<'a> {
    tokens: &'a TokenLifecycle,
}

impl<'a> RetryExecutor<'a> {
    /// Creates an executor over an adapter's token lifecycle.
    #[must_use]
    pub fn new(tokens: &'a TokenLifecycle) -> Self {
        Self { tokens }
    }

    /// Runs `operation` with a valid access token.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or the authentication error if no
    /// token could be obtained. An auth-invalidation error is returned only
    /// if the retried call fails the same way.
    pub async fn execute_with_retry<T, F, Fut>(&self, mut operation: F) -> AdapterResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let token = self.tokens.authenticate().await?;
        match operation(token).await {
            Err(err) if err.is_auth_invalidation() => {
                warn!(error = %err, "access token rejected, re-authenticating");
                self.tokens.invalidate().await;
                let token = self.tokens.authenticate().await?;
                operation(token).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StandardError;
    use crate::token::tests::CountingAuth;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tokens() -> TokenLifecycle {
        TokenLifecycle::new(
            "salesforce",
            "salesforce-token-test",
            Arc::new(CountingAuth::with_lifetime(3600)),
        )
    }

    #[tokio::test]
    async fn one_reauth_and_one_retry_after_invalidation() {
        let tokens = tokens();
        let calls = AtomicU32::new(0);

        let result = RetryExecutor::new(&tokens)
            .execute_with_retry(|token| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(StandardError::http(401, "INVALID_SESSION_ID"))
                    } else {
                        Ok(token)
                    }
                }
            })
            .await
            .expect("retry succeeds");

        assert_eq!(result, "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tokens.exchange_count(), 2);
    }

    #[tokio::test]
    async fn second_invalidation_propagates() {
        let tokens = tokens();
        let calls = AtomicU32::new(0);

        let err = RetryExecutor::new(&tokens)
            .execute_with_retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StandardError::http(401, "expired")) }
            })
            .await
            .expect_err("still unauthorized");

        assert!(err.is_auth_invalidation());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let tokens = tokens();
        let calls = AtomicU32::new(0);

        for status in [429, 500, 503] {
            let err = RetryExecutor::new(&tokens)
                .execute_with_retry(|_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err::<(), _>(StandardError::http(status, "nope")) }
                })
                .await
                .expect_err("propagates");
            assert_eq!(err.status, Some(status));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(tokens.exchange_count(), 1);
    }
}
