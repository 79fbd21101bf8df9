use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::{AccessToken, BoxFuture, CredentialError, CredentialProvider};

/// Default margin before expiry at which a cached token is refreshed.
const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Fetches a fresh token, typically over the network.
pub trait TokenSource: Send + Sync {
    fn fetch_token(&self) -> BoxFuture<'_, Result<AccessToken, CredentialError>>;
}

/// Caches the token of a [`TokenSource`] until shortly before it expires.
///
/// Readers of a valid cached token only take the read lock. Refreshes are
/// serialized behind `refresh`: the first caller to find the token stale
/// fetches a new one and everyone queued behind it reuses that result.
pub struct CachingCredentials<S> {
    source: S,
    cached: RwLock<Option<AccessToken>>,
    refresh: Mutex<()>,
    skew: Duration,
}

impl<S: TokenSource> CachingCredentials<S> {
    pub fn new(source: S) -> Self {
        Self::with_skew(source, DEFAULT_EXPIRY_SKEW)
    }

    /// Refreshes tokens that expire within `skew`.
    pub fn with_skew(source: S, skew: Duration) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            skew,
        }
    }

    /// Drops the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn valid_cached(&self) -> Option<AccessToken> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|t| !t.expires_within(self.skew))
            .cloned()
    }
}

impl<S: TokenSource> CredentialProvider for CachingCredentials<S> {
    fn access_token(&self) -> BoxFuture<'_, Result<AccessToken, CredentialError>> {
        Box::pin(async move {
            if let Some(token) = self.valid_cached().await {
                return Ok(token);
            }

            let _guard = self.refresh.lock().await;
            // Another task may have refreshed while we waited for the lock.
            if let Some(token) = self.valid_cached().await {
                return Ok(token);
            }

            let token = self.source.fetch_token().await?;
            debug!("refreshed access token");
            *self.cached.write().await = Some(token.clone());
            Ok(token)
        })
    }
}
