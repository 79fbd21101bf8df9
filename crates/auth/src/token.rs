use std::fmt;
use std::time::{Duration, Instant};

use crate::{BoxFuture, CredentialError, CredentialProvider};

/// A bearer token and, when known, the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// A token with no known expiry.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    /// A token that expires `lifetime` from now.
    pub fn expiring_in(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Some(Instant::now() + lifetime),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret)
    }

    /// Returns `true` if the token expires within `skew` from now.
    pub fn expires_within(&self, skew: Duration) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + skew >= at,
            None => false,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Hands out the same token forever.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: AccessToken,
}

impl StaticCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(secret),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn access_token(&self) -> BoxFuture<'_, Result<AccessToken, CredentialError>> {
        Box::pin(async move {
            if self.token.secret().is_empty() {
                return Err(CredentialError::Unavailable("empty access token".into()));
            }
            Ok(self.token.clone())
        })
    }
}
