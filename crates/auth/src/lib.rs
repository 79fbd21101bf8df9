//! Bearer token providers for the upload client.
//!
//! The upload core only depends on [`CredentialProvider`]. How a token is
//! obtained (fixed string, OAuth2 refresh grant, something else) is the
//! provider's business; the core never retries a credential failure.

mod cache;
mod refresh;
mod token;

use std::future::Future;
use std::pin::Pin;

pub use cache::{CachingCredentials, TokenSource};
pub use refresh::RefreshTokenSource;
pub use token::{AccessToken, StaticCredentials};

/// Boxed future returned by the object-safe async traits of this workspace.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced while obtaining a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("no credentials configured: {0}")]
    Unavailable(String),

    #[error("token request failed: {0}")]
    Http(String),

    #[error("token endpoint returned status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Supplies bearer tokens on demand.
///
/// Implementations must be safe to call from concurrent uploads.
pub trait CredentialProvider: Send + Sync {
    /// Returns a token that is valid right now.
    fn access_token(&self) -> BoxFuture<'_, Result<AccessToken, CredentialError>>;
}
