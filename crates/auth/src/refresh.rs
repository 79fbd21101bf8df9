use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AccessToken, BoxFuture, CredentialError, TokenSource};

/// Exchanges a long-lived OAuth2 refresh token for short-lived access tokens.
///
/// Wrap in [`crate::CachingCredentials`] so the exchange only happens when the
/// cached token is about to expire.
#[derive(Clone)]
pub struct RefreshTokenSource {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl RefreshTokenSource {
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_endpoint: driveup_protocol::constants::DEFAULT_TOKEN_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Overrides the token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    async fn exchange(&self) -> Result<AccessToken, CredentialError> {
        if self.refresh_token.is_empty() {
            return Err(CredentialError::Unavailable("refresh token is empty".into()));
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token endpoint rejected refresh");
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CredentialError::Http(format!("invalid token response: {e}")))?;

        debug!(expires_in = ?parsed.expires_in, "obtained access token");
        Ok(match parsed.expires_in {
            Some(secs) => AccessToken::expiring_in(parsed.access_token, Duration::from_secs(secs)),
            None => AccessToken::new(parsed.access_token),
        })
    }
}

impl TokenSource for RefreshTokenSource {
    fn fetch_token(&self) -> BoxFuture<'_, Result<AccessToken, CredentialError>> {
        Box::pin(self.exchange())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CachingCredentials, CredentialProvider};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server, all_of, matchers::*};

    fn source(server: &Server) -> RefreshTokenSource {
        RefreshTokenSource::new(reqwest::Client::new(), "client", "shh", "1//refresh")
            .with_token_endpoint(server.url_str("/token"))
    }

    #[tokio::test]
    async fn exchanges_refresh_token() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::body(url_decoded(contains(("grant_type", "refresh_token")))),
                request::body(url_decoded(contains(("refresh_token", "1//refresh")))),
                request::body(url_decoded(contains(("client_id", "client")))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            }))),
        );

        let token = source(&server).fetch_token().await.unwrap();
        assert_eq!(token.secret(), "ya29.fresh");
        assert!(!token.expires_within(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn rejected_grant_is_an_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .respond_with(status_code(400).body(r#"{"error":"invalid_grant"}"#)),
        );

        let err = source(&server).fetch_token().await.unwrap_err();
        match err {
            CredentialError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_an_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .respond_with(status_code(200).body("not json")),
        );
        assert!(matches!(
            source(&server).fetch_token().await,
            Err(CredentialError::Http(_))
        ));
    }

    #[tokio::test]
    async fn empty_refresh_token_is_unavailable() {
        let src = RefreshTokenSource::new(reqwest::Client::new(), "c", "s", "");
        assert!(matches!(
            src.fetch_token().await,
            Err(CredentialError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn cached_source_hits_endpoint_once() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(1)
                .respond_with(json_encoded(serde_json::json!({
                    "access_token": "ya29.once",
                    "expires_in": 3600
                }))),
        );

        let creds = CachingCredentials::new(source(&server));
        for _ in 0..3 {
            assert_eq!(creds.access_token().await.unwrap().secret(), "ya29.once");
        }
    }
}
