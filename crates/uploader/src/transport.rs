//! HTTP transport seam.
//!
//! `UploadTransport` moves one request and brings back the parts of the
//! response the upload state machine looks at. It never retries and never
//! interprets status codes; that is the engine's job. `HttpTransport` is the
//! reqwest implementation; tests substitute a scripted mock.

use std::time::Duration;

use driveup_auth::BoxFuture;
use driveup_protocol::constants::{
    HEADER_UPLOAD_CONTENT_LENGTH, HEADER_UPLOAD_CONTENT_TYPE, METADATA_CONTENT_TYPE, OCTET_STREAM,
};
use driveup_protocol::{ContentRange, SessionMetadata};
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderName, LOCATION, RANGE,
};
use tracing::debug;

/// Errors raised before a response status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Session negotiation request.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub endpoint: String,
    /// Full `Authorization` header value.
    pub authorization: String,
    pub metadata: SessionMetadata,
    pub total_size: u64,
}

/// Chunk PUT or status query.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub endpoint: String,
    /// Full `Authorization` header value.
    pub authorization: String,
    pub range: ContentRange,
    pub body: Vec<u8>,
}

/// The parts of a response the upload flow cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// `Location` header.
    pub location: Option<String>,
    /// `Range` header.
    pub range: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First bytes of the body as text, for error messages.
    pub fn body_snippet(&self) -> String {
        const MAX: usize = 200;
        let text = String::from_utf8_lossy(&self.body);
        match text.char_indices().nth(MAX) {
            Some((i, _)) => format!("{}...", &text[..i]),
            None => text.into_owned(),
        }
    }
}

/// Sends upload requests.
///
/// Implemented over reqwest by [`HttpTransport`]; tests use scripted mocks.
pub trait UploadTransport: Send + Sync {
    /// Opens a resumable session.
    fn start_session(&self, req: SessionRequest) -> BoxFuture<'_, Result<HttpReply, TransportError>>;

    /// Sends one chunk, or an empty status query.
    fn put_chunk(&self, req: ChunkRequest) -> BoxFuture<'_, Result<HttpReply, TransportError>>;
}

/// Timeouts applied to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    pub connect_timeout: Duration,
    /// Upper bound for one whole request, body upload included.
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// reqwest-backed transport.
///
/// Redirects are disabled: `308 Resume Incomplete` must reach the engine
/// instead of being followed as a permanent redirect.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            request_timeout: config.request_timeout,
        })
    }

    /// The underlying client, shared with the other HTTP collaborators.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn read_reply(resp: reqwest::Response) -> Result<HttpReply, TransportError> {
        let status = resp.status().as_u16();
        let location = header_value(resp.headers(), LOCATION);
        let range = header_value(resp.headers(), RANGE);
        let body = resp.bytes().await?.to_vec();
        Ok(HttpReply {
            status,
            location,
            range,
            body,
        })
    }

    async fn send_session(&self, req: SessionRequest) -> Result<HttpReply, TransportError> {
        let body = serde_json::to_vec(&req.metadata).map_err(|e| TransportError::Other(e.to_string()))?;
        debug!(endpoint = %req.endpoint, total = req.total_size, "opening upload session");
        let resp = self
            .client
            .post(&req.endpoint)
            .timeout(self.request_timeout)
            .header(AUTHORIZATION, &req.authorization)
            .header(CONTENT_TYPE, METADATA_CONTENT_TYPE)
            .header(HEADER_UPLOAD_CONTENT_TYPE, OCTET_STREAM)
            .header(HEADER_UPLOAD_CONTENT_LENGTH, req.total_size.to_string())
            .body(body)
            .send()
            .await?;
        Self::read_reply(resp).await
    }

    async fn send_chunk(&self, req: ChunkRequest) -> Result<HttpReply, TransportError> {
        debug!(range = %req.range, len = req.body.len(), "sending chunk");
        let resp = self
            .client
            .put(&req.endpoint)
            .timeout(self.request_timeout)
            .header(AUTHORIZATION, &req.authorization)
            .header(CONTENT_LENGTH, req.body.len().to_string())
            .header(CONTENT_RANGE, req.range.to_string())
            .body(req.body)
            .send()
            .await?;
        Self::read_reply(resp).await
    }
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl UploadTransport for HttpTransport {
    fn start_session(&self, req: SessionRequest) -> BoxFuture<'_, Result<HttpReply, TransportError>> {
        Box::pin(self.send_session(req))
    }

    fn put_chunk(&self, req: ChunkRequest) -> BoxFuture<'_, Result<HttpReply, TransportError>> {
        Box::pin(self.send_chunk(req))
    }
}
