//! Opens resumable upload sessions.

use std::sync::Arc;

use driveup_auth::CredentialProvider;
use driveup_protocol::SessionMetadata;
use driveup_protocol::constants::DEFAULT_UPLOAD_ENDPOINT;
use driveup_transfer::UploadSession;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::resolver::ContainerResolver;
use crate::transport::{SessionRequest, UploadTransport};
use crate::types::{ContainerRef, UploadTarget};

/// Negotiates one upload session per call.
///
/// Every call opens a new, independent session; sessions from earlier calls
/// are simply abandoned.
pub struct SessionNegotiator {
    transport: Arc<dyn UploadTransport>,
    credentials: Arc<dyn CredentialProvider>,
    resolver: Arc<dyn ContainerResolver>,
    endpoint: String,
}

impl SessionNegotiator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Arc<dyn CredentialProvider>,
        resolver: Arc<dyn ContainerResolver>,
    ) -> Self {
        Self {
            transport,
            credentials,
            resolver,
            endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
        }
    }

    /// Overrides the session negotiation endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Opens a session for `target` and returns its endpoint.
    pub async fn negotiate(&self, target: &UploadTarget) -> Result<UploadSession, UploadError> {
        let parent_id = self.container_id(&target.parent).await?;
        let token = self.credentials.access_token().await?;

        let req = SessionRequest {
            endpoint: self.endpoint.clone(),
            authorization: token.bearer(),
            metadata: SessionMetadata::new(target.name.clone(), parent_id),
            total_size: target.total_size,
        };

        let reply = self
            .transport
            .start_session(req)
            .await
            .map_err(|e| UploadError::SessionNegotiationFailed(e.to_string()))?;

        if !(200..300).contains(&reply.status) {
            warn!(status = reply.status, "session negotiation rejected");
            return Err(UploadError::SessionNegotiationFailed(format!(
                "server returned {}: {}",
                reply.status,
                reply.body_snippet()
            )));
        }

        let endpoint = reply
            .location
            .filter(|l| !l.is_empty())
            .ok_or_else(|| UploadError::SessionNegotiationFailed("response has no Location header".into()))?;

        info!(name = %target.name, total = target.total_size, "upload session opened");
        Ok(UploadSession::new(endpoint, target.total_size))
    }

    async fn container_id(&self, parent: &ContainerRef) -> Result<String, UploadError> {
        match parent {
            ContainerRef::Id(id) => Ok(id.clone()),
            ContainerRef::Named(name) => {
                let id = self
                    .resolver
                    .resolve_container_id(name)
                    .await
                    .map_err(|e| UploadError::SessionNegotiationFailed(e.to_string()))?;
                debug!(name = %name, id = %id, "resolved destination");
                Ok(id)
            }
        }
    }
}
