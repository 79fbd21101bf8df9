//! Destination container lookup.

use std::sync::Arc;

use driveup_auth::{BoxFuture, CredentialError, CredentialProvider};
use driveup_protocol::constants::{DEFAULT_FILES_ENDPOINT, FOLDER_MIME_TYPE};
use serde::Deserialize;
use tracing::debug;

/// Errors produced while resolving a container name.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no container named {0:?}")]
    NotFound(String),

    #[error("container lookup failed: {0}")]
    Http(String),

    #[error("container lookup returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("credential unavailable: {0}")]
    Credential(#[from] CredentialError),
}

/// Maps a container name to its id.
pub trait ContainerResolver: Send + Sync {
    fn resolve_container_id<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String, ResolveError>>;
}

/// A container id known up front; the requested name is ignored.
#[derive(Debug, Clone)]
pub struct FixedContainer {
    id: String,
}

impl FixedContainer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ContainerResolver for FixedContainer {
    fn resolve_container_id<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<String, ResolveError>> {
        Box::pin(async move { Ok(self.id.clone()) })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    #[serde(default)]
    name: String,
}

/// Finds a folder by name through the files list API.
///
/// Every page of non-trashed folders is scanned and the first folder whose
/// name matches case-insensitively wins.
pub struct FolderResolver {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    files_endpoint: String,
}

impl FolderResolver {
    pub fn new(http: reqwest::Client, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http,
            credentials,
            files_endpoint: DEFAULT_FILES_ENDPOINT.to_string(),
        }
    }

    pub fn with_files_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.files_endpoint = endpoint.into();
        self
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<FileList, ResolveError> {
        let token = self.credentials.access_token().await?;
        let query = format!("mimeType='{FOLDER_MIME_TYPE}' and trashed=false");

        let mut req = self
            .http
            .get(&self.files_endpoint)
            .bearer_auth(token.secret())
            .query(&[("q", query.as_str()), ("fields", "nextPageToken,files(id,name)")]);
        if let Some(page) = page_token {
            req = req.query(&[("pageToken", page)]);
        }

        let resp = req.send().await.map_err(|e| ResolveError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<FileList>()
            .await
            .map_err(|e| ResolveError::Http(format!("invalid file list: {e}")))
    }

    async fn find(&self, name: &str) -> Result<String, ResolveError> {
        let wanted = name.to_lowercase();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let list = self.list_page(page_token.as_deref()).await?;
            pages += 1;
            if let Some(entry) = list.files.into_iter().find(|f| f.name.to_lowercase() == wanted) {
                debug!(name, id = %entry.id, pages, "resolved folder");
                return Ok(entry.id);
            }
            match list.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Err(ResolveError::NotFound(name.to_string())),
            }
        }
    }
}

impl ContainerResolver for FolderResolver {
    fn resolve_container_id<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String, ResolveError>> {
        Box::pin(self.find(name))
    }
}
