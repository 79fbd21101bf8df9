//! Protocol constants and status code classification.

/// Chunk sizes (except the final chunk) must be a multiple of this.
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Default resumable upload endpoint.
pub const DEFAULT_UPLOAD_ENDPOINT: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=resumable";

/// Default endpoint of the generic file list API.
pub const DEFAULT_FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// MIME type of a folder in the list API.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
/// "Resume Incomplete": the chunk was accepted, more bytes are expected.
pub const STATUS_RESUME_INCOMPLETE: u16 = 308;

pub const HEADER_UPLOAD_CONTENT_TYPE: &str = "X-Upload-Content-Type";
pub const HEADER_UPLOAD_CONTENT_LENGTH: &str = "X-Upload-Content-Length";

pub const METADATA_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How a response status drives the upload state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// `200`/`201`: the object is finalized.
    Complete,
    /// `308`: bytes accepted, upload still open.
    Incomplete,
    /// `5xx`: transient server failure, retry after reconciling.
    Transient,
    /// Any `4xx` and every status the protocol never produces.
    Fatal,
}

impl StatusClass {
    /// Classifies a chunk or status-query response code.
    pub fn of(status: u16) -> Self {
        match status {
            STATUS_OK | STATUS_CREATED => Self::Complete,
            STATUS_RESUME_INCOMPLETE => Self::Incomplete,
            500..=599 => Self::Transient,
            _ => Self::Fatal,
        }
    }

    pub fn is_retryable(self) -> bool {
        self == Self::Transient
    }
}
