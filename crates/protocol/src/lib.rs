//! Wire-level types for the resumable upload protocol.
//!
//! Everything here is pure data: header rendering/parsing, status code
//! classification and the JSON bodies exchanged with the upload service.
//! No I/O happens in this crate.

pub mod constants;
pub mod range;
pub mod types;

pub use constants::StatusClass;
pub use range::{ContentRange, parse_acknowledged_range};
pub use types::{SessionMetadata, UploadProgress, UploadStatus, UploadedObject};

/// Errors produced while parsing protocol headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed Content-Range header: {0}")]
    MalformedContentRange(String),

    #[error("malformed Range header: {0}")]
    MalformedRange(String),
}
