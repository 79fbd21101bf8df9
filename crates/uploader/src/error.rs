//! Upload error types.

use driveup_auth::CredentialError;
use driveup_protocol::ProtocolError;
use driveup_transfer::TransferError;

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(#[from] CredentialError),

    #[error("session negotiation failed: {0}")]
    SessionNegotiationFailed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("upload failed at offset {offset} (last status {status:?}): {reason}")]
    Failed {
        status: Option<u16>,
        offset: u64,
        reason: String,
    },

    #[error("upload cancelled at offset {acked_offset}")]
    Cancelled { acked_offset: u64 },

    #[error("source I/O error: {0}")]
    SourceIo(#[from] TransferError),
}

impl UploadError {
    /// Offset the server had acknowledged when the upload stopped, for errors
    /// that leave a resumable session behind.
    pub fn acked_offset(&self) -> Option<u64> {
        match self {
            Self::Failed { offset, .. } => Some(*offset),
            Self::Cancelled { acked_offset } => Some(*acked_offset),
            _ => None,
        }
    }

    /// HTTP status of the last response, when the error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Failed { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<ProtocolError> for UploadError {
    fn from(e: ProtocolError) -> Self {
        Self::ProtocolViolation(e.to_string())
    }
}
