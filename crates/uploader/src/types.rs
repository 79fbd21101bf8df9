//! Data types for the upload flow.

use std::path::{Path, PathBuf};
use std::time::Duration;

use driveup_protocol::UploadedObject;
use driveup_transfer::{UploadSession, source_size};

use crate::error::UploadError;

/// Destination container of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRef {
    /// A container id known up front.
    Id(String),
    /// A container name resolved through a [`crate::ContainerResolver`].
    Named(String),
}

/// A local file and where it should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub source: PathBuf,
    pub total_size: u64,
    /// Name of the remote object.
    pub name: String,
    pub parent: ContainerRef,
}

impl UploadTarget {
    /// Builds a target for `source`, named after its file name.
    pub fn from_path(source: impl AsRef<Path>, parent: ContainerRef) -> Result<Self, UploadError> {
        let source = source.as_ref();
        let total_size = source_size(source)?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            source: source.to_path_buf(),
            total_size,
            name,
            parent,
        })
    }

    /// Overrides the remote object name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Where the transfer engine starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPoint {
    /// A freshly negotiated session: send from byte 0.
    Beginning,
    /// A session that already holds data: ask the server for its offset
    /// first, using this value as the local hint.
    ResumeFrom(u64),
}

/// Result of one chunk PUT or status query.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// The server took the whole chunk; send the next one.
    Continue,
    /// The object is finalized.
    Complete(UploadedObject),
    /// The server's acknowledged offset differs from what was sent; continue
    /// from there.
    ResumeFrom(u64),
    /// Transient failure; reconcile with the server and try again.
    Retryable { status: Option<u16>, reason: String },
    /// Permanent failure.
    Fatal { status: Option<u16>, reason: String },
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The transfer engine started (or resumed) sending.
    Started {
        upload_id: String,
        total_bytes: u64,
        offset: u64,
    },
    /// The server acknowledged more bytes.
    Progress {
        upload_id: String,
        acked_bytes: u64,
        total_bytes: u64,
    },
    /// A request failed transiently and will be retried.
    Retrying {
        upload_id: String,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// The server reported an offset other than the one the client expected.
    Resynchronized { upload_id: String, offset: u64 },
    /// The upload finished.
    Completed {
        upload_id: String,
        object: UploadedObject,
    },
    /// The upload stopped without finishing.
    Failed { upload_id: String, error: String },
}

/// Summary of a finished upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub upload_id: String,
    pub session: UploadSession,
    pub object: UploadedObject,
    /// Offset the upload resumed from, if it continued an earlier session.
    pub resumed_from: Option<u64>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_from_path_uses_file_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.tar");
        std::fs::write(&path, b"0123456789").unwrap();

        let target = UploadTarget::from_path(&path, ContainerRef::Id("f1".into())).unwrap();
        assert_eq!(target.total_size, 10);
        assert_eq!(target.name, "backup.tar");
        assert_eq!(target.with_name("renamed.tar").name, "renamed.tar");
    }

    #[test]
    fn target_from_missing_path_fails() {
        let err = UploadTarget::from_path("/no/such/file", ContainerRef::Id("f".into()));
        assert!(matches!(err, Err(UploadError::SourceIo(_))));
    }

    #[test]
    fn target_from_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadTarget::from_path(dir.path(), ContainerRef::Id("f".into()));
        assert!(matches!(err, Err(UploadError::SourceIo(_))));
    }
}
