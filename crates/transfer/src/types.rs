use std::sync::RwLock;
use std::time::{Duration, Instant};

use driveup_protocol::{UploadProgress, UploadStatus};
use serde::{Deserialize, Serialize};

/// A negotiated resumable upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Server-issued URI that every chunk request targets.
    pub endpoint: String,
    /// Object size declared when the session was opened.
    pub total_size: u64,
}

impl UploadSession {
    pub fn new(endpoint: impl Into<String>, total_size: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            total_size,
        }
    }
}

/// Observable state of one upload (thread-safe).
///
/// The transfer engine writes to it; any number of observers may read
/// [`progress`](Self::progress) concurrently.
pub struct UploadTracker {
    inner: RwLock<TrackerInner>,
}

struct TrackerInner {
    id: String,
    file_name: String,
    status: UploadStatus,
    total_bytes: u64,
    acked_bytes: u64,
    started_at: Option<Instant>,
    updated_at: Instant,
    completed_at: Option<Instant>,
    error: String,
}

impl UploadTracker {
    /// Creates a pending tracker.
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, total_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(TrackerInner {
                id: id.into(),
                file_name: file_name.into(),
                status: UploadStatus::Pending,
                total_bytes,
                acked_bytes: 0,
                started_at: None,
                updated_at: Instant::now(),
                completed_at: None,
                error: String::new(),
            }),
        }
    }

    /// Marks the upload as in progress from `acked` bytes.
    pub fn start(&self, acked: u64) {
        let mut s = self.inner.write().unwrap();
        s.status = UploadStatus::InProgress;
        s.acked_bytes = acked;
        let now = Instant::now();
        s.started_at.get_or_insert(now);
        s.updated_at = now;
    }

    /// Records the offset the server has acknowledged.
    ///
    /// The value is taken as-is: after reconciliation the server may report
    /// fewer bytes than the client believed were sent.
    pub fn acknowledge(&self, offset: u64) {
        let mut s = self.inner.write().unwrap();
        s.acked_bytes = offset;
        s.updated_at = Instant::now();
    }

    /// Marks the upload as completed.
    pub fn complete(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = UploadStatus::Completed;
        s.acked_bytes = s.total_bytes;
        let now = Instant::now();
        s.completed_at = Some(now);
        s.updated_at = now;
    }

    /// Marks the upload as failed with an error message.
    pub fn fail(&self, err: &str) {
        let mut s = self.inner.write().unwrap();
        s.status = UploadStatus::Failed;
        s.error = err.to_string();
        let now = Instant::now();
        s.completed_at = Some(now);
        s.updated_at = now;
    }

    /// Marks the upload as cancelled.
    pub fn cancel(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = UploadStatus::Cancelled;
        let now = Instant::now();
        s.completed_at = Some(now);
        s.updated_at = now;
    }

    /// Returns current progress as a protocol-compatible struct.
    pub fn progress(&self) -> UploadProgress {
        let s = self.inner.read().unwrap();
        UploadProgress {
            upload_id: s.id.clone(),
            status: s.status,
            total_bytes: s.total_bytes,
            acked_bytes: s.acked_bytes,
            file_name: s.file_name.clone(),
            error: s.error.clone(),
        }
    }

    /// Last offset acknowledged by the server.
    pub fn acked_offset(&self) -> u64 {
        self.inner.read().unwrap().acked_bytes
    }

    /// Returns `true` if the upload is pending or in progress.
    pub fn is_active(&self) -> bool {
        !self.inner.read().unwrap().status.is_terminal()
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    pub fn id(&self) -> String {
        self.inner.read().unwrap().id.clone()
    }

    /// Time since the upload started, or since it started until it finished.
    pub fn elapsed(&self) -> Option<Duration> {
        let s = self.inner.read().unwrap();
        let started = s.started_at?;
        let end = s.completed_at.unwrap_or_else(Instant::now);
        Some(end.duration_since(started))
    }
}
