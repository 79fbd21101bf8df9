//! Upload facade: negotiate or resume, then drive the transfer engine.

use driveup_transfer::{
    Checkpoint, ChunkReader, TransferError, UploadSession, UploadTracker, source_modified,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::TransferEngine;
use crate::error::UploadError;
use crate::negotiator::SessionNegotiator;
use crate::types::{StartPoint, UploadReport, UploadTarget};

/// Uploads files through a [`SessionNegotiator`] and a [`TransferEngine`].
///
/// When the engine has a checkpoint store, [`upload`](Self::upload) picks up
/// an interrupted session for the same file instead of opening a new one.
pub struct Uploader {
    negotiator: SessionNegotiator,
    engine: TransferEngine,
}

impl Uploader {
    pub fn new(negotiator: SessionNegotiator, engine: TransferEngine) -> Self {
        Self { negotiator, engine }
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    /// Token that cancels the running upload.
    pub fn cancel_token(&self) -> CancellationToken {
        self.engine.cancel_token()
    }

    /// Uploads `target`, resuming a checkpointed session when one matches.
    ///
    /// A checkpointed session the server no longer knows (`404`/`410`) is
    /// dropped and the upload starts over in a new session.
    pub async fn upload(&self, target: &UploadTarget) -> Result<UploadReport, UploadError> {
        if let Some(checkpoint) = self.matching_checkpoint(target) {
            info!(
                file = %target.source.display(),
                offset = checkpoint.acked_offset,
                total = target.total_size,
                "resuming checkpointed upload"
            );
            match self
                .resume(target, checkpoint.session(), checkpoint.acked_offset)
                .await
            {
                Err(e) if matches!(e.status(), Some(404 | 410)) => {
                    warn!(status = ?e.status(), "checkpointed session expired, starting over");
                    self.discard_checkpoint(target);
                }
                other => return other,
            }
        }
        self.start_new(target).await
    }

    /// Uploads `target` in a new session, discarding any checkpoint.
    pub async fn upload_fresh(&self, target: &UploadTarget) -> Result<UploadReport, UploadError> {
        self.discard_checkpoint(target);
        self.start_new(target).await
    }

    /// Continues a known session; `offset` is the locally known acknowledged
    /// offset and is reconciled with the server before any bytes are sent.
    pub async fn resume(
        &self,
        target: &UploadTarget,
        session: UploadSession,
        offset: u64,
    ) -> Result<UploadReport, UploadError> {
        self.run(target, session, StartPoint::ResumeFrom(offset)).await
    }

    async fn start_new(&self, target: &UploadTarget) -> Result<UploadReport, UploadError> {
        let session = self.negotiator.negotiate(target).await?;
        if let Some(store) = self.engine.checkpoints()
            && let Err(e) = store.save(&Checkpoint::new(&session, &target.source, 0))
        {
            warn!(error = %e, "failed to save checkpoint");
        }
        self.run(target, session, StartPoint::Beginning).await
    }

    async fn run(
        &self,
        target: &UploadTarget,
        session: UploadSession,
        start: StartPoint,
    ) -> Result<UploadReport, UploadError> {
        let reader = tokio::task::spawn_blocking({
            let path = target.source.clone();
            move || ChunkReader::new(&path)
        })
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(format!("task join error: {e}"))))??;

        if reader.file_size() != target.total_size {
            return Err(TransferError::SourceChanged {
                expected: target.total_size,
                actual: reader.file_size(),
            }
            .into());
        }

        let upload_id = Uuid::new_v4().to_string();
        let tracker = UploadTracker::new(upload_id.clone(), target.name.clone(), target.total_size);
        let object = self.engine.transfer(&reader, &session, start, &tracker).await?;

        Ok(UploadReport {
            upload_id,
            session,
            object,
            resumed_from: match start {
                StartPoint::Beginning => None,
                StartPoint::ResumeFrom(offset) => Some(offset),
            },
            elapsed: tracker.elapsed().unwrap_or_default(),
        })
    }

    fn matching_checkpoint(&self, target: &UploadTarget) -> Option<Checkpoint> {
        let store = self.engine.checkpoints()?;
        match store.load(&target.source) {
            Ok(Some(cp)) if cp.matches(target.total_size, source_modified(&target.source)) => Some(cp),
            Ok(Some(cp)) => {
                info!(
                    checkpoint_size = cp.total_size,
                    file_size = target.total_size,
                    "file changed since checkpoint, discarding it"
                );
                self.discard_checkpoint(target);
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "unreadable checkpoint, discarding it");
                self.discard_checkpoint(target);
                None
            }
        }
    }

    fn discard_checkpoint(&self, target: &UploadTarget) {
        if let Some(store) = self.engine.checkpoints()
            && let Err(e) = store.remove(&target.source)
        {
            warn!(error = %e, "failed to remove checkpoint");
        }
    }
}
