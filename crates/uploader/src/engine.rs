//! Chunked transfer engine.
//!
//! Drives one upload session from a start offset to completion. A fresh
//! upload starts in `Sending(0)`; a resumed one starts in `ResumingFrom(hint)`
//! and asks the server for its acknowledged offset before sending anything.
//! Every request is awaited before the next one is built, so a session never
//! has more than one chunk in flight.

use std::sync::Arc;
use std::time::Duration;

use driveup_auth::CredentialProvider;
use driveup_protocol::constants::CHUNK_GRANULARITY;
use driveup_protocol::{ContentRange, ProtocolError, StatusClass, UploadedObject, parse_acknowledged_range};
use driveup_transfer::{
    Checkpoint, CheckpointStore, ChunkPlan, ChunkPlanner, ChunkReader, DEFAULT_CHUNK_SIZE, TransferError,
    UploadSession, UploadTracker, validate_chunk_size,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::retry::RetryConfig;
use crate::transport::{ChunkRequest, HttpReply, UploadTransport};
use crate::types::{StartPoint, TransferOutcome, UploadEvent};

/// Chunking and retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Bytes per chunk; every chunk but the last has exactly this length.
    pub chunk_size: u64,
    /// `chunk_size` must be a multiple of this.
    pub chunk_granularity: u64,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_granularity: CHUNK_GRANULARITY,
            retry: RetryConfig::default(),
        }
    }
}

/// Sends the bytes of a source file to an upload session.
pub struct TransferEngine {
    transport: Arc<dyn UploadTransport>,
    credentials: Arc<dyn CredentialProvider>,
    config: EngineConfig,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<UploadEvent>>,
    checkpoints: Option<CheckpointStore>,
}

impl TransferEngine {
    /// Creates an engine. A chunk size that is not a positive multiple of the
    /// granularity is rejected here, before any request is made.
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Arc<dyn CredentialProvider>,
        config: EngineConfig,
    ) -> Result<Self, UploadError> {
        validate_chunk_size(config.chunk_size, config.chunk_granularity)
            .map_err(|e| UploadError::ProtocolViolation(e.to_string()))?;
        Ok(Self {
            transport,
            credentials,
            config,
            cancel: CancellationToken::new(),
            events: None,
            checkpoints: None,
        })
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sends progress events to `tx`. Events are dropped when the channel is
    /// full; the upload never waits for a listener.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Persists a checkpoint after every acknowledged chunk.
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn checkpoints(&self) -> Option<&CheckpointStore> {
        self.checkpoints.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Uploads `reader`'s file to `session`, starting at `start`.
    ///
    /// On success the checkpoint for the source is removed. On failure or
    /// cancellation it is left at the last acknowledged offset, which is also
    /// carried by the returned error.
    pub async fn transfer(
        &self,
        reader: &ChunkReader,
        session: &UploadSession,
        start: StartPoint,
        tracker: &UploadTracker,
    ) -> Result<UploadedObject, UploadError> {
        let upload_id = tracker.id();
        let result = match Transfer::new(self, reader, session, tracker) {
            Ok(mut transfer) => transfer.run(start).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(object) => {
                tracker.complete();
                self.remove_checkpoint(reader);
                info!(upload = %upload_id, id = ?object.id, total = session.total_size, "upload complete");
                self.emit(UploadEvent::Completed {
                    upload_id,
                    object: object.clone(),
                });
            }
            Err(e) => {
                if matches!(e, UploadError::Cancelled { .. }) {
                    tracker.cancel();
                    info!(upload = %upload_id, offset = ?e.acked_offset(), "upload cancelled");
                } else {
                    tracker.fail(&e.to_string());
                    error!(upload = %upload_id, error = %e, "upload failed");
                }
                self.emit(UploadEvent::Failed {
                    upload_id,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    fn remove_checkpoint(&self, reader: &ChunkReader) {
        if let Some(store) = &self.checkpoints
            && let Err(e) = store.remove(reader.path())
        {
            warn!(error = %e, "failed to remove checkpoint");
        }
    }
}

enum State {
    Sending(u64),
    ResumingFrom(u64),
}

enum Step {
    Next(State),
    Done(UploadedObject),
}

/// One run of the state machine over a session.
struct Transfer<'a> {
    engine: &'a TransferEngine,
    reader: &'a ChunkReader,
    session: &'a UploadSession,
    tracker: &'a UploadTracker,
    planner: ChunkPlanner,
    upload_id: String,
    /// Last offset the server confirmed.
    acked: u64,
    /// Highest offset the server has ever confirmed in this transfer.
    high_water: u64,
    /// Consecutive failed requests since `high_water` last advanced.
    failures: u32,
}

impl<'a> Transfer<'a> {
    fn new(
        engine: &'a TransferEngine,
        reader: &'a ChunkReader,
        session: &'a UploadSession,
        tracker: &'a UploadTracker,
    ) -> Result<Self, UploadError> {
        if reader.file_size() != session.total_size {
            return Err(TransferError::SourceChanged {
                expected: session.total_size,
                actual: reader.file_size(),
            }
            .into());
        }
        let planner = ChunkPlanner::aligned(
            session.total_size,
            engine.config.chunk_size,
            engine.config.chunk_granularity,
        )
        .map_err(|e| UploadError::ProtocolViolation(e.to_string()))?;

        Ok(Self {
            engine,
            reader,
            session,
            tracker,
            planner,
            upload_id: tracker.id(),
            acked: 0,
            high_water: 0,
            failures: 0,
        })
    }

    fn total(&self) -> u64 {
        self.session.total_size
    }

    async fn run(&mut self, start: StartPoint) -> Result<UploadedObject, UploadError> {
        let total = self.total();
        let mut state = match start {
            StartPoint::Beginning => State::Sending(0),
            StartPoint::ResumeFrom(hint) if hint > total => {
                return Err(UploadError::ProtocolViolation(format!(
                    "resume offset {hint} is beyond the object size {total}"
                )));
            }
            StartPoint::ResumeFrom(hint) => State::ResumingFrom(hint),
        };
        self.acked = match state {
            State::Sending(o) | State::ResumingFrom(o) => o,
        };
        self.high_water = self.acked;

        self.tracker.start(self.acked);
        self.engine.emit(UploadEvent::Started {
            upload_id: self.upload_id.clone(),
            total_bytes: total,
            offset: self.acked,
        });
        debug!(upload = %self.upload_id, offset = self.acked, total, "transfer started");

        loop {
            self.check_cancelled()?;
            let step = match state {
                State::ResumingFrom(hint) => {
                    debug!(hint, "querying acknowledged offset");
                    let outcome = self.query_status().await?;
                    self.apply(outcome, None).await?
                }
                State::Sending(offset) => {
                    let plan = self
                        .planner
                        .plan_at(offset)
                        .map_err(|e| UploadError::ProtocolViolation(e.to_string()))?
                        .ok_or_else(|| {
                            UploadError::ProtocolViolation(format!(
                                "no bytes left to send at offset {offset} of {total}"
                            ))
                        })?;
                    let outcome = self.send_chunk(plan).await?;
                    self.apply(outcome, Some(plan)).await?
                }
            };
            match step {
                Step::Next(next) => state = next,
                Step::Done(object) => return Ok(object),
            }
        }
    }

    /// Moves the state machine after a response. `sent` is the chunk that
    /// produced it, or `None` for a status query.
    async fn apply(&mut self, outcome: TransferOutcome, sent: Option<ChunkPlan>) -> Result<Step, UploadError> {
        match outcome {
            TransferOutcome::Complete(object) => Ok(Step::Done(object)),
            TransferOutcome::Continue => {
                let plan = sent.ok_or_else(|| {
                    UploadError::ProtocolViolation("status query cannot advance the offset".into())
                })?;
                self.acknowledge(plan.end());
                Ok(Step::Next(State::Sending(plan.end())))
            }
            TransferOutcome::ResumeFrom(offset) => {
                let total = self.total();
                if offset > total {
                    return Err(UploadError::ProtocolViolation(format!(
                        "server acknowledged {offset} bytes of a {total}-byte object"
                    )));
                }
                if offset < self.acked {
                    warn!(previous = self.acked, offset, "server acknowledged fewer bytes than before");
                }
                if let Some(plan) = sent {
                    info!(sent = %plan.content_range(total), offset, "server resynchronized offset");
                    self.engine.emit(UploadEvent::Resynchronized {
                        upload_id: self.upload_id.clone(),
                        offset,
                    });
                    if offset <= plan.start {
                        self.record_failure(None, "server accepted none of the chunk".into())?;
                    }
                }
                if offset != self.acked {
                    self.acknowledge(offset);
                }
                Ok(Step::Next(State::Sending(offset)))
            }
            TransferOutcome::Retryable { status, reason } => {
                self.record_failure(status, reason.clone())?;
                let delay = self.engine.config.retry.delay_for_attempt(self.failures);
                warn!(
                    attempt = self.failures,
                    status = ?status,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "retrying after transient failure"
                );
                self.engine.emit(UploadEvent::Retrying {
                    upload_id: self.upload_id.clone(),
                    attempt: self.failures,
                    delay,
                    reason,
                });
                self.backoff(delay).await?;
                Ok(Step::Next(State::ResumingFrom(self.acked)))
            }
            TransferOutcome::Fatal { status, reason } => Err(UploadError::Failed {
                status,
                offset: self.acked,
                reason,
            }),
        }
    }

    fn record_failure(&mut self, status: Option<u16>, reason: String) -> Result<(), UploadError> {
        self.failures += 1;
        if self.engine.config.retry.exhausted(self.failures) {
            return Err(UploadError::Failed {
                status,
                offset: self.acked,
                reason: format!("giving up after {} attempts: {reason}", self.failures),
            });
        }
        Ok(())
    }

    fn acknowledge(&mut self, offset: u64) {
        // Re-acknowledging bytes lost to a server regression is not progress.
        if offset > self.high_water {
            self.high_water = offset;
            self.failures = 0;
        }
        self.acked = offset;
        self.tracker.acknowledge(offset);
        self.save_checkpoint();
        self.engine.emit(UploadEvent::Progress {
            upload_id: self.upload_id.clone(),
            acked_bytes: offset,
            total_bytes: self.total(),
        });
    }

    fn save_checkpoint(&self) {
        if let Some(store) = &self.engine.checkpoints {
            let checkpoint = Checkpoint::new(self.session, self.reader.path(), self.acked)
                .with_source_modified(self.reader.modified());
            if let Err(e) = store.save(&checkpoint) {
                warn!(error = %e, offset = self.acked, "failed to save checkpoint");
            }
        }
    }

    async fn send_chunk(&self, plan: ChunkPlan) -> Result<TransferOutcome, UploadError> {
        let body = self.read(plan).await?;
        let range = plan.content_range(self.total());
        if range.body_len() != body.len() as u64 {
            return Err(UploadError::ProtocolViolation(format!(
                "framing {range} does not match a {}-byte body",
                body.len()
            )));
        }
        self.exchange(range, body, Some(plan)).await
    }

    async fn query_status(&self) -> Result<TransferOutcome, UploadError> {
        self.exchange(ContentRange::status_query(self.total()), Vec::new(), None)
            .await
    }

    async fn exchange(
        &self,
        range: ContentRange,
        body: Vec<u8>,
        sent: Option<ChunkPlan>,
    ) -> Result<TransferOutcome, UploadError> {
        let token = self.engine.credentials.access_token().await?;
        let req = ChunkRequest {
            endpoint: self.session.endpoint.clone(),
            authorization: token.bearer(),
            range,
            body,
        };
        match self.engine.transport.put_chunk(req).await {
            Ok(reply) => {
                debug!(range = %range, status = reply.status, ack = ?reply.range, "chunk response");
                Ok(interpret(&reply, sent, self.total())?)
            }
            Err(e) => Ok(TransferOutcome::Retryable {
                status: None,
                reason: e.to_string(),
            }),
        }
    }

    async fn read(&self, plan: ChunkPlan) -> Result<Vec<u8>, UploadError> {
        if plan.len == 0 {
            return Ok(Vec::new());
        }
        let reader = self.reader.clone();
        let body = tokio::task::spawn_blocking(move || reader.read_chunk(&plan))
            .await
            .map_err(|e| TransferError::Io(std::io::Error::other(format!("task join error: {e}"))))??;
        Ok(body)
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.engine.cancel.is_cancelled() {
            Err(UploadError::Cancelled {
                acked_offset: self.acked,
            })
        } else {
            Ok(())
        }
    }

    async fn backoff(&self, delay: Duration) -> Result<(), UploadError> {
        tokio::select! {
            _ = self.engine.cancel.cancelled() => Err(UploadError::Cancelled {
                acked_offset: self.acked,
            }),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Classifies a response to a chunk (`sent`) or to a status query (`None`).
///
/// A `308` reporting every byte of the object means the server has not
/// finalized it yet; that is treated as transient so the next status query
/// can pick up the final `200`/`201`.
pub(crate) fn interpret(
    reply: &HttpReply,
    sent: Option<ChunkPlan>,
    total: u64,
) -> Result<TransferOutcome, ProtocolError> {
    let status = reply.status;
    Ok(match StatusClass::of(status) {
        StatusClass::Complete => TransferOutcome::Complete(UploadedObject::from_body(&reply.body)),
        StatusClass::Transient => TransferOutcome::Retryable {
            status: Some(status),
            reason: format!("server returned {status}"),
        },
        StatusClass::Fatal => TransferOutcome::Fatal {
            status: Some(status),
            reason: format!("server returned {status}: {}", reply.body_snippet()),
        },
        StatusClass::Incomplete => {
            let acked = match &reply.range {
                Some(r) => parse_acknowledged_range(r)?,
                None => 0,
            };
            if acked == total {
                TransferOutcome::Retryable {
                    status: Some(status),
                    reason: format!("all {total} bytes acknowledged but upload not finalized"),
                }
            } else {
                match sent {
                    Some(plan) if acked == plan.end() => TransferOutcome::Continue,
                    _ => TransferOutcome::ResumeFrom(acked),
                }
            }
        }
    })
}
