//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use driveup_auth::BoxFuture;

use crate::resolver::{ContainerResolver, ResolveError};
use crate::transport::{ChunkRequest, HttpReply, SessionRequest, TransportError, UploadTransport};
use crate::types::{ContainerRef, UploadTarget};

type Reply = Result<HttpReply, TransportError>;

/// Transport that replays queued replies and records every request.
#[derive(Default)]
pub(crate) struct MockTransport {
    session_replies: Mutex<VecDeque<Reply>>,
    chunk_replies: Mutex<VecDeque<Reply>>,
    sessions: Mutex<Vec<SessionRequest>>,
    chunks: Mutex<Vec<ChunkRequest>>,
    /// Reply returned once the chunk queue is empty.
    fallback: Mutex<Option<HttpReply>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_session(&self, reply: Reply) {
        self.session_replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_chunk(&self, reply: Reply) {
        self.chunk_replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_status(&self, status: u16) {
        self.push_chunk(Ok(HttpReply::new(status)));
    }

    /// Answers every unscripted chunk request with `reply`.
    pub(crate) fn always(&self, reply: HttpReply) {
        *self.fallback.lock().unwrap() = Some(reply);
    }

    pub(crate) fn sessions(&self) -> Vec<SessionRequest> {
        self.sessions.lock().unwrap().clone()
    }

    pub(crate) fn chunks(&self) -> Vec<ChunkRequest> {
        self.chunks.lock().unwrap().clone()
    }

    /// Rendered `Content-Range` of every chunk request, in order.
    pub(crate) fn ranges(&self) -> Vec<String> {
        self.chunks().iter().map(|c| c.range.to_string()).collect()
    }
}

impl UploadTransport for MockTransport {
    fn start_session(&self, req: SessionRequest) -> BoxFuture<'_, Result<HttpReply, TransportError>> {
        self.sessions.lock().unwrap().push(req);
        Box::pin(async move {
            self.session_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("no scripted session reply".into())))
        })
    }

    fn put_chunk(&self, req: ChunkRequest) -> BoxFuture<'_, Result<HttpReply, TransportError>> {
        self.chunks.lock().unwrap().push(req);
        Box::pin(async move {
            if let Some(reply) = self.chunk_replies.lock().unwrap().pop_front() {
                return reply;
            }
            match self.fallback.lock().unwrap().clone() {
                Some(reply) => Ok(reply),
                None => Err(TransportError::Other("no scripted chunk reply".into())),
            }
        })
    }
}

/// Resolver that knows no containers.
pub(crate) struct NoResolver;

impl ContainerResolver for NoResolver {
    fn resolve_container_id<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String, ResolveError>> {
        Box::pin(async move { Err(ResolveError::NotFound(name.to_string())) })
    }
}

/// Writes `contents` to a temp file and builds a target for it.
pub(crate) fn target(contents: &[u8], parent: ContainerRef) -> (tempfile::TempDir, UploadTarget) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, contents).unwrap();
    let target = UploadTarget::from_path(&path, parent).unwrap();
    (dir, target)
}
