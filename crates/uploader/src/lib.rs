//! Resumable upload flow: negotiate a session, send the file in framed
//! chunks, interpret every response, resume after interruption.
//!
//! The crate has no process-wide state. Transport, credentials, container
//! resolution, chunking and retry policy are all handed to constructors, so
//! the whole flow runs against scripted mocks in tests.
//!
//! # Pipeline
//!
//! 1. **Resolve**: map the destination container name to an id
//! 2. **Negotiate**: open a resumable session, get its endpoint
//! 3. **Transfer**: PUT chunks, follow `308` acknowledgements, retry 5xx
//! 4. **Finish**: parse the created object, drop the checkpoint

pub mod engine;
pub mod error;
pub mod negotiator;
pub mod resolver;
pub mod retry;
pub mod transport;
pub mod types;
pub mod uploader;

#[cfg(test)]
mod mock;

pub use engine::{EngineConfig, TransferEngine};
pub use error::UploadError;
pub use negotiator::SessionNegotiator;
pub use resolver::{ContainerResolver, FixedContainer, FolderResolver, ResolveError};
pub use retry::RetryConfig;
pub use transport::{
    ChunkRequest, HttpReply, HttpTransport, HttpTransportConfig, SessionRequest, TransportError,
    UploadTransport,
};
pub use types::{
    ContainerRef, StartPoint, TransferOutcome, UploadEvent, UploadReport, UploadTarget,
};
pub use uploader::Uploader;
