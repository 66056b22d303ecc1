//! The delivery seam between the queue core and the network.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::Job;

/// Abstract mail delivery collaborator.
///
/// Implementations establish an authenticated, optionally encrypted session
/// to the server named in the job's captured [`crate::TransportConfig`],
/// transmit the composed message and tear the session down. The worker
/// invokes `send` strictly outside of any pool lock, and a job becomes
/// `Sent` only after `send` returns `Ok`; there is no partial-send state.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, job: &Job) -> Result<(), TransportError>;
}

/// Terminal delivery failure, recorded on the job and in the audit log.
///
/// The queue performs no automatic retry: one attempt, one outcome.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish a session with the server.
    #[error("connection failed: {0}")]
    Connect(String),

    /// TLS negotiation or certificate validation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server refused the configured credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server rejected the envelope or the message content.
    #[error("server rejected message: {code} {message}")]
    Rejected { code: u16, message: String },

    /// An attachment path could not be read at send time.
    #[error("attachment unreadable: {0}")]
    Attachment(String),

    /// The configured per-send deadline elapsed.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
