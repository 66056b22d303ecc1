//! Job model: immutable submission data plus mutable lifecycle state.

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Identifier assigned to a job at submission.
///
/// Ids are monotonically increasing over the life of a pool and are never
/// reused, not even after a job has been withdrawn or removed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// Transitions are one-directional: `Waiting` → `Sending` → `Sent` or
/// `Failed`. A waiting job may instead be withdrawn, which deletes it from
/// the pool. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Held in the pool, counting down to its release instant.
    Waiting,
    /// Claimed by the promoter; delivery is queued or in flight.
    Sending,
    /// Delivery completed without error.
    Sent,
    /// Delivery failed; the reason is recorded on the job.
    Failed,
}

impl JobStatus {
    /// Returns `true` for `Sent` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// A single recipient, fully resolved before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

/// How TLS is negotiated with the mail server.
///
/// Always chosen explicitly by the caller, never inferred from the hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// TLS from the first byte (SSL-on-connect, typically port 465).
    #[default]
    Implicit,
    /// Plaintext connect, upgraded via STARTTLS (typically port 587).
    StartTls,
    /// No encryption at all. Testing only.
    Plaintext,
}

/// Sender identity and server settings, captured at submission time.
///
/// Captured once so that a pending job is unaffected by later edits to the
/// sender configuration; credentials are not looked up again at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Sender address, also used as the authentication username.
    pub sender: String,
    /// Authentication secret (an app password for most providers).
    pub password: String,
    /// Mail server hostname.
    pub host: String,
    /// Mail server port.
    pub port: u16,
    #[serde(default)]
    pub tls: TlsMode,
}

/// Everything a caller provides to enqueue one send.
#[derive(Debug, Clone)]
pub struct Submission {
    pub recipient: Recipient,
    pub subject: String,
    /// Final body text; placeholders are already substituted.
    pub body: String,
    /// File references only; the payloads are read at send time.
    pub attachments: Vec<PathBuf>,
    pub config: Arc<TransportConfig>,
    /// Holding period before the job becomes eligible for dispatch.
    /// `None` uses the queue's configured default.
    pub hold: Option<Duration>,
}

/// A job held in the outbox.
///
/// The submission data is immutable for the job's lifetime; only the pool
/// mutates `release_at` (force release, while waiting) and the worker the
/// status and error fields.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
    pub config: Arc<TransportConfig>,
    pub(crate) release_at: Instant,
    pub(crate) status: JobStatus,
    pub(crate) error: Option<String>,
}

impl Job {
    pub(crate) fn new(id: JobId, submission: Submission, release_at: Instant) -> Self {
        Self {
            id,
            recipient: submission.recipient,
            subject: submission.subject,
            body: submission.body,
            attachments: submission.attachments,
            config: submission.config,
            release_at,
            status: JobStatus::Waiting,
            error: None,
        }
    }

    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Failure reason; set only on `Failed` jobs.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Earliest instant promotion is allowed. Frozen once the job leaves
    /// `Waiting`.
    #[must_use]
    pub const fn release_at(&self) -> Instant {
        self.release_at
    }
}

/// Point-in-time view of one job, as returned by the observer surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub id: JobId,
    pub recipient: Recipient,
    pub subject: String,
    /// Seconds until promotion for waiting jobs, `None` for all others.
    pub remaining_secs: Option<u64>,
    pub status: JobStatus,
    pub error: Option<String>,
}
