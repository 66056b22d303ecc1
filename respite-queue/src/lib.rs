//! Deferred, withdrawable outbound-mail dispatch queue.
//!
//! Jobs are admitted into a holding pool with a grace period during which the
//! submitter may still withdraw them. A periodic promoter moves due jobs onto
//! a bounded dispatch channel consumed by serialized delivery workers, which
//! perform the network send through an abstract [`Transport`] and record the
//! terminal outcome through an [`AuditLog`].
//!
//! The pool is in-memory only: nothing survives a restart, and a job is sent
//! at most once. Callers learn about asynchronous outcomes exclusively by
//! polling [`Outbox::snapshot`].

pub mod audit;
pub mod compose;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod pool;
pub mod service;
pub mod transport;
mod worker;

pub use audit::{AuditLog, AuditOutcome, AuditRecord, TracingAuditLog};
pub use compose::{ContactDetails, Directory, Draft, draft_submissions, render_body};
pub use config::QueueConfig;
pub use error::{ServeError, SubmitError, WithdrawError};
pub use job::{Job, JobId, JobStatus, JobView, Recipient, Submission, TlsMode, TransportConfig};
pub use pool::Outbox;
pub use service::{QueueObserver, QueueService};
pub use transport::{Transport, TransportError};

/// Control signal delivered to the serve loop and its workers.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
