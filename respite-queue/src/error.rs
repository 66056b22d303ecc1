//! Caller-facing error types.
//!
//! Submission and withdrawal errors surface synchronously to the caller.
//! Delivery failures never do: they are recorded on the job and in the audit
//! log, and the snapshot surface is how callers learn about them.

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Rejection raised synchronously by [`crate::Outbox::submit`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// A required field is missing or malformed. The job is never admitted.
    #[error("invalid submission: {0}")]
    Invalid(&'static str),

    /// The holding pool is at capacity.
    #[error("holding pool is full ({capacity} jobs)")]
    QueueFull { capacity: usize },
}

/// Rejection raised synchronously by [`crate::Outbox::withdraw`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WithdrawError {
    /// The job exists but is no longer waiting; it is left untouched.
    #[error("{0} cannot be withdrawn (status: {1})")]
    InvalidState(JobId, JobStatus),

    /// No job with this id is present in the pool.
    #[error("no such job: {0}")]
    Unknown(JobId),
}

/// Failure to run the queue service.
#[derive(Debug, Error)]
pub enum ServeError {
    /// `serve` was called while another serve loop holds the dispatch
    /// channel.
    #[error("queue service is already running")]
    AlreadyServing,
}
