//! The delivery loop: pulls dispatched jobs and runs the transport.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    Signal,
    audit::{AuditLog, AuditOutcome, AuditRecord},
    job::{Job, JobId},
    pool::Outbox,
    transport::{Transport, TransportError},
};

pub(crate) struct WorkerContext {
    pub(crate) worker_id: usize,
    pub(crate) outbox: Outbox,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) audit: Arc<dyn AuditLog>,
    pub(crate) send_timeout: Option<Duration>,
    pub(crate) retention: Option<Duration>,
}

/// Pull jobs off the dispatch channel until shutdown.
///
/// The receiver is shared between workers behind a mutex; each worker holds
/// it only while waiting for the next id, never during a delivery, so the
/// channel drains strictly in order. One failing or panicking delivery never
/// takes the loop down.
pub(crate) async fn run(
    ctx: WorkerContext,
    rx: Arc<Mutex<mpsc::Receiver<JobId>>>,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    loop {
        let id = {
            let mut rx = rx.lock().await;
            tokio::select! {
                id = rx.recv() => id,
                _ = shutdown.recv() => None,
            }
        };

        let Some(id) = id else {
            debug!(worker = ctx.worker_id, "delivery worker stopping");
            return;
        };

        deliver(&ctx, id).await;
    }
}

/// One delivery end to end: send outside any pool lock, record the terminal
/// state, append the audit record, schedule the retention removal.
async fn deliver(ctx: &WorkerContext, id: JobId) {
    let Some(job) = ctx.outbox.get(id) else {
        // Only the worker removes sending jobs, so this should not happen.
        warn!(%id, "dispatched job vanished from the pool");
        return;
    };

    let result = attempt(ctx, &job).await;

    let outcome = match &result {
        Ok(()) => {
            info!(%id, recipient = %job.recipient.email, "delivered");
            AuditOutcome::Sent
        }
        Err(e) => {
            warn!(%id, recipient = %job.recipient.email, error = %e, "delivery failed");
            AuditOutcome::Failed(e.to_string())
        }
    };

    ctx.outbox.finalize(id, result.map_err(|e| e.to_string()));
    ctx.audit.append(&AuditRecord {
        recipient_name: job.recipient.name.clone(),
        recipient_email: job.recipient.email.clone(),
        subject: job.subject.clone(),
        timestamp: Utc::now(),
        outcome,
    });

    match ctx.retention {
        Some(grace) if grace.is_zero() => ctx.outbox.remove_terminal(id),
        Some(grace) => {
            let outbox = ctx.outbox.clone();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                outbox.remove_terminal(id);
            });
        }
        None => {}
    }
}

/// One transport attempt under the configured deadline, panics contained.
async fn attempt(ctx: &WorkerContext, job: &Job) -> Result<(), TransportError> {
    let send = AssertUnwindSafe(ctx.transport.send(job)).catch_unwind();

    let outcome = match ctx.send_timeout {
        Some(limit) => match tokio::time::timeout(limit, send).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(TransportError::Timeout(limit)),
        },
        None => send.await,
    };

    outcome.unwrap_or_else(|_| {
        error!(id = %job.id, "transport panicked during send");
        Err(TransportError::Other("internal delivery fault".to_string()))
    })
}
