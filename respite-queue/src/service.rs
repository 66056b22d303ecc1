//! The queue service: owns the pool, the promoter tick and the workers.

use std::{panic::AssertUnwindSafe, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    sync::{broadcast, mpsc},
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    Signal,
    audit::AuditLog,
    config::QueueConfig,
    error::ServeError,
    job::{JobId, JobView},
    pool::Outbox,
    transport::Transport,
    worker,
};

/// Read-only surface for UIs to poll.
///
/// The core never pushes into the caller; it only exposes pull-based state,
/// which keeps it free of any rendering dependency.
pub trait QueueObserver: Send + Sync {
    /// Ordered point-in-time view of every job in the pool.
    fn snapshot(&self) -> Vec<JobView>;

    /// Number of jobs currently in the pool.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueObserver for Outbox {
    fn snapshot(&self) -> Vec<JobView> {
        Self::snapshot(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

/// Owns the holding pool plus the promoter and delivery loops.
///
/// Callers keep an [`Outbox`] handle (from [`Self::outbox`]) for submissions,
/// withdrawals, force releases and snapshots; [`Self::serve`] drives
/// promotion and delivery until a shutdown signal arrives.
pub struct QueueService {
    config: QueueConfig,
    outbox: Outbox,
    transport: Arc<dyn Transport>,
    audit: Arc<dyn AuditLog>,
    tx: mpsc::Sender<JobId>,
    rx: Mutex<Option<mpsc::Receiver<JobId>>>,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("config", &self.config)
            .field("pending", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

impl QueueService {
    #[must_use]
    pub fn new(
        config: QueueConfig,
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.dispatch_buffer.max(1));
        let outbox = Outbox::new(config.max_pending, config.default_hold());
        Self {
            config,
            outbox,
            transport,
            audit,
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Handle for submitting, withdrawing, releasing and observing jobs.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Run the promoter tick and the delivery workers until shutdown.
    ///
    /// On shutdown the promoter stops claiming jobs and in-flight deliveries
    /// are allowed to finish before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::AlreadyServing`] if a serve loop is already
    /// running for this service.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ServeError> {
        let rx = self.rx.lock().take().ok_or(ServeError::AlreadyServing)?;
        let workers = self.config.workers.max(1);
        info!(
            workers,
            tick_secs = self.config.tick_interval_secs,
            "queue service starting"
        );

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut tasks = tokio::task::JoinSet::new();
        for worker_id in 0..workers {
            let ctx = worker::WorkerContext {
                worker_id,
                outbox: self.outbox.clone(),
                transport: Arc::clone(&self.transport),
                audit: Arc::clone(&self.audit),
                send_timeout: self.config.send_timeout(),
                retention: self.config.terminal_retention(),
            };
            tasks.spawn(worker::run(ctx, Arc::clone(&rx), shutdown.resubscribe()));
        }

        let mut tick = time::interval(self.config.tick_interval());
        // The first tick completes immediately; skip it so a fresh pool is
        // not scanned before anything can be due.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.promote_due(Instant::now());
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => info!("queue service received shutdown signal"),
                        Err(e) => warn!("shutdown channel error: {e}"),
                    }
                    break;
                }
            }
        }

        // Let in-flight deliveries finish before returning.
        while tasks.join_next().await.is_some() {}
        info!("queue service stopped");
        Ok(())
    }

    /// One promoter pass: claim every due waiting job, oldest id first, and
    /// hand it to the dispatch channel.
    ///
    /// A full channel leaves the remainder waiting for the next tick; a
    /// fault while claiming one job is isolated so the tick loop survives.
    fn promote_due(&self, now: Instant) {
        for id in self.outbox.due_waiting(now) {
            let permit = match self.tx.try_reserve() {
                Ok(permit) => permit,
                Err(mpsc::error::TrySendError::Full(())) => {
                    debug!("dispatch channel full, deferring remaining due jobs");
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(())) => {
                    error!("dispatch channel closed, promoter idle");
                    return;
                }
            };

            match std::panic::catch_unwind(AssertUnwindSafe(|| self.outbox.promote(id, now))) {
                Ok(true) => {
                    debug!(%id, "promoted for dispatch");
                    permit.send(id);
                }
                // Withdrawn in the meantime, or no longer due: the withdraw
                // wins the race and the unused permit is simply dropped.
                Ok(false) => {}
                Err(_) => error!(%id, "promotion fault isolated, job skipped this tick"),
            }
        }
    }
}
