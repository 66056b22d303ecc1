//! The holding pool: jobs awaiting release, keyed by id.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::{
    error::{SubmitError, WithdrawError},
    job::{Job, JobId, JobStatus, JobView, Submission},
};

/// Thread-safe holding pool for jobs awaiting dispatch.
///
/// Cloning is cheap; every clone refers to the same pool, so a clone serves
/// as the handle the caller keeps for submissions, withdrawals and
/// observation while the service loops run elsewhere.
///
/// Every status mutation happens under the job's map entry lock, so a
/// withdraw and a promotion can never both succeed for the same job. No lock
/// is ever held across I/O.
#[derive(Debug, Clone)]
pub struct Outbox {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    jobs: DashMap<JobId, Job>,
    next_id: AtomicU64,
    max_pending: usize,
    default_hold: Duration,
}

impl Outbox {
    #[must_use]
    pub fn new(max_pending: usize, default_hold: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: DashMap::new(),
                next_id: AtomicU64::new(1),
                max_pending,
                default_hold,
            }),
        }
    }

    /// Validate and admit a submission.
    ///
    /// The job becomes visible to the promoter and the observer immediately,
    /// with `release_at` set to now plus the holding period.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Invalid`] for missing or malformed fields, which are
    /// never admitted, and [`SubmitError::QueueFull`] once the pool holds
    /// `max_pending` jobs.
    pub fn submit(&self, submission: Submission) -> Result<JobId, SubmitError> {
        validate(&submission)?;
        if self.inner.jobs.len() >= self.inner.max_pending {
            return Err(SubmitError::QueueFull {
                capacity: self.inner.max_pending,
            });
        }

        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let hold = submission.hold.unwrap_or(self.inner.default_hold);
        let release_at = Instant::now() + hold;
        self.inner.jobs.insert(id, Job::new(id, submission, release_at));
        Ok(id)
    }

    /// Withdraw a waiting job, deleting it from the pool.
    ///
    /// The removal is atomic with the status check: a job the promoter has
    /// already claimed cannot be withdrawn, and a withdrawn job can no
    /// longer be promoted. Exactly one of the two wins any race.
    ///
    /// # Errors
    ///
    /// [`WithdrawError::InvalidState`] if the job is sending or terminal
    /// (it is left untouched), [`WithdrawError::Unknown`] if the id was
    /// never seen or already removed.
    pub fn withdraw(&self, id: JobId) -> Result<(), WithdrawError> {
        if self
            .inner
            .jobs
            .remove_if(&id, |_, job| job.status == JobStatus::Waiting)
            .is_some()
        {
            return Ok(());
        }

        match self.inner.jobs.get(&id) {
            Some(job) => Err(WithdrawError::InvalidState(id, job.status)),
            None => Err(WithdrawError::Unknown(id)),
        }
    }

    /// Make one waiting job immediately eligible for promotion.
    ///
    /// Only `release_at` moves; the status is untouched and dispatch still
    /// flows through the promoter on its next tick, preserving the single
    /// transition path. Returns `false` for unknown or non-waiting jobs.
    pub fn release_now(&self, id: JobId) -> bool {
        self.inner.jobs.get_mut(&id).is_some_and(|mut entry| {
            let job = entry.value_mut();
            if job.status == JobStatus::Waiting {
                job.release_at = Instant::now();
                true
            } else {
                false
            }
        })
    }

    /// Make every waiting job immediately eligible for promotion.
    ///
    /// Returns the number of jobs affected.
    pub fn release_all(&self) -> usize {
        let now = Instant::now();
        let mut released = 0;
        for mut entry in self.inner.jobs.iter_mut() {
            let job = entry.value_mut();
            if job.status == JobStatus::Waiting {
                job.release_at = now;
                released += 1;
            }
        }
        released
    }

    /// Ordered point-in-time view of the pool, ascending by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<JobView> {
        let now = Instant::now();
        let mut views: Vec<JobView> = self
            .inner
            .jobs
            .iter()
            .map(|entry| view(entry.value(), now))
            .collect();
        views.sort_by_key(|v| v.id);
        views
    }

    /// Clone of a single job's current state.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.jobs.get(&id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Waiting jobs due at `now`, ascending by id (submission order).
    pub(crate) fn due_waiting(&self, now: Instant) -> Vec<JobId> {
        let mut due: Vec<JobId> = self
            .inner
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.status == JobStatus::Waiting && job.release_at <= now
            })
            .map(|entry| *entry.key())
            .collect();
        due.sort_unstable();
        due
    }

    /// Claim a due waiting job for dispatch (`Waiting` → `Sending`).
    ///
    /// Re-checks status and due-ness under the entry lock, so a concurrent
    /// withdraw wins the race and this returns `false`.
    pub(crate) fn promote(&self, id: JobId, now: Instant) -> bool {
        self.inner.jobs.get_mut(&id).is_some_and(|mut entry| {
            let job = entry.value_mut();
            if job.status == JobStatus::Waiting && job.release_at <= now {
                job.status = JobStatus::Sending;
                true
            } else {
                false
            }
        })
    }

    /// Record a terminal outcome (`Sending` → `Sent`/`Failed`).
    ///
    /// Only the worker calls this; jobs in any other state are untouched.
    pub(crate) fn finalize(&self, id: JobId, result: Result<(), String>) {
        if let Some(mut entry) = self.inner.jobs.get_mut(&id) {
            let job = entry.value_mut();
            if job.status == JobStatus::Sending {
                match result {
                    Ok(()) => job.status = JobStatus::Sent,
                    Err(reason) => {
                        job.status = JobStatus::Failed;
                        job.error = Some(reason);
                    }
                }
            }
        }
    }

    /// Drop a terminal job once its retention grace has elapsed.
    pub(crate) fn remove_terminal(&self, id: JobId) {
        self.inner
            .jobs
            .remove_if(&id, |_, job| job.status.is_terminal());
    }
}

fn view(job: &Job, now: Instant) -> JobView {
    let remaining_secs = (job.status == JobStatus::Waiting)
        .then(|| job.release_at.saturating_duration_since(now).as_secs());
    JobView {
        id: job.id,
        recipient: job.recipient.clone(),
        subject: job.subject.clone(),
        remaining_secs,
        status: job.status,
        error: job.error.clone(),
    }
}

fn validate(submission: &Submission) -> Result<(), SubmitError> {
    let recipient = &submission.recipient;
    if recipient.email.trim().is_empty() || !recipient.email.contains('@') {
        return Err(SubmitError::Invalid("recipient email"));
    }
    if submission.subject.trim().is_empty() {
        return Err(SubmitError::Invalid("subject"));
    }
    if submission.body.trim().is_empty() {
        return Err(SubmitError::Invalid("body"));
    }

    let config = &submission.config;
    if config.host.trim().is_empty() {
        return Err(SubmitError::Invalid("server host"));
    }
    if config.port == 0 {
        return Err(SubmitError::Invalid("server port"));
    }
    if config.sender.trim().is_empty() {
        return Err(SubmitError::Invalid("sender address"));
    }
    if config.password.is_empty() {
        return Err(SubmitError::Invalid("credentials"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::job::{Recipient, TlsMode, TransportConfig};

    fn config() -> Arc<TransportConfig> {
        Arc::new(TransportConfig {
            sender: "organizer@example.edu".to_string(),
            password: "app-password".to_string(),
            host: "smtp.example.edu".to_string(),
            port: 465,
            tls: TlsMode::Implicit,
        })
    }

    fn submission(email: &str) -> Submission {
        Submission {
            recipient: Recipient {
                name: "Prof. Chen".to_string(),
                email: email.to_string(),
            },
            subject: "Invitation".to_string(),
            body: "Dear Prof. Chen, ...".to_string(),
            attachments: Vec::new(),
            config: config(),
            hold: Some(Duration::from_secs(30)),
        }
    }

    fn pool() -> Outbox {
        Outbox::new(64, Duration::from_secs(30))
    }

    #[test]
    fn submit_assigns_monotonic_ids() {
        let pool = pool();
        let a = pool.submit(submission("a@example.edu")).unwrap();
        let b = pool.submit(submission("b@example.edu")).unwrap();
        pool.withdraw(a).unwrap();
        let c = pool.submit(submission("c@example.edu")).unwrap();
        assert!(a < b && b < c, "ids must grow even across removals");
    }

    #[test]
    fn submit_rejects_incomplete_fields() {
        let pool = pool();

        let mut bad = submission("a@example.edu");
        bad.recipient.email = "not-an-address".to_string();
        assert_eq!(
            pool.submit(bad),
            Err(SubmitError::Invalid("recipient email"))
        );

        let mut bad = submission("a@example.edu");
        bad.subject = "  ".to_string();
        assert_eq!(pool.submit(bad), Err(SubmitError::Invalid("subject")));

        let mut bad = submission("a@example.edu");
        bad.body = String::new();
        assert_eq!(pool.submit(bad), Err(SubmitError::Invalid("body")));

        let mut bad = submission("a@example.edu");
        bad.config = Arc::new(TransportConfig {
            host: String::new(),
            ..(*config()).clone()
        });
        assert_eq!(pool.submit(bad), Err(SubmitError::Invalid("server host")));

        let mut bad = submission("a@example.edu");
        bad.config = Arc::new(TransportConfig {
            port: 0,
            ..(*config()).clone()
        });
        assert_eq!(pool.submit(bad), Err(SubmitError::Invalid("server port")));

        assert!(pool.is_empty(), "rejected submissions must not be admitted");
    }

    #[test]
    fn submit_rejects_when_full() {
        let pool = Outbox::new(2, Duration::from_secs(30));
        pool.submit(submission("a@example.edu")).unwrap();
        pool.submit(submission("b@example.edu")).unwrap();
        assert_eq!(
            pool.submit(submission("c@example.edu")),
            Err(SubmitError::QueueFull { capacity: 2 })
        );
    }

    #[test]
    fn withdraw_deletes_waiting_job() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        pool.withdraw(id).unwrap();
        assert!(pool.get(id).is_none());
        assert_eq!(pool.withdraw(id), Err(WithdrawError::Unknown(id)));
    }

    #[test]
    fn withdraw_refuses_promoted_job() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        pool.release_now(id);
        assert!(pool.promote(id, Instant::now()));
        assert_eq!(
            pool.withdraw(id),
            Err(WithdrawError::InvalidState(id, JobStatus::Sending))
        );
        // The job is still there, untouched.
        assert_eq!(pool.get(id).unwrap().status(), JobStatus::Sending);
    }

    #[test]
    fn withdraw_refuses_terminal_job_idempotently() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        pool.release_now(id);
        assert!(pool.promote(id, Instant::now()));
        pool.finalize(id, Err("550 mailbox unavailable".to_string()));

        for _ in 0..2 {
            assert_eq!(
                pool.withdraw(id),
                Err(WithdrawError::InvalidState(id, JobStatus::Failed))
            );
        }
        assert_eq!(
            pool.get(id).unwrap().error(),
            Some("550 mailbox unavailable")
        );
    }

    #[test]
    fn promote_loses_race_to_withdraw() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        pool.release_now(id);
        pool.withdraw(id).unwrap();
        assert!(!pool.promote(id, Instant::now()));
    }

    #[test]
    fn promote_refuses_undue_job() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        assert!(!pool.promote(id, Instant::now()));
        assert_eq!(pool.get(id).unwrap().status(), JobStatus::Waiting);
    }

    #[test]
    fn exactly_one_of_withdraw_and_promote_wins() {
        // Hammer the same race from two threads; for every job exactly one
        // side must succeed.
        let pool = Outbox::new(4096, Duration::ZERO);
        let ids: Vec<JobId> = (0..200)
            .map(|n| pool.submit(submission(&format!("r{n}@example.edu"))).unwrap())
            .collect();
        let now = Instant::now();

        std::thread::scope(|scope| {
            let withdrawer = scope.spawn(|| {
                ids.iter()
                    .filter(|id| pool.withdraw(**id).is_ok())
                    .count()
            });
            let promoter = scope.spawn(|| {
                ids.iter().filter(|id| pool.promote(**id, now)).count()
            });
            let withdrawn = withdrawer.join().unwrap();
            let promoted = promoter.join().unwrap();
            assert_eq!(withdrawn + promoted, ids.len());
        });
    }

    #[test]
    fn due_waiting_is_fifo_by_id() {
        let pool = Outbox::new(64, Duration::ZERO);
        let a = pool.submit(submission("a@example.edu")).unwrap();
        let b = pool.submit(submission("b@example.edu")).unwrap();
        let c = pool.submit(submission("c@example.edu")).unwrap();
        let due = pool.due_waiting(Instant::now());
        assert_eq!(due, vec![a, b, c]);
    }

    #[test]
    fn release_now_only_touches_waiting_jobs() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        assert!(pool.release_now(id));
        assert!(pool.promote(id, Instant::now()));
        assert!(!pool.release_now(id), "sending jobs cannot be re-released");
    }

    #[test]
    fn release_all_counts_waiting_only() {
        let pool = pool();
        let a = pool.submit(submission("a@example.edu")).unwrap();
        let _b = pool.submit(submission("b@example.edu")).unwrap();
        pool.release_now(a);
        pool.promote(a, Instant::now());
        assert_eq!(pool.release_all(), 1);
    }

    #[test]
    fn snapshot_is_ordered_with_remaining_sentinel() {
        let pool = pool();
        let a = pool.submit(submission("a@example.edu")).unwrap();
        let b = pool.submit(submission("b@example.edu")).unwrap();
        pool.release_now(b);
        pool.promote(b, Instant::now());

        let views = pool.snapshot();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, a);
        assert_eq!(views[1].id, b);
        assert!(views[0].remaining_secs.is_some());
        assert_eq!(views[0].status, JobStatus::Waiting);
        assert_eq!(views[1].remaining_secs, None);
        assert_eq!(views[1].status, JobStatus::Sending);
    }

    #[test]
    fn remove_terminal_spares_active_jobs() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        pool.remove_terminal(id);
        assert!(pool.get(id).is_some(), "waiting jobs must not be reaped");

        pool.release_now(id);
        pool.promote(id, Instant::now());
        pool.finalize(id, Ok(()));
        pool.remove_terminal(id);
        assert!(pool.get(id).is_none());
    }

    #[test]
    fn finalize_only_applies_to_sending_jobs() {
        let pool = pool();
        let id = pool.submit(submission("a@example.edu")).unwrap();
        pool.finalize(id, Ok(()));
        assert_eq!(pool.get(id).unwrap().status(), JobStatus::Waiting);
    }
}
