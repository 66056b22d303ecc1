//! Shared test doubles for queue integration tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use respite_queue::{
    AuditLog, AuditRecord, Job, Recipient, Submission, TlsMode, Transport, TransportConfig,
    TransportError,
};

/// Transport double that records delivery order and fails on demand.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Every recipient handed to `send`, in order.
    pub attempted: Mutex<Vec<String>>,
    /// Recipients that completed successfully, in order.
    pub delivered: Mutex<Vec<String>>,
    /// Recipients whose delivery should be rejected.
    pub fail_for: Mutex<HashSet<String>>,
    /// Artificial per-send latency.
    pub delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, email: &str) {
        self.fail_for.lock().unwrap().insert(email.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        let email = job.recipient.email.clone();
        self.attempted.lock().unwrap().push(email.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_for.lock().unwrap().contains(&email) {
            return Err(TransportError::Rejected {
                code: 550,
                message: "mailbox unavailable".to_string(),
            });
        }

        self.delivered.lock().unwrap().push(email);
        Ok(())
    }
}

/// Audit log double that captures every record.
#[derive(Debug, Default)]
pub struct CapturingAudit {
    pub records: Mutex<Vec<AuditRecord>>,
}

impl CapturingAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditLog for CapturingAudit {
    fn append(&self, record: &AuditRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

pub fn transport_config() -> Arc<TransportConfig> {
    Arc::new(TransportConfig {
        sender: "organizer@example.edu".to_string(),
        password: "app-password".to_string(),
        host: "smtp.example.edu".to_string(),
        port: 465,
        tls: TlsMode::Implicit,
    })
}

/// A valid submission for `email`, holding for `hold`.
pub fn submission(email: &str, hold: Duration) -> Submission {
    Submission {
        recipient: Recipient {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
        },
        subject: "Invitation".to_string(),
        body: "Dear colleague, ...".to_string(),
        attachments: Vec::new(),
        config: transport_config(),
        hold: Some(hold),
    }
}
