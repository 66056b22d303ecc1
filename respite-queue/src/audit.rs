//! Append-only audit log for delivery outcomes.
//!
//! Every job that reaches a terminal state produces exactly one record. The
//! core never reads the log back; it exists for the operator.

use chrono::{DateTime, Utc};
use tracing::Level;

/// Terminal outcome recorded for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Sent,
    Failed(String),
}

/// One record per finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
}

/// Append-only sink for delivery outcomes.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: &AuditRecord);
}

/// Audit log that emits structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog {
    /// Redact the local part of recipient addresses (PII protection).
    pub redact_recipients: bool,
}

impl AuditLog for TracingAuditLog {
    fn append(&self, record: &AuditRecord) {
        let recipient = redact_email(&record.recipient_email, self.redact_recipients);
        match &record.outcome {
            AuditOutcome::Sent => tracing::event!(
                Level::INFO,
                event = "DeliverySuccess",
                recipient_name = %record.recipient_name,
                recipient = %recipient,
                subject = %record.subject,
                timestamp = %record.timestamp.to_rfc3339(),
                "audit: delivery successful"
            ),
            AuditOutcome::Failed(reason) => tracing::event!(
                Level::WARN,
                event = "DeliveryFailure",
                recipient_name = %record.recipient_name,
                recipient = %recipient,
                subject = %record.subject,
                timestamp = %record.timestamp.to_rfc3339(),
                error = %reason,
                "audit: delivery failed"
            ),
        }
    }
}

/// Redact the local part of an address, keeping the domain.
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}
