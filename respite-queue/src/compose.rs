//! Pre-submission composition: directory lookup and placeholder substitution.
//!
//! This runs once, at submission time. A job carries its final body text, so
//! later edits to the directory never change what a pending job will send.

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::job::{Recipient, Submission, TransportConfig};

/// Title and department details for a known contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    pub title: String,
    pub department: String,
}

/// Read-only contact lookup consulted while drafting submissions.
///
/// Unknown addresses simply resolve their placeholders to empty strings.
pub trait Directory {
    fn lookup(&self, email: &str) -> Option<ContactDetails>;
}

/// Substitute `{name}`, `{title}` and `{department}` placeholders.
#[must_use]
pub fn render_body(template: &str, name: &str, details: &ContactDetails) -> String {
    template
        .replace("{name}", name)
        .replace("{title}", &details.title)
        .replace("{department}", &details.department)
}

/// A message template plus the settings shared by a batch of recipients.
#[derive(Debug, Clone)]
pub struct Draft {
    pub subject: String,
    pub body_template: String,
    pub attachments: Vec<PathBuf>,
    pub config: Arc<TransportConfig>,
    pub hold: Option<Duration>,
}

/// Expand a draft into one submission per recipient, with placeholders
/// resolved against the directory.
#[must_use]
pub fn draft_submissions(
    draft: &Draft,
    recipients: &[Recipient],
    directory: &dyn Directory,
) -> Vec<Submission> {
    recipients
        .iter()
        .map(|recipient| {
            let details = directory.lookup(&recipient.email).unwrap_or_default();
            Submission {
                recipient: recipient.clone(),
                subject: draft.subject.clone(),
                body: render_body(&draft.body_template, &recipient.name, &details),
                attachments: draft.attachments.clone(),
                config: Arc::clone(&draft.config),
                hold: draft.hold,
            }
        })
        .collect()
}
