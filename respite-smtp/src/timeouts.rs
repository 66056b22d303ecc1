//! Per-operation SMTP timeout configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}

/// Timeout budget for each phase of the SMTP transaction, so a hung server
/// cannot stall the delivery worker indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// TCP connect plus, for TLS-on-connect sessions, the handshake.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Greeting, EHLO/HELO, STARTTLS, AUTH, MAIL FROM and RCPT TO.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// DATA and message transmission. Longer than the command timeout to
    /// accommodate large attachments.
    ///
    /// Default: 120 seconds
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// QUIT after a completed delivery.
    ///
    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

impl SmtpTimeouts {
    pub(crate) const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub(crate) const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub(crate) const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    pub(crate) const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}
