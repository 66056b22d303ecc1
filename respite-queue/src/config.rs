//! Queue service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_tick_interval() -> u64 {
    1
}

const fn default_hold() -> u64 {
    30
}

const fn default_workers() -> usize {
    1
}

const fn default_send_timeout() -> Option<u64> {
    Some(120)
}

const fn default_max_pending() -> usize {
    1024
}

const fn default_dispatch_buffer() -> usize {
    64
}

const fn default_terminal_retention() -> Option<u64> {
    Some(30)
}

/// Tunables for the queue service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How often the promoter scans the pool for due jobs (in seconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Holding period applied when a submission does not carry its own.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_hold")]
    pub default_hold_secs: u64,

    /// Number of delivery workers.
    ///
    /// One worker serializes all outbound sends, which is what most mail
    /// providers' connection limits want. Raising this only relaxes ordering
    /// across workers; each worker stays strictly FIFO.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on a single delivery attempt (in seconds).
    ///
    /// `None` leaves the attempt unbounded.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: Option<u64>,

    /// Admission cap on the holding pool. Submissions beyond this are
    /// rejected rather than queued.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Depth of the dispatch channel between the promoter and the workers.
    /// When full, due jobs stay waiting until the next tick.
    #[serde(default = "default_dispatch_buffer")]
    pub dispatch_buffer: usize,

    /// How long a `Sent`/`Failed` job stays visible in the pool before
    /// removal (in seconds). `None` retains terminal jobs until the process
    /// exits.
    #[serde(default = "default_terminal_retention")]
    pub terminal_retention_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            default_hold_secs: default_hold(),
            workers: default_workers(),
            send_timeout_secs: default_send_timeout(),
            max_pending: default_max_pending(),
            dispatch_buffer: default_dispatch_buffer(),
            terminal_retention_secs: default_terminal_retention(),
        }
    }
}

impl QueueConfig {
    pub(crate) const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub(crate) const fn default_hold(&self) -> Duration {
        Duration::from_secs(self.default_hold_secs)
    }

    pub(crate) const fn send_timeout(&self) -> Option<Duration> {
        match self.send_timeout_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        }
    }

    pub(crate) const fn terminal_retention(&self) -> Option<Duration> {
        match self.terminal_retention_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        }
    }
}
