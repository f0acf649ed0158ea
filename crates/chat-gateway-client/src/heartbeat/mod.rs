//! Heartbeat and liveness monitoring

mod monitor;

pub use monitor::{HeartbeatMonitor, LatencySample, ProbeSender};

use chat_common::HeartbeatSettings;
use std::time::Duration;

/// Heartbeat configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Probe interval used when the server does not advertise one
    pub interval: Duration,
    /// Grace added to the interval before silence counts as death
    pub slack: Duration,
}

impl HeartbeatConfig {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_slack(mut self, slack: Duration) -> Self {
        self.slack = slack;
        self
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            slack: Duration::from_secs(1),
        }
    }
}

impl From<&HeartbeatSettings> for HeartbeatConfig {
    fn from(settings: &HeartbeatSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms),
            slack: Duration::from_millis(settings.slack_ms),
        }
    }
}
