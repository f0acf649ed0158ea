//! Connection lifecycle
//!
//! Supervises connect attempts, backoff, error classification, and the
//! session resume decision.

mod attempt;
mod backoff;
mod manager;
mod session;
mod state;

pub use attempt::AttemptContext;
pub use backoff::{Backoff, BackoffConfig};
pub use manager::ConnectionManager;
pub use session::{ConnectMode, SessionDescriptor, SessionHandle, SessionReady};
pub use state::ConnectionState;

use crate::error::GatewayResult;
use async_trait::async_trait;
use chat_common::ClientSettings;
use std::time::Duration;

/// Transport callbacks driven by the [`ConnectionManager`]
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Open and authenticate the transport
    ///
    /// Returns once the transport is open; the session becomes ready later
    /// through [`AttemptContext::signal_ready`]. Faults after this returns go
    /// through [`AttemptContext::fault`]. The attempt counts as abandoned once
    /// every clone of `ctx` is dropped.
    async fn connect(&self, ctx: AttemptContext) -> GatewayResult<()>;

    /// Close the transport opened by the last `connect`
    async fn teardown(&self) -> GatewayResult<()>;
}

/// Connection manager configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Window in which an attempt must signal ready
    pub connect_timeout: Duration,
    pub backoff: BackoffConfig,
    /// Consecutive unfinished resumes before the next attempt starts fresh
    pub resume_max_attempts: u32,
}

impl ConnectionConfig {
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_resume_max_attempts(mut self, attempts: u32) -> Self {
        self.resume_max_attempts = attempts;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            resume_max_attempts: 3,
        }
    }
}

impl From<&ClientSettings> for ConnectionConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            connect_timeout: Duration::from_millis(settings.gateway.connect_timeout_ms),
            backoff: BackoffConfig::from(&settings.reconnect),
            resume_max_attempts: settings.reconnect.resume_max_attempts,
        }
    }
}
