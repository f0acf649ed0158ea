//! Heartbeat monitor
//!
//! One monitor lives as long as the client. Each connection calls [`reset`]
//! and then drives [`run`] until the attempt is cancelled or the peer goes
//! silent.
//!
//! [`reset`]: HeartbeatMonitor::reset
//! [`run`]: HeartbeatMonitor::run

use super::HeartbeatConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sends one liveness probe
#[async_trait]
pub trait ProbeSender: Send + Sync {
    async fn send_probe(&self) -> GatewayResult<()>;
}

/// A completed round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub previous: Option<Duration>,
    pub current: Duration,
}

struct ProbeState {
    /// Send times of unanswered probes, oldest first
    outstanding: VecDeque<Instant>,
    last_inbound: Instant,
}

/// Periodic prober and reply matcher
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    probes: Mutex<ProbeState>,
    bulk_sync_pending: AtomicBool,
    latency: watch::Sender<Option<Duration>>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        let (latency, _) = watch::channel(None);
        Self {
            config,
            probes: Mutex::new(ProbeState {
                outstanding: VecDeque::new(),
                last_inbound: Instant::now(),
            }),
            bulk_sync_pending: AtomicBool::new(false),
            latency,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Forget probes from a previous connection
    pub fn reset(&self) {
        let mut probes = self.probes.lock();
        probes.outstanding.clear();
        probes.last_inbound = Instant::now();
    }

    /// Note inbound traffic of any kind
    pub fn record_inbound(&self) {
        self.probes.lock().last_inbound = Instant::now();
    }

    /// Match a reply against the oldest outstanding probe
    ///
    /// Replies carry no identifier, so a transport that reorders control
    /// frames yields wrong latencies.
    pub fn on_pong(&self) -> Option<LatencySample> {
        let now = Instant::now();
        let sent_at = {
            let mut probes = self.probes.lock();
            probes.last_inbound = now;
            probes.outstanding.pop_front()
        };

        let Some(sent_at) = sent_at else {
            tracing::debug!("Unsolicited heartbeat reply");
            return None;
        };

        let current = now.duration_since(sent_at);
        let previous = self.latency.send_replace(Some(current));
        tracing::trace!(latency_ms = current.as_millis() as u64, "Heartbeat acknowledged");

        Some(LatencySample { previous, current })
    }

    /// Suppress death detection while the consumer works through initial state
    pub fn begin_bulk_sync(&self) {
        self.bulk_sync_pending.store(true, Ordering::SeqCst);
    }

    pub fn finish_bulk_sync(&self) {
        self.bulk_sync_pending.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_bulk_sync_pending(&self) -> bool {
        self.bulk_sync_pending.load(Ordering::SeqCst)
    }

    /// Last measured round trip
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.borrow()
    }

    #[must_use]
    pub fn subscribe_latency(&self) -> watch::Receiver<Option<Duration>> {
        self.latency.subscribe()
    }

    /// Number of probes awaiting a reply
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.probes.lock().outstanding.len()
    }

    /// Send a probe outside the regular schedule
    ///
    /// A failed send is logged and leaves no outstanding probe behind.
    pub async fn probe<S>(&self, sender: &S)
    where
        S: ProbeSender + ?Sized,
    {
        self.probes.lock().outstanding.push_back(Instant::now());

        if let Err(e) = sender.send_probe().await {
            self.probes.lock().outstanding.pop_back();
            tracing::warn!(error = %e, "Failed to send heartbeat, retrying next tick");
        }
    }

    /// Probe every `interval` until cancelled or the peer is declared dead
    ///
    /// Returns `Ok(())` on cancellation and [`GatewayError::MissedHeartbeat`]
    /// when a probe went unanswered and nothing else arrived for longer than
    /// one interval plus slack. A zero interval is refused up front.
    pub async fn run<S>(
        &self,
        interval: Duration,
        sender: &S,
        cancel: CancellationToken,
    ) -> GatewayResult<()>
    where
        S: ProbeSender + ?Sized,
    {
        if interval.is_zero() {
            return Err(GatewayError::Protocol(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Heartbeat started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Heartbeat stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if self.is_silent(interval, Instant::now()) {
                tracing::warn!(
                    outstanding = self.outstanding(),
                    interval_ms = interval.as_millis() as u64,
                    "Heartbeat missed, connection presumed dead"
                );
                return Err(GatewayError::MissedHeartbeat);
            }

            self.probe(sender).await;
        }
    }

    fn is_silent(&self, interval: Duration, now: Instant) -> bool {
        if self.is_bulk_sync_pending() {
            return false;
        }

        let probes = self.probes.lock();
        !probes.outstanding.is_empty()
            && now.duration_since(probes.last_inbound) > interval + self.config.slack
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(HeartbeatConfig::default())
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("config", &self.config)
            .field("outstanding", &self.outstanding())
            .field("latency", &self.latency())
            .finish()
    }
}
