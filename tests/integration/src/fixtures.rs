//! Test fixtures
//!
//! Client configuration tuned for fast reconnects, and collectors for the
//! events the client hands back.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chat_gateway_client::connection::{BackoffConfig, ConnectionConfig};
use chat_gateway_client::heartbeat::HeartbeatConfig;
use chat_gateway_client::{ClientConfig, ClientEvent, EventHandler, GatewayEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::helpers::WAIT;

pub const TEST_TOKEN: &str = "test-token";

/// Client configuration with short backoff and a quiet heartbeat
pub fn test_config(url: &str) -> ClientConfig {
    ClientConfig::new(url, TEST_TOKEN)
        .with_connection(
            ConnectionConfig::default()
                .with_connect_timeout(Duration::from_secs(2))
                .with_backoff(BackoffConfig::new(
                    Duration::from_millis(20),
                    Duration::from_millis(200),
                )),
        )
        .with_heartbeat(HeartbeatConfig::new(Duration::from_secs(60)))
}

/// Forwards every dispatched event to the test
pub struct EventCollector {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl EventCollector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl EventHandler for EventCollector {
    async fn on_event(&self, event: GatewayEvent) -> anyhow::Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Collect the sequences of the next `count` dispatched events
pub async fn next_sequences(
    rx: &mut mpsc::UnboundedReceiver<GatewayEvent>,
    count: usize,
) -> Result<Vec<u64>> {
    let mut sequences = Vec::with_capacity(count);
    while sequences.len() < count {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .context("timed out waiting for an event")?
            .ok_or_else(|| anyhow!("event handler dropped"))?;
        sequences.push(event.sequence);
    }
    Ok(sequences)
}

/// Wait for the first lifecycle notification matching `predicate`
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<ClientEvent>, predicate: F) -> Result<ClientEvent>
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;

    loop {
        let received = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .context("timed out waiting for a client event")?;

        match received {
            Ok(event) if predicate(&event) => return Ok(event),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return Err(anyhow!("client event channel closed")),
        }
    }
}
