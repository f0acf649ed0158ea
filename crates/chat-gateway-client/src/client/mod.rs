//! Gateway session client
//!
//! Wires the WebSocket transport into the connection manager, the heartbeat
//! monitor, and the sequenced delivery buffer.

mod config;
mod dispatch;
mod transport;

pub use config::ClientConfig;
pub use dispatch::EventBody;

use crate::connection::{ConnectionManager, ConnectionState, SessionDescriptor};
use crate::error::GatewayResult;
use crate::events::{ClientEvent, EventHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use transport::GatewayTransport;

/// A self-healing gateway session
///
/// Events reach the [`EventHandler`] in sequence order across reconnects and
/// resumes. Lifecycle notifications are available through [`subscribe`].
///
/// [`subscribe`]: GatewayClient::subscribe
pub struct GatewayClient {
    manager: ConnectionManager,
    transport: Arc<GatewayTransport>,
}

impl GatewayClient {
    #[must_use]
    pub fn new(config: ClientConfig, handler: Arc<dyn EventHandler>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let connection = config.connection;

        let transport = Arc::new(GatewayTransport::new(config, handler, events.clone()));
        let manager = ConnectionManager::new(connection, transport.clone(), events);

        Self { manager, transport }
    }

    /// Start connecting in the background
    pub async fn start(&self) -> GatewayResult<()> {
        self.manager.start().await
    }

    /// Close the connection and stop delivering events
    ///
    /// The session descriptor is kept, so a later `start` resumes.
    pub async fn stop(&self) {
        self.manager.stop().await;
        self.transport.shutdown().await;
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.manager.subscribe()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    #[must_use]
    pub fn session(&self) -> SessionDescriptor {
        self.manager.session()
    }

    /// Last measured heartbeat round trip
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.transport.heartbeat().latency()
    }

    #[must_use]
    pub fn subscribe_latency(&self) -> watch::Receiver<Option<Duration>> {
        self.transport.heartbeat().subscribe_latency()
    }

    /// Hold off missed-heartbeat detection while initial state is processed
    pub fn begin_bulk_sync(&self) {
        self.transport.heartbeat().begin_bulk_sync();
    }

    pub fn finish_bulk_sync(&self) {
        self.transport.heartbeat().finish_bulk_sync();
    }

    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("manager", &self.manager)
            .finish()
    }
}
