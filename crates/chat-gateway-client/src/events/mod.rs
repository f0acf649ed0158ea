//! Events surfaced to the application
//!
//! Ordered gateway events go to a single [`EventHandler`]; lifecycle
//! notifications are broadcast as [`ClientEvent`]s to any number of listeners.

mod client_event;

pub use client_event::{ClientEvent, DropReason};

use async_trait::async_trait;
use serde_json::Value;

/// A gateway event released in sequence order
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub sequence: u64,
    /// Event name from the frame's `t` field
    pub event_type: Option<String>,
    pub data: Value,
}

/// Consumer of the ordered event stream
///
/// Called once per event in strictly increasing sequence order. An error is
/// logged and does not stop delivery.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn on_event(&self, event: GatewayEvent) -> anyhow::Result<()>;
}
