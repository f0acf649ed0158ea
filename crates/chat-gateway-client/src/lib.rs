//! # chat-gateway-client
//!
//! Session reliability for a real-time chat gateway: ordered event delivery,
//! heartbeat liveness, and supervised reconnects with session resume.

pub mod buffer;
pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod protocol;

pub use client::{ClientConfig, GatewayClient};
pub use connection::{ConnectionManager, ConnectionState, SessionDescriptor};
pub use error::{ErrorClass, GatewayError, GatewayResult};
pub use events::{ClientEvent, EventHandler, GatewayEvent};
