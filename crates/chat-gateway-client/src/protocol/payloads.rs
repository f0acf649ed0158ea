//! Payload definitions
//!
//! The `d` bodies of the control frames exchanged with the gateway.

use serde::{Deserialize, Serialize};

/// Payload for op 1 (Hello)
///
/// Sent by the server immediately after the upgrade is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Session id the server assigned to this connection
    pub session_id: String,

    /// Heartbeat interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,
}

impl HelloPayload {
    /// Create a Hello payload without an advertised interval
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            heartbeat_interval: None,
        }
    }

    /// Advertise a heartbeat interval
    #[must_use]
    pub fn with_interval(mut self, heartbeat_interval: u64) -> Self {
        self.heartbeat_interval = Some(heartbeat_interval);
        self
    }
}

/// Payload for op 4 (Resume)
///
/// Sent by the client after Hello to pick up a dropped session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Session id to resume
    pub session_id: String,

    /// Last sequence number the client delivered
    pub seq: u64,
}

/// Payload for op 6 (Resume ACK)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeAckPayload {
    /// The resumed session id
    pub session_id: String,
}

/// Payload for op 5 (Reconnect); every field is optional on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
