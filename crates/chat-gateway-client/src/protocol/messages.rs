//! Gateway message envelope
//!
//! Every frame on the wire is a JSON object `{op, t?, s?, d?}`.

use super::{HelloPayload, OpCode, ReconnectPayload, ResumeAckPayload, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Event)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Event)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    fn control(op: OpCode, d: Option<Value>) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    // === Client Messages ===

    /// Create a Ping probe (op=2) carrying the last delivered sequence
    #[must_use]
    pub fn ping(last_sequence: u64) -> Self {
        Self::control(OpCode::Ping, Some(Value::from(last_sequence)))
    }

    /// Create a Resume message (op=4)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(OpCode::Resume, Some(serde_json::to_value(payload)?)))
    }

    // === Server Messages ===

    /// Create an Event message (op=0)
    #[must_use]
    pub fn event(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Event,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Create a Hello message (op=1)
    pub fn hello(payload: &HelloPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(OpCode::Hello, Some(serde_json::to_value(payload)?)))
    }

    /// Create a Pong reply (op=3)
    #[must_use]
    pub fn pong() -> Self {
        Self::control(OpCode::Pong, None)
    }

    /// Create a Reconnect request (op=5)
    pub fn reconnect(payload: &ReconnectPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(OpCode::Reconnect, Some(serde_json::to_value(payload)?)))
    }

    /// Create a Resume ACK (op=6)
    pub fn resume_ack(payload: &ResumeAckPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(OpCode::ResumeAck, Some(serde_json::to_value(payload)?)))
    }

    // === Utilities ===

    /// Parse the body as a typed payload
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.d.clone().unwrap_or(Value::Null))
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
