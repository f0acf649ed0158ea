//! Decoded inbound frames
//!
//! The reader turns every text message into exactly one [`Frame`] variant,
//! so routing is an exhaustive match instead of a lookup on `op`.

use super::{GatewayMessage, HelloPayload, OpCode, ReconnectPayload, ResumeAckPayload};
use serde_json::Value;
use thiserror::Error;

/// A frame received from the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello(HelloPayload),
    Event {
        sequence: u64,
        event_type: Option<String>,
        data: Value,
    },
    /// The server requests an immediate probe
    Ping,
    Pong,
    Reconnect(ReconnectPayload),
    ResumeAck(ResumeAckPayload),
}

/// Why a text message could not become a [`Frame`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Undecodable body; `sequence` is set when the envelope still carried one
    #[error("Malformed frame (sequence: {sequence:?}): {reason}")]
    Malformed {
        sequence: Option<u64>,
        reason: String,
    },

    /// A client-only op code arrived from the server
    #[error("Unexpected op code from server: {0}")]
    UnexpectedOp(OpCode),
}

impl FrameError {
    fn malformed(sequence: Option<u64>, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            sequence,
            reason: reason.to_string(),
        }
    }

    /// The sequence number the broken frame occupied, if any
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Malformed { sequence, .. } => *sequence,
            Self::UnexpectedOp(_) => None,
        }
    }
}

impl Frame {
    /// Decode a text message
    ///
    /// The sequence number is salvaged before the full envelope is parsed so a
    /// broken event still occupies its slot in the ordering.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: Value = serde_json::from_str(text).map_err(|e| FrameError::malformed(None, e))?;
        let sequence = raw.get("s").and_then(Value::as_u64);

        let message: GatewayMessage =
            serde_json::from_value(raw).map_err(|e| FrameError::malformed(sequence, e))?;

        Self::try_from(message)
    }

    /// The frame's op code
    #[must_use]
    pub const fn op(&self) -> OpCode {
        match self {
            Self::Hello(_) => OpCode::Hello,
            Self::Event { .. } => OpCode::Event,
            Self::Ping => OpCode::Ping,
            Self::Pong => OpCode::Pong,
            Self::Reconnect(_) => OpCode::Reconnect,
            Self::ResumeAck(_) => OpCode::ResumeAck,
        }
    }
}

impl TryFrom<GatewayMessage> for Frame {
    type Error = FrameError;

    fn try_from(message: GatewayMessage) -> Result<Self, Self::Error> {
        match message.op {
            OpCode::Event => {
                let sequence = message
                    .s
                    .ok_or_else(|| FrameError::malformed(None, "event without sequence"))?;
                let data = message
                    .d
                    .ok_or_else(|| FrameError::malformed(Some(sequence), "event without body"))?;

                Ok(Self::Event {
                    sequence,
                    event_type: message.t,
                    data,
                })
            }
            OpCode::Hello => message
                .payload()
                .map(Self::Hello)
                .map_err(|e| FrameError::malformed(None, e)),
            OpCode::Ping => Ok(Self::Ping),
            OpCode::Pong => Ok(Self::Pong),
            OpCode::Reconnect => {
                // A bare Reconnect is still a reconnect request
                Ok(Self::Reconnect(message.payload().unwrap_or_default()))
            }
            OpCode::ResumeAck => message
                .payload()
                .map(Self::ResumeAck)
                .map_err(|e| FrameError::malformed(None, e)),
            OpCode::Resume => Err(FrameError::UnexpectedOp(message.op)),
        }
    }
}
