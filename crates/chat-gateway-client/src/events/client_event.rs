//! Client lifecycle notifications

use crate::connection::ConnectionState;
use crate::error::GatewayError;
use std::fmt;
use std::sync::Arc;

/// Why an event frame never reached the handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The delivery buffer was full
    BufferFull,
    /// The body could not be decoded; its sequence was still consumed
    Undecodable(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferFull => f.write_str("buffer full"),
            Self::Undecodable(reason) => write!(f, "undecodable: {reason}"),
        }
    }
}

/// Notification broadcast to client listeners
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    /// The session is usable
    Ready { session_id: String, resumed: bool },
    /// The transport went away; `error` is `None` for an intentional stop
    Disconnected {
        error: Option<Arc<GatewayError>>,
        will_reconnect: bool,
    },
    /// A heartbeat round trip completed
    LatencyUpdated {
        previous_ms: Option<u64>,
        current_ms: u64,
    },
    FrameDropped { sequence: u64, reason: DropReason },
    /// A gap timed out; sequences `from..=to` will never be delivered
    GapSkipped { from: u64, to: u64 },
}

impl ClientEvent {
    /// Event name for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "STATE_CHANGED",
            Self::Ready { .. } => "READY",
            Self::Disconnected { .. } => "DISCONNECTED",
            Self::LatencyUpdated { .. } => "LATENCY_UPDATED",
            Self::FrameDropped { .. } => "FRAME_DROPPED",
            Self::GapSkipped { .. } => "GAP_SKIPPED",
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { old, new } => write!(f, "{}({old} -> {new})", self.name()),
            Self::Ready {
                session_id,
                resumed,
            } => write!(f, "{}(session={session_id}, resumed={resumed})", self.name()),
            Self::Disconnected {
                error,
                will_reconnect,
            } => match error {
                Some(e) => write!(f, "{}({e}, will_reconnect={will_reconnect})", self.name()),
                None => write!(f, "{}(will_reconnect={will_reconnect})", self.name()),
            },
            Self::LatencyUpdated { current_ms, .. } => {
                write!(f, "{}({current_ms}ms)", self.name())
            }
            Self::FrameDropped { sequence, reason } => {
                write!(f, "{}(s={sequence}, {reason})", self.name())
            }
            Self::GapSkipped { from, to } => write!(f, "{}(s={from}..={to})", self.name()),
        }
    }
}
