//! Gateway client error types
//!
//! Every fault that can end a connect attempt is a `GatewayError`; `classify`
//! decides whether the supervising loop retries and whether the session survives.

use crate::buffer::BufferError;
use crate::connection::ConnectionState;
use crate::protocol::CloseCode;
use thiserror::Error;

/// Gateway client error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The socket was closed, optionally with a close code
    #[error("Connection closed (code: {code:?}): {reason}")]
    TransportClosed { code: Option<u16>, reason: String },

    /// The transport failed to open, read, or write
    #[error("Transport error: {0}")]
    Transport(String),

    /// The attempt did not become ready in time
    #[error("Timed out waiting for the gateway to become ready")]
    ConnectTimeout,

    /// The server asked the client to reconnect with a fresh session
    #[error("Server requested a reconnect")]
    ReconnectRequested,

    /// The server refused to resume the stored session
    #[error("Session resume rejected by the server")]
    ResumeFailed,

    /// No heartbeat reply or other traffic within the liveness window
    #[error("Server missed last heartbeat")]
    MissedHeartbeat,

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server violated the gateway protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A frame could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not allowed in the current connection state
    #[error("Invalid state: expected {expected:?}, was {actual:?}")]
    InvalidState {
        expected: ConnectionState,
        actual: ConnectionState,
    },

    /// `start` was called while a supervising loop is alive
    #[error("Connection manager already running")]
    AlreadyRunning,

    /// The operation was cancelled by a stop or a newer attempt
    #[error("Operation cancelled")]
    Cancelled,

    /// The sequenced event buffer refused a frame
    #[error("Event buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// How the connection manager reacts to a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff; `clear_session` forces the next attempt to start fresh
    Recoverable { clear_session: bool },
    /// Stop the supervising loop and forget the session
    Critical,
}

impl ErrorClass {
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }

    /// Whether the stored session must be discarded
    #[must_use]
    pub const fn clears_session(self) -> bool {
        match self {
            Self::Recoverable { clear_session } => clear_session,
            Self::Critical => true,
        }
    }
}

impl GatewayError {
    /// Classify this error as recoverable or critical
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::TransportClosed { code: Some(code), .. } => match CloseCode::from_u16(*code) {
                Some(close) if !close.should_reconnect() => ErrorClass::Critical,
                Some(close) => ErrorClass::Recoverable {
                    clear_session: close.invalidates_session(),
                },
                None => ErrorClass::Recoverable { clear_session: false },
            },
            Self::AuthenticationFailed(_) => ErrorClass::Critical,
            Self::ReconnectRequested | Self::ResumeFailed => {
                ErrorClass::Recoverable { clear_session: true }
            }
            Self::TransportClosed { code: None, .. }
            | Self::Transport(_)
            | Self::ConnectTimeout
            | Self::MissedHeartbeat
            | Self::Protocol(_)
            | Self::Serialization(_)
            | Self::InvalidState { .. }
            | Self::AlreadyRunning
            | Self::Cancelled
            | Self::Buffer(_) => ErrorClass::Recoverable { clear_session: false },
        }
    }

    /// Build a close error from a raw close code and reason
    #[must_use]
    pub fn closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::TransportClosed {
            code,
            reason: reason.into(),
        }
    }
}

/// Gateway client result type
pub type GatewayResult<T> = Result<T, GatewayError>;
