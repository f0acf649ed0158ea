//! Connection lifecycle state

use std::fmt;

/// Connection state
///
/// Only the connection manager writes it; everything else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport and no attempt in flight
    #[default]
    Disconnected,
    /// An attempt is opening the transport or waiting for ready
    Connecting,
    /// The session is ready and frames are flowing
    Connected,
    /// The transport is being torn down
    Disconnecting,
}

impl ConnectionState {
    /// Whether `next` directly follows `self` in the lifecycle
    ///
    /// An attempt that faults before ready moves from `Connecting` straight to
    /// `Disconnecting`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Disconnecting)
                | (Self::Connected, Self::Disconnecting)
                | (Self::Disconnecting, Self::Disconnected)
        )
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
