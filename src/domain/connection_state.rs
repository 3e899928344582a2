//! Lifecycle state of the single logical connection.

use std::fmt;

use serde::Serialize;

/// Connection lifecycle state, owned by [`crate::service::ConnectionManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel, or the channel gave up for good.
    #[default]
    Disconnected,
    /// A channel exists and is opening or reconnecting.
    Connecting,
    /// The channel is open.
    Connected,
}

impl ConnectionState {
    /// Returns the state as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    /// Returns `true` for [`ConnectionState::Connected`].
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
