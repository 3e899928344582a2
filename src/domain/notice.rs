//! Lifecycle notices forwarded to the host process.
//!
//! Every connection state transition the host cares about is expressed as a
//! [`LifecycleNotice`] and delivered through
//! [`crate::bridge::Bridge::send_to_ui`] under its [`event_name`].
//!
//! [`event_name`]: LifecycleNotice::event_name

use serde_json::Value;

use super::HeartbeatReport;

/// Reason forwarded when the client itself closes the channel.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Connectivity signal for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleNotice {
    /// The channel opened.
    Connect,
    /// The channel closed.
    Disconnect {
        /// Why the channel closed.
        reason: String,
    },
    /// A connection attempt failed.
    ConnectError {
        /// Transport error message.
        message: String,
    },
    /// A probe was acknowledged in time.
    Heartbeat(HeartbeatReport),
}

impl LifecycleNotice {
    /// Returns the event name the notice is forwarded under.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectError { .. } => "connect_error",
            Self::Heartbeat(_) => "heartbeat",
        }
    }

    /// Returns the argument list forwarded with the notice.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::Connect => Vec::new(),
            Self::Disconnect { reason } => vec![Value::String(reason.clone())],
            Self::ConnectError { message } => vec![Value::String(message.clone())],
            Self::Heartbeat(report) => {
                vec![serde_json::to_value(report).unwrap_or_default()]
            }
        }
    }
}
