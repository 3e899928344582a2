//! Host-process bridge: intents in, events and log lines out.
//!
//! The core never talks to the hosting UI directly. Inbound server events
//! and lifecycle notices leave through [`Bridge::send_to_ui`], log lines go
//! to [`Bridge::log`], and host intents arrive as a stream of [`UiIntent`]
//! values consumed by [`crate::session::Session::run`].

pub mod stdio;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::domain::LifecycleNotice;
use crate::error::InvokeReply;

/// Severity of a bridge log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine progress.
    Info,
    /// Recoverable failure.
    Warn,
    /// Terminal failure.
    Error,
}

/// Outbound side of the host bridge.
pub trait Bridge: Send + Sync + fmt::Debug {
    /// Forwards an event and its argument list to the host.
    fn send_to_ui(&self, event: &str, args: Vec<Value>);

    /// Writes one line to the host's log sink.
    fn log(&self, level: LogLevel, message: &str);

    /// Forwards a lifecycle notice under its event name.
    fn notify(&self, notice: &LifecycleNotice) {
        self.send_to_ui(notice.event_name(), notice.args());
    }

    /// Logs at info level to `tracing` and the host sink.
    fn info(&self, message: &str) {
        tracing::info!("{message}");
        self.log(LogLevel::Info, message);
    }

    /// Logs at warn level to `tracing` and the host sink.
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
        self.log(LogLevel::Warn, message);
    }

    /// Logs at error level to `tracing` and the host sink.
    fn error(&self, message: &str) {
        tracing::error!("{message}");
        self.log(LogLevel::Error, message);
    }
}

/// One request from the host process.
#[derive(Debug)]
pub enum UiIntent {
    /// Fire-and-forget event for the server.
    Message {
        /// Event name.
        event: String,
        /// Argument list, forwarded verbatim.
        args: Vec<Value>,
    },
    /// Acknowledged call; the outcome is sent on `reply`.
    Invoke {
        /// Event name.
        event: String,
        /// Call payload.
        payload: Value,
        /// Receives the call's outcome.
        reply: oneshot::Sender<InvokeReply>,
    },
    /// Open the channel with a bearer token.
    Connect {
        /// Raw token.
        token: String,
    },
    /// Close the channel.
    Disconnect,
}
