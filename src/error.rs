//! Transport error types with failure-kind classification.
//!
//! [`TransportError`] is the central error type for the crate. Each variant
//! belongs to one [`ErrorKind`] and maps to a stable numeric code, and
//! [`InvokeReply`] is the structured reply handed back to the host process
//! for an acknowledged call.

use serde::Serialize;
use serde_json::Value;

/// Coarse failure taxonomy.
///
/// | Kind            | Retried by the dispatcher | Touches the network |
/// |-----------------|---------------------------|---------------------|
/// | `Transport`     | yes, up to the bound      | yes                 |
/// | `Application`   | yes, up to the bound      | yes                 |
/// | `Configuration` | never                     | never               |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Channel-level failure: timeout, socket error, lost connection.
    Transport,
    /// The server answered with `ok: false`.
    Application,
    /// Unknown event name, call attempted while disconnected, bad config.
    Configuration,
}

/// Transport-layer error enum.
///
/// # Error Code Ranges
///
/// | Range     | Kind          |
/// |-----------|---------------|
/// | 1000–1999 | Configuration |
/// | 2000–2999 | Transport     |
/// | 3000–3999 | Application   |
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An acknowledged call was attempted before any channel was established.
    #[error("socket not initialized")]
    NotInitialized,

    /// The host invoked an event name outside the acknowledged allow-list.
    #[error("unknown invoke event: {0}")]
    UnknownInvokeEvent(String),

    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No acknowledgement arrived within the bound.
    #[error("{event} timed out after {timeout_ms} ms")]
    Timeout {
        /// Event name of the unacknowledged emit.
        event: String,
        /// Bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The channel exists but its socket is not currently open.
    #[error("channel is not connected")]
    NotConnected,

    /// The channel was torn down while the call was pending.
    #[error("connection lost")]
    ConnectionLost,

    /// Underlying socket failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// The acknowledgement did not decode as an envelope.
    #[error("malformed acknowledgement: {0}")]
    MalformedAck(String),

    /// The server explicitly rejected the call with `ok: false`.
    #[error("{0}")]
    Application(String),

    /// Every allowed attempt failed.
    #[error("{event} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Event name of the acknowledged call.
        event: String,
        /// Total attempts performed.
        attempts: u32,
        /// Failure reason of the final attempt.
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Returns the failure kind of this error.
    ///
    /// [`TransportError::RetriesExhausted`] inherits the kind of its last
    /// attempt.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized | Self::UnknownInvokeEvent(_) | Self::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            Self::Timeout { .. }
            | Self::NotConnected
            | Self::ConnectionLost
            | Self::Socket(_)
            | Self::MalformedAck(_) => ErrorKind::Transport,
            Self::Application(_) => ErrorKind::Application,
            Self::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// Returns `true` if the dispatcher may spend another attempt on this
    /// failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionLost | Self::RetriesExhausted { .. } => false,
            other => other.kind() != ErrorKind::Configuration,
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::NotInitialized => 1001,
            Self::UnknownInvokeEvent(_) => 1002,
            Self::InvalidConfig(_) => 1003,
            Self::Timeout { .. } => 2001,
            Self::NotConnected => 2002,
            Self::ConnectionLost => 2003,
            Self::Socket(_) => 2004,
            Self::MalformedAck(_) => 2005,
            Self::RetriesExhausted { .. } => 2006,
            Self::Application(_) => 3001,
        }
    }
}

/// Structured reply for a host invoke.
///
/// Mirrors the wire ack envelope so the host sees the same shape the server
/// produces:
/// ```json
/// { "ok": false, "error": "unknown invoke event: nope", "code": 1002 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeReply {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Returned data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Numeric error code, see [`TransportError::error_code`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

impl From<Result<Value, TransportError>> for InvokeReply {
    fn from(result: Result<Value, TransportError>) -> Self {
        match result {
            Ok(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
                code: None,
            },
            Err(err) => Self {
                ok: false,
                data: None,
                code: Some(err.error_code()),
                error: Some(err.to_string()),
            },
        }
    }
}
