//! WebSocket frame envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Top-level WebSocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Client-generated ID for requests, echoed by the matching ack.
    pub id: String,
    /// Frame type discriminator.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event name; absent on acks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Argument array for events, payload for requests, reply for acks.
    #[serde(default)]
    pub payload: Value,
}

/// Discriminator for frame types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Fire-and-forget event, either direction.
    Event,
    /// Event expecting an ack with the same ID.
    Request,
    /// Reply to a request.
    Ack,
}

impl Frame {
    fn build(kind: FrameKind, id: String, event: Option<String>, payload: Value) -> Self {
        Self {
            id,
            kind,
            timestamp: Utc::now(),
            event,
            payload,
        }
    }

    /// Builds a fire-and-forget event frame.
    #[must_use]
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        Self::build(
            FrameKind::Event,
            uuid::Uuid::new_v4().to_string(),
            Some(name.to_string()),
            Value::Array(args),
        )
    }

    /// Builds a request frame with a fresh ID.
    #[must_use]
    pub fn request(name: &str, payload: Value) -> Self {
        Self::build(
            FrameKind::Request,
            uuid::Uuid::new_v4().to_string(),
            Some(name.to_string()),
            payload,
        )
    }

    /// Builds the ack answering request `id`.
    #[must_use]
    pub fn ack(id: impl Into<String>, payload: Value) -> Self {
        Self::build(FrameKind::Ack, id.into(), None, payload)
    }

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Socket`] if `text` is not a valid frame.
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::Socket(format!("malformed frame: {e}")))
    }

    /// Serializes the frame for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Socket`] if the payload cannot be encoded.
    pub fn to_text(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Socket(e.to_string()))
    }

    /// Consumes an event frame into its argument list. A non-array payload
    /// becomes a single argument; a null payload none.
    #[must_use]
    pub fn into_args(self) -> Vec<Value> {
        match self.payload {
            Value::Array(args) => args,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}
