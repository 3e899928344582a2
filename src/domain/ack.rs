//! Wire-level acknowledgement envelope for acknowledged calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Failure reason used when the server rejects a call without saying why.
pub const GENERIC_SERVER_ERROR: &str = "Unknown server error";

/// `{ ok, data?, error?, seq? }` as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEnvelope {
    /// Whether the server accepted the call.
    pub ok: bool,
    /// Result data on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Rejection reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional server-side sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl AckEnvelope {
    /// Decodes a raw ack value.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedAck`] if `raw` is not an envelope.
    pub fn decode(raw: Value) -> Result<Self, TransportError> {
        serde_json::from_value(raw).map_err(|e| TransportError::MalformedAck(e.to_string()))
    }

    /// Converts the envelope into the call's outcome.
    ///
    /// A successful envelope without `data` yields `null`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Application`] carrying the server's reason
    /// (or [`GENERIC_SERVER_ERROR`]) when `ok` is `false`.
    pub fn into_result(self) -> Result<Value, TransportError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(TransportError::Application(
                self.error.unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string()),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_envelope_yields_data() {
        let Ok(env) = AckEnvelope::decode(json!({"ok": true, "data": {"id": 3}})) else {
            panic!("should decode");
        };
        let Ok(data) = env.into_result() else {
            panic!("should succeed");
        };
        assert_eq!(data, json!({"id": 3}));
    }

    #[test]
    fn ok_without_data_is_null() {
        let Ok(env) = AckEnvelope::decode(json!({"ok": true})) else {
            panic!("should decode");
        };
        assert!(matches!(env.into_result(), Ok(Value::Null)));
    }

    #[test]
    fn rejection_without_reason_uses_fallback() {
        let Ok(env) = AckEnvelope::decode(json!({"ok": false})) else {
            panic!("should decode");
        };
        match env.into_result() {
            Err(TransportError::Application(msg)) => assert_eq!(msg, GENERIC_SERVER_ERROR),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejection_carries_reason() {
        let Ok(env) = AckEnvelope::decode(json!({"ok": false, "error": "name taken"})) else {
            panic!("should decode");
        };
        match env.into_result() {
            Err(TransportError::Application(msg)) => assert_eq!(msg, "name taken"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_envelope_is_malformed() {
        assert!(matches!(
            AckEnvelope::decode(json!("pong")),
            Err(TransportError::MalformedAck(_))
        ));
    }
}
