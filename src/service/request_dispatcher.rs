//! Acknowledged calls with bounded retry.
//!
//! [`RequestDispatcher`] turns one logical call into up to
//! `max_retries + 1` back-to-back round trips over the current channel.
//! Each call owns its attempt counter; concurrent calls, including repeats
//! of the same event name, never share state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::retry::{self, Failure, RetryOutcome};
use crate::bridge::Bridge;
use crate::channel::{Channel, ChannelSlot};
use crate::domain::AckEnvelope;
use crate::error::TransportError;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default per-attempt acknowledgement bound.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends acknowledged calls over whatever channel is current.
#[derive(Debug)]
pub struct RequestDispatcher<C> {
    slot: Arc<ChannelSlot<C>>,
    bridge: Arc<dyn Bridge>,
    ack_timeout: Duration,
    max_retries: u32,
}

impl<C: Channel> RequestDispatcher<C> {
    /// Creates a dispatcher reading the channel from `slot`.
    #[must_use]
    pub fn new(
        slot: Arc<ChannelSlot<C>>,
        bridge: Arc<dyn Bridge>,
        ack_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            slot,
            bridge,
            ack_timeout,
            max_retries,
        }
    }

    /// Sends `event` with the configured default retry count.
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::emit_with_retry`].
    pub async fn emit(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        self.emit_with_retry(event, payload, self.max_retries).await
    }

    /// Sends `event` and waits for an `{ok, data, error}` ack, retrying up
    /// to `max_retries` times.
    ///
    /// Timeouts, socket errors, malformed acks and `ok: false` replies all
    /// count as failed attempts. The first `ok: true` reply ends the call.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotInitialized`] if no channel exists; nothing is
    ///   sent.
    /// - [`TransportError::ConnectionLost`] if the channel is torn down or
    ///   replaced while the call is pending.
    /// - [`TransportError::RetriesExhausted`] wrapping the final attempt's
    ///   error once every attempt failed.
    pub async fn emit_with_retry(
        &self,
        event: &str,
        payload: Value,
        max_retries: u32,
    ) -> Result<Value, TransportError> {
        let mut watcher = self.slot.watch();
        let Some(first) = watcher.borrow_and_update().as_ref().map(Arc::clone) else {
            self.bridge
                .error(&format!("Cannot emit {event}: socket not initialized"));
            return Err(TransportError::NotInitialized);
        };

        let max_attempts = max_retries.saturating_add(1);
        let outcome = retry::bounded(
            max_attempts,
            |n| {
                let channel = if self.slot.is_current(&first) {
                    Some(Arc::clone(&first))
                } else {
                    None
                };
                let mut watcher = watcher.clone();
                let payload = payload.clone();
                async move {
                    let Some(channel) = channel else {
                        return Err(Failure::Fatal(TransportError::ConnectionLost));
                    };
                    tracing::debug!(event, attempt = n, "emitting with ack");
                    let ack = tokio::select! {
                        ack = channel.emit_with_ack(event, payload, self.ack_timeout) => ack,
                        _ = watcher.changed() => Err(TransportError::ConnectionLost),
                    };
                    match ack.and_then(AckEnvelope::decode).and_then(AckEnvelope::into_result) {
                        Ok(data) => Ok(data),
                        Err(e) if e.is_retryable() => Err(Failure::Retryable(e)),
                        Err(e) => Err(Failure::Fatal(e)),
                    }
                }
            },
            |n, error| {
                self.bridge
                    .warn(&format!("Attempt {n} failed for {event}: {error}"));
            },
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                tracing::debug!(event, attempts, "acknowledged");
                Ok(value)
            }
            RetryOutcome::Exhausted { error, attempts } => {
                self.bridge.error(&format!(
                    "Failed to emit {event} after {attempts} attempts: {error}"
                ));
                Err(TransportError::RetriesExhausted {
                    event: event.to_string(),
                    attempts,
                    last: Box::new(error),
                })
            }
            RetryOutcome::Aborted { error, attempts } => {
                self.bridge
                    .error(&format!("Aborted {event} on attempt {attempts}: {error}"));
                Err(error)
            }
        }
    }
}
