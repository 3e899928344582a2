//! Transport primitive abstraction and the shared channel accessor.
//!
//! A [`Connector`] builds an unopened [`Channel`] together with its
//! [`ChannelEvents`] stream. The stream is the channel's complete listener
//! set: whoever holds it sees every lifecycle transition and inbound event
//! in delivery order. [`Channel::open`] is a separate step so the stream can
//! be wired before the first `Opened` event can be produced.

pub mod slot;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::Credential;
use crate::error::TransportError;

pub use slot::ChannelSlot;

/// Lifecycle transition or inbound event reported by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The socket is open.
    Opened,
    /// A connection attempt failed; the transport keeps retrying.
    ConnectFailed {
        /// Transport error message.
        message: String,
    },
    /// An open socket closed.
    Closed {
        /// Why the socket closed.
        reason: String,
        /// Whether the transport will try to reopen it.
        reconnecting: bool,
    },
    /// Server-pushed event.
    Message {
        /// Event name.
        event: String,
        /// Argument list.
        args: Vec<Value>,
    },
}

/// Receiving end of a channel's event stream.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Automatic reconnect settings handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub delay_min: Duration,
    /// Upper bound for the reconnect delay.
    pub delay_max: Duration,
    /// Bound for a single connection attempt.
    pub connect_timeout: Duration,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based): doubles from
    /// `delay_min` and saturates at `delay_max`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.min(16)).unwrap_or(u32::MAX);
        self.delay_min
            .checked_mul(factor)
            .unwrap_or(self.delay_max)
            .min(self.delay_max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay_min: Duration::from_millis(1000),
            delay_max: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Everything a connector needs to build one channel.
#[derive(Debug, Clone)]
pub struct ChannelRequest {
    /// Endpoint URL, resolved for this connect.
    pub url: String,
    /// Bearer credential for this connect.
    pub credential: Credential,
    /// Transport reconnect settings.
    pub policy: ReconnectPolicy,
}

/// One logical bidirectional connection.
pub trait Channel: Send + Sync + fmt::Debug + 'static {
    /// Starts connecting. Must be called at most once, after the event
    /// stream is being consumed.
    fn open(&self);

    /// Sends a fire-and-forget event.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if the socket is not open,
    /// or [`TransportError::ConnectionLost`] if the channel was closed.
    fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), TransportError>;

    /// Sends an event and waits up to `timeout` for its acknowledgement.
    ///
    /// Returns the raw ack value. An ack arriving after `timeout` is
    /// discarded.
    fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;

    /// Closes the channel for good. Queued frames are flushed best-effort.
    fn close(&self);
}

/// Factory for channels.
pub trait Connector: Send + Sync + fmt::Debug + 'static {
    /// Concrete channel type.
    type Channel: Channel;

    /// Builds an unopened channel and its event stream.
    fn create(&self, request: ChannelRequest) -> (Arc<Self::Channel>, ChannelEvents);
}

/// Supplies the endpoint URL, evaluated on every connect.
pub trait EndpointResolver: Send + Sync + fmt::Debug {
    /// Returns the URL to connect to now.
    fn resolve(&self) -> String;
}

/// Fixed endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticEndpoint(pub String);

impl EndpointResolver for StaticEndpoint {
    fn resolve(&self) -> String {
        self.0.clone()
    }
}

/// Endpoint read from an environment variable on every connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEndpoint {
    key: String,
    fallback: String,
}

impl EnvEndpoint {
    /// Reads `key`, falling back to `fallback` when unset.
    #[must_use]
    pub fn new(key: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fallback: fallback.into(),
        }
    }
}

impl EndpointResolver for EnvEndpoint {
    fn resolve(&self) -> String {
        std::env::var(&self.key).unwrap_or_else(|_| self.fallback.clone())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_then_saturates() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn env_endpoint_falls_back_when_unset() {
        let endpoint = EnvEndpoint::new("SESSION_LINK_TEST_UNSET_URL", "ws://fallback/ws");
        assert_eq!(endpoint.resolve(), "ws://fallback/ws");
    }
}
