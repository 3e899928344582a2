//! Allow-list filtered forwarding between the host and the channel.

use std::sync::Arc;

use serde_json::Value;

use super::RequestDispatcher;
use crate::bridge::Bridge;
use crate::channel::{Channel, ChannelSlot};
use crate::domain::EventAllowList;
use crate::error::TransportError;

/// Routes host intents to the network and server events to the host.
#[derive(Debug)]
pub struct EventRouter<C> {
    allow: Arc<EventAllowList>,
    slot: Arc<ChannelSlot<C>>,
    dispatcher: RequestDispatcher<C>,
    bridge: Arc<dyn Bridge>,
}

impl<C: Channel> EventRouter<C> {
    /// Creates a router over `allow`.
    #[must_use]
    pub fn new(
        allow: Arc<EventAllowList>,
        slot: Arc<ChannelSlot<C>>,
        dispatcher: RequestDispatcher<C>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        Self {
            allow,
            slot,
            dispatcher,
            bridge,
        }
    }

    /// Returns the allow-lists this router enforces.
    #[must_use]
    pub fn allow_list(&self) -> &EventAllowList {
        &self.allow
    }

    /// Returns the dispatcher used for acknowledged calls.
    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher<C> {
        &self.dispatcher
    }

    /// Forwards a host fire-and-forget event to the channel.
    ///
    /// Returns `true` if the event was handed to the channel. Events outside
    /// the outbound allow-list are dropped silently, as are events sent
    /// while no channel exists.
    pub fn forward_outbound(&self, event: &str, args: Vec<Value>) -> bool {
        if !self.allow.allows_outbound(event) {
            tracing::debug!(event, "dropping outbound event outside allow-list");
            return false;
        }
        let Some(channel) = self.slot.current() else {
            tracing::debug!(event, "no channel, dropping outbound event");
            return false;
        };
        if self.allow.should_log(event) {
            self.bridge.info(&format!("Emitting {event}"));
        }
        match channel.emit(event, args) {
            Ok(()) => true,
            Err(e) => {
                self.bridge.warn(&format!("Failed to emit {event}: {e}"));
                false
            }
        }
    }

    /// Performs a host acknowledged call.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownInvokeEvent`] without touching the
    /// network if `event` is outside the ack allow-list, otherwise whatever
    /// [`RequestDispatcher::emit`] returns.
    pub async fn invoke(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        if !self.allow.allows_ack(event) {
            self.bridge.warn(&format!("Unknown invoke event: {event}"));
            return Err(TransportError::UnknownInvokeEvent(event.to_string()));
        }
        if self.allow.should_log(event) {
            self.bridge.info(&format!("Invoking {event}"));
        }
        self.dispatcher.emit(event, payload).await
    }

    /// Forwards a server event to the host under the same name.
    ///
    /// Returns `true` if the event reached the bridge.
    pub fn forward_inbound(&self, event: &str, args: Vec<Value>) -> bool {
        if !self.allow.allows_inbound(event) {
            tracing::debug!(event, "dropping inbound event outside allow-list");
            return false;
        }
        if self.allow.should_log(event) {
            self.bridge.info(&format!("Received {event}"));
        }
        self.bridge.send_to_ui(event, args);
        true
    }
}
