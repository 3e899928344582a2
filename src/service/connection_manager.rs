//! Ownership and lifecycle of the single logical channel.
//!
//! [`ConnectionManager`] is the only writer of the [`ChannelSlot`]. Every
//! connect tears the previous channel down, builds a fresh one, spawns the
//! one event pump that serves as that channel's listener set, and only then
//! opens it. Reconnect-on-drop is left to the transport; the manager only
//! reacts to the transitions it reports.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::{EventRouter, HeartbeatMonitor, RequestDispatcher};
use crate::bridge::Bridge;
use crate::channel::{
    Channel, ChannelEvent, ChannelEvents, ChannelRequest, ChannelSlot, Connector,
    EndpointResolver, ReconnectPolicy,
};
use crate::config::TransportConfig;
use crate::domain::notice::CLIENT_DISCONNECT_REASON;
use crate::domain::{ConnectionState, Credential, EventAllowList, LifecycleNotice};

/// Event name of the best-effort notice sent before a client-side close.
pub const GOING_AWAY_EVENT: &str = "goingAway";

/// Owner of the live channel and everything attached to it.
///
/// # Concurrency
///
/// - `connect` and `disconnect` are serialised; overlapping calls can never
///   leave two channels alive.
/// - The heartbeat monitor, dispatcher and router read the channel through
///   the shared slot, so a reconnect is visible to all of them at once.
#[derive(Debug)]
pub struct ConnectionManager<K: Connector> {
    connector: K,
    endpoint: Arc<dyn EndpointResolver>,
    policy: ReconnectPolicy,
    slot: Arc<ChannelSlot<K::Channel>>,
    state: Arc<watch::Sender<ConnectionState>>,
    heartbeat: Arc<HeartbeatMonitor<K::Channel>>,
    router: Arc<EventRouter<K::Channel>>,
    bridge: Arc<dyn Bridge>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<K: Connector> ConnectionManager<K> {
    /// Wires a manager and its heartbeat monitor, dispatcher and router.
    #[must_use]
    pub fn new(
        connector: K,
        endpoint: Arc<dyn EndpointResolver>,
        config: &TransportConfig,
        allow: Arc<EventAllowList>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        let slot = Arc::new(ChannelSlot::new());
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            Arc::clone(&slot),
            Arc::clone(&bridge),
            config.heartbeat_interval,
            config.heartbeat_timeout,
        ));
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&slot),
            Arc::clone(&bridge),
            config.ack_timeout,
            config.ack_max_retries,
        );
        let router = Arc::new(EventRouter::new(
            allow,
            Arc::clone(&slot),
            dispatcher,
            Arc::clone(&bridge),
        ));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            endpoint,
            policy: config.reconnect_policy(),
            slot,
            state: Arc::new(state),
            heartbeat,
            router,
            bridge,
            pump: Mutex::new(None),
        }
    }

    /// Replaces any existing channel with a new one authenticated by
    /// `credential`. An empty credential is ignored.
    pub async fn connect(&self, credential: Credential) {
        if credential.is_empty() {
            tracing::debug!("ignoring connect without credential");
            return;
        }
        let mut pump = self.pump.lock().await;
        self.teardown(&mut pump);

        let url = self.endpoint.resolve();
        self.bridge.info(&format!("Connecting to {url}"));
        let (channel, events) = self.connector.create(ChannelRequest {
            url,
            credential,
            policy: self.policy,
        });
        self.slot.replace(Some(Arc::clone(&channel)));
        set_state(&self.state, ConnectionState::Connecting);

        let reactor = Reactor {
            slot: Arc::clone(&self.slot),
            state: Arc::clone(&self.state),
            heartbeat: Arc::clone(&self.heartbeat),
            router: Arc::clone(&self.router),
            bridge: Arc::clone(&self.bridge),
        };
        *pump = Some(tokio::spawn(reactor.run(Arc::clone(&channel), events)));
        tracing::debug!(
            inbound = self.router.allow_list().inbound().count(),
            "listeners attached"
        );
        channel.open();
    }

    /// Sends the going-away notice, closes the channel and stops the
    /// heartbeat. Does nothing if no channel exists.
    pub async fn disconnect(&self) {
        let mut pump = self.pump.lock().await;
        if self.teardown(&mut pump).is_none() {
            return;
        }
        self.bridge.info("Disconnected by client");
        self.bridge.notify(&LifecycleNotice::Disconnect {
            reason: CLIENT_DISCONNECT_REASON.to_string(),
        });
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns `true` while the channel is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the live channel, if any.
    #[must_use]
    pub fn channel(&self) -> Option<Arc<K::Channel>> {
        self.slot.current()
    }

    /// Returns the router serving this manager's channels.
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter<K::Channel>> {
        &self.router
    }

    /// Returns the heartbeat monitor.
    #[must_use]
    pub fn heartbeat(&self) -> &HeartbeatMonitor<K::Channel> {
        &self.heartbeat
    }

    fn teardown(&self, pump: &mut Option<JoinHandle<()>>) -> Option<Arc<K::Channel>> {
        let previous = self.slot.replace(None);
        self.heartbeat.stop();
        if let Some(handle) = pump.take() {
            handle.abort();
        }
        if let Some(channel) = &previous {
            if let Err(e) = channel.emit(GOING_AWAY_EVENT, Vec::new()) {
                tracing::debug!(error = %e, "going-away notice not sent");
            }
            channel.close();
        }
        set_state(&self.state, ConnectionState::Disconnected);
        previous
    }
}

impl<K: Connector> Drop for ConnectionManager<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.get_mut().take() {
            handle.abort();
        }
        if let Some(channel) = self.slot.replace(None) {
            channel.close();
        }
    }
}

fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        tracing::debug!(from = %current, to = %next, "connection state changed");
        *current = next;
        true
    });
}

/// Lifecycle reactions for one channel instance.
struct Reactor<C> {
    slot: Arc<ChannelSlot<C>>,
    state: Arc<watch::Sender<ConnectionState>>,
    heartbeat: Arc<HeartbeatMonitor<C>>,
    router: Arc<EventRouter<C>>,
    bridge: Arc<dyn Bridge>,
}

impl<C: Channel> Reactor<C> {
    async fn run(self, channel: Arc<C>, mut events: ChannelEvents) {
        while let Some(event) = events.recv().await {
            if !self.slot.is_current(&channel) {
                break;
            }
            match event {
                ChannelEvent::Opened => {
                    set_state(&self.state, ConnectionState::Connected);
                    self.heartbeat.start(&channel);
                    self.bridge.info("Connected");
                    self.bridge.notify(&LifecycleNotice::Connect);
                }
                ChannelEvent::ConnectFailed { message } => {
                    self.heartbeat.stop_for(&channel);
                    set_state(&self.state, ConnectionState::Connecting);
                    self.bridge.error(&format!("Connection error: {message}"));
                    self.bridge
                        .notify(&LifecycleNotice::ConnectError { message });
                }
                ChannelEvent::Closed {
                    reason,
                    reconnecting,
                } => {
                    self.heartbeat.stop_for(&channel);
                    let next = if reconnecting {
                        ConnectionState::Connecting
                    } else {
                        ConnectionState::Disconnected
                    };
                    set_state(&self.state, next);
                    self.bridge.warn(&format!("Disconnected: {reason}"));
                    self.bridge.notify(&LifecycleNotice::Disconnect { reason });
                }
                ChannelEvent::Message { event, args } => {
                    self.router.forward_inbound(&event, args);
                }
            }
        }
        tracing::debug!("channel event stream ended");
    }
}
