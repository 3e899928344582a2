//! Scripted in-memory transport and recording bridge for unit tests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::bridge::{Bridge, LogLevel};
use crate::channel::{Channel, ChannelEvent, ChannelEvents, ChannelRequest, Connector};
use crate::error::TransportError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lets spawned tasks on the current-thread test runtime catch up.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// How the fake server answers one acknowledged emit.
#[derive(Debug, Clone)]
pub(crate) enum AckScript {
    /// Ack with `value` after `after`.
    Reply { after: Duration, value: Value },
    /// Never ack.
    Silent,
    /// Fail at the socket level.
    Fail(String),
}

impl AckScript {
    pub(crate) fn now(value: Value) -> Self {
        Self::Reply {
            after: Duration::ZERO,
            value,
        }
    }
}

/// Decides the answer from `(event, payload, nth call for that event)`.
pub(crate) type Responder = Arc<dyn Fn(&str, &Value, usize) -> AckScript + Send + Sync>;

pub(crate) struct MockChannel {
    pub(crate) request: ChannelRequest,
    events: mpsc::UnboundedSender<ChannelEvent>,
    responder: Responder,
    opened: AtomicBool,
    closed: AtomicBool,
    emitted: Mutex<Vec<(String, Vec<Value>)>>,
    acks: Mutex<Vec<(String, Value)>>,
}

impl fmt::Debug for MockChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockChannel")
            .field("url", &self.request.url)
            .field("opened", &self.opened)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MockChannel {
    pub(crate) fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn emitted(&self) -> Vec<(String, Vec<Value>)> {
        lock(&self.emitted).clone()
    }

    pub(crate) fn ack_calls(&self) -> Vec<(String, Value)> {
        lock(&self.acks).clone()
    }

    pub(crate) fn ack_count(&self, event: &str) -> usize {
        lock(&self.acks).iter().filter(|(e, _)| e == event).count()
    }

    /// Simulates the server accepting the connection.
    pub(crate) fn server_open(&self) {
        let _ = self.events.send(ChannelEvent::Opened);
    }

    pub(crate) fn server_push(&self, event: &str, args: Vec<Value>) {
        let _ = self.events.send(ChannelEvent::Message {
            event: event.to_string(),
            args,
        });
    }

    pub(crate) fn server_drop(&self, reason: &str, reconnecting: bool) {
        let _ = self.events.send(ChannelEvent::Closed {
            reason: reason.to_string(),
            reconnecting,
        });
    }

    pub(crate) fn server_refuse(&self, message: &str) {
        let _ = self.events.send(ChannelEvent::ConnectFailed {
            message: message.to_string(),
        });
    }
}

impl Channel for MockChannel {
    fn open(&self) {
        self.opened.store(true, Ordering::SeqCst);
    }

    fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionLost);
        }
        lock(&self.emitted).push((event.to_string(), args));
        Ok(())
    }

    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let nth = {
            let mut acks = lock(&self.acks);
            let nth = acks.iter().filter(|(e, _)| e == event).count();
            acks.push((event.to_string(), payload.clone()));
            nth
        };
        let script = (self.responder)(event, &payload, nth);
        let reply = async move {
            match script {
                AckScript::Reply { after, value } => {
                    if !after.is_zero() {
                        tokio::time::sleep(after).await;
                    }
                    Ok(value)
                }
                AckScript::Silent => std::future::pending().await,
                AckScript::Fail(msg) => Err(TransportError::Socket(msg)),
            }
        };
        match tokio::time::timeout(timeout, reply).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                event: event.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that records every channel it builds.
#[derive(Clone)]
pub(crate) struct MockConnector {
    responder: Responder,
    channels: Arc<Mutex<Vec<Arc<MockChannel>>>>,
}

impl fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnector")
            .field("channels", &lock(&self.channels).len())
            .finish_non_exhaustive()
    }
}

impl MockConnector {
    pub(crate) fn new(
        responder: impl Fn(&str, &Value, usize) -> AckScript + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connector whose server acks every heartbeat at once and never acks
    /// anything else.
    pub(crate) fn heartbeat_only() -> Self {
        Self::new(|event, payload, _| {
            if event == crate::domain::heartbeat::HEARTBEAT_EVENT {
                AckScript::now(payload.clone())
            } else {
                AckScript::Silent
            }
        })
    }

    pub(crate) fn channels(&self) -> Vec<Arc<MockChannel>> {
        lock(&self.channels).clone()
    }
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    fn create(&self, request: ChannelRequest) -> (Arc<MockChannel>, ChannelEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(MockChannel {
            request,
            events,
            responder: Arc::clone(&self.responder),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            emitted: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
        });
        lock(&self.channels).push(Arc::clone(&channel));
        (channel, rx)
    }
}

/// Bridge that records everything sent to the host.
#[derive(Debug, Default)]
pub(crate) struct RecordingBridge {
    sent: Mutex<Vec<(String, Vec<Value>)>>,
    logs: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingBridge {
    pub(crate) fn sent(&self) -> Vec<(String, Vec<Value>)> {
        lock(&self.sent).clone()
    }

    pub(crate) fn sent_named(&self, event: &str) -> Vec<Vec<Value>> {
        lock(&self.sent)
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn logs_at(&self, level: LogLevel) -> Vec<String> {
        lock(&self.logs)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Bridge for RecordingBridge {
    fn send_to_ui(&self, event: &str, args: Vec<Value>) {
        lock(&self.sent).push((event.to_string(), args));
    }

    fn log(&self, level: LogLevel, message: &str) {
        lock(&self.logs).push((level, message.to_string()));
    }
}
