//! [`Channel`] and [`Connector`] over `tokio-tungstenite`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::connection::{Shared, drive};
use super::messages::Frame;
use crate::channel::{Channel, ChannelEvents, ChannelRequest, Connector};
use crate::error::TransportError;

/// Builds [`WsChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Channel = WsChannel;

    fn create(&self, request: ChannelRequest) -> (Arc<WsChannel>, ChannelEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let channel = WsChannel {
            shared: Arc::new(Shared::new(request, events_tx)),
            outbound: outbound_tx,
            queued: Mutex::new(Some(outbound_rx)),
            shutdown,
        };
        (Arc::new(channel), events_rx)
    }
}

/// WebSocket-backed channel with automatic redial.
///
/// The driver task runs detached and ends once the channel is closed or
/// dropped.
#[derive(Debug)]
pub struct WsChannel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Frame>,
    queued: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    shutdown: watch::Sender<bool>,
}

impl WsChannel {
    /// Returns the URL this channel dials.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.request.url
    }

    /// Returns `true` while the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionLost)
    }
}

impl Channel for WsChannel {
    fn open(&self) {
        let Some(outbound) = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!(url = %self.url(), "channel opened twice");
            return;
        };
        tokio::spawn(drive(
            Arc::clone(&self.shared),
            outbound,
            self.shutdown.subscribe(),
        ));
    }

    fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::ConnectionLost);
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.enqueue(Frame::event(event, args))
    }

    /// Requests issued while the socket is down are queued and sent after
    /// the next successful dial, still bounded by `timeout`. A request in
    /// flight when the socket drops fails with a retryable
    /// [`TransportError::Socket`]; `ConnectionLost` is reserved for a
    /// closed channel.
    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::ConnectionLost);
        }
        let frame = Frame::request(event, payload);
        let id = frame.id.clone();
        let reply = self.shared.await_ack(&id);
        if let Err(e) = self.enqueue(frame) {
            self.shared.forget_ack(&id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::ConnectionLost),
            Err(_) => {
                self.shared.forget_ack(&id);
                Err(TransportError::Timeout {
                    event: event.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    fn close(&self) {
        self.shutdown.send_replace(true);
        let never_opened = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if never_opened {
            self.shared.fail_pending();
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.shared.fail_pending();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::bridge::{Bridge, LogLevel};
    use crate::channel::{ChannelEvent, ChannelSlot, ReconnectPolicy};
    use crate::domain::Credential;
    use crate::service::RequestDispatcher;
    use crate::testing::RecordingBridge;
    use crate::ws::connection::SERVER_DISCONNECT_REASON;
    use crate::ws::messages::FrameKind;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    /// What the loopback server does after the handshake.
    #[derive(Clone, Copy)]
    enum Script {
        /// Ack every request with `{ok, data: payload}` and greet once.
        Echo,
        /// Send a close frame at once.
        CloseImmediately,
    }

    /// Serves one connection, reporting the `Authorization` header seen.
    async fn serve_once(script: Script) -> (String, oneshot::Receiver<Option<String>>) {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let (auth_tx, auth_rx) = oneshot::channel();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = auth_tx.send(auth);
                Ok(resp)
            };
            let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                return;
            };
            if let Script::CloseImmediately = script {
                let _ = ws.send(Message::Close(None)).await;
                return;
            }
            let greeting = Frame::event("newMessage", vec![json!({"id": 1})]);
            let Ok(text) = greeting.to_text() else {
                return;
            };
            let _ = ws.send(Message::text(text)).await;
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else {
                    continue;
                };
                let Ok(frame) = Frame::parse(text.as_str()) else {
                    continue;
                };
                if frame.kind == FrameKind::Request {
                    let ack = Frame::ack(frame.id, json!({"ok": true, "data": frame.payload}));
                    let Ok(text) = ack.to_text() else {
                        continue;
                    };
                    let _ = ws.send(Message::text(text)).await;
                }
            }
        });
        (format!("ws://{addr}/ws"), auth_rx)
    }

    /// Drops the first socket as soon as a request arrives, without a
    /// close frame, then acks every request on the next connection with
    /// `{ok: true, data: "saved"}`.
    async fn serve_dropping_first_request() -> String {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Text(_)) {
                    break;
                }
            }
            drop(ws);

            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else {
                    continue;
                };
                let Ok(frame) = Frame::parse(text.as_str()) else {
                    continue;
                };
                if frame.kind == FrameKind::Request {
                    let ack = Frame::ack(frame.id, json!({"ok": true, "data": "saved"}));
                    let Ok(text) = ack.to_text() else {
                        continue;
                    };
                    let _ = ws.send(Message::text(text)).await;
                }
            }
        });
        format!("ws://{addr}/ws")
    }

    fn quick_redial(url: String) -> ChannelRequest {
        ChannelRequest {
            policy: ReconnectPolicy {
                delay_min: Duration::from_millis(20),
                delay_max: Duration::from_millis(100),
                connect_timeout: Duration::from_secs(2),
            },
            ..request(url)
        }
    }

    fn request(url: String) -> ChannelRequest {
        ChannelRequest {
            url,
            credential: Credential::new("secret-token"),
            policy: ReconnectPolicy::default(),
        }
    }

    async fn next_event(events: &mut ChannelEvents) -> ChannelEvent {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(event)) => event,
            other => panic!("no channel event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dials_with_bearer_header_and_round_trips_acks() {
        let (url, auth) = serve_once(Script::Echo).await;
        let (channel, mut events) = WsConnector.create(request(url));
        channel.open();

        assert_eq!(next_event(&mut events).await, ChannelEvent::Opened);
        let Ok(seen) = auth.await else {
            panic!("handshake not observed");
        };
        assert_eq!(seen.as_deref(), Some("Bearer secret-token"));

        let reply = channel
            .emit_with_ack("sendMessage", json!({"text": "hi"}), Duration::from_secs(5))
            .await;
        let value = match reply {
            Ok(value) => value,
            Err(e) => panic!("ack failed: {e}"),
        };
        assert_eq!(value, json!({"ok": true, "data": {"text": "hi"}}));
        channel.close();
    }

    #[tokio::test]
    async fn server_events_arrive_as_messages() {
        let (url, _auth) = serve_once(Script::Echo).await;
        let (channel, mut events) = WsConnector.create(request(url));
        channel.open();

        assert_eq!(next_event(&mut events).await, ChannelEvent::Opened);
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Message {
                event: "newMessage".to_string(),
                args: vec![json!({"id": 1})],
            }
        );
        channel.close();
    }

    #[tokio::test]
    async fn server_close_ends_channel_without_reconnect() {
        let (url, _auth) = serve_once(Script::CloseImmediately).await;
        let (channel, mut events) = WsConnector.create(request(url));
        channel.open();

        assert_eq!(next_event(&mut events).await, ChannelEvent::Opened);
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Closed {
                reason: SERVER_DISCONNECT_REASON.to_string(),
                reconnecting: false,
            }
        );
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn refused_dial_reports_connect_failed() {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        drop(listener);

        let (channel, mut events) = WsConnector.create(request(format!("ws://{addr}/ws")));
        channel.open();

        let ChannelEvent::ConnectFailed { message } = next_event(&mut events).await else {
            panic!("expected connect failure");
        };
        assert!(!message.is_empty());
        channel.close();
    }

    #[test]
    fn emit_before_open_is_not_connected() {
        let (channel, _events) = WsConnector.create(request("ws://127.0.0.1:9/ws".to_string()));
        assert!(matches!(
            channel.emit("typing", vec![]),
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn closed_channel_rejects_calls() {
        let (channel, _events) = WsConnector.create(request("ws://127.0.0.1:9/ws".to_string()));
        channel.close();
        assert!(matches!(
            channel.emit("typing", vec![]),
            Err(TransportError::ConnectionLost)
        ));
        let reply = channel
            .emit_with_ack("sendMessage", json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(reply, Err(TransportError::ConnectionLost)));
    }

    #[tokio::test]
    async fn dropped_socket_fails_in_flight_call_as_retryable() {
        let url = serve_dropping_first_request().await;
        let (channel, mut events) = WsConnector.create(quick_redial(url));
        channel.open();
        assert_eq!(next_event(&mut events).await, ChannelEvent::Opened);

        let reply = channel
            .emit_with_ack("saveSettings", json!({}), Duration::from_secs(5))
            .await;
        let error = match reply {
            Err(error) => error,
            Ok(value) => panic!("call survived a dropped socket: {value}"),
        };
        assert!(matches!(error, TransportError::Socket(_)), "{error:?}");
        assert!(error.is_retryable());

        let ChannelEvent::Closed { reconnecting, .. } = next_event(&mut events).await else {
            panic!("expected close");
        };
        assert!(reconnecting);
        assert_eq!(next_event(&mut events).await, ChannelEvent::Opened);
        channel.close();
    }

    #[tokio::test]
    async fn dispatcher_retries_across_a_dropped_socket() {
        let url = serve_dropping_first_request().await;
        let (channel, mut events) = WsConnector.create(quick_redial(url));
        channel.open();
        assert_eq!(next_event(&mut events).await, ChannelEvent::Opened);

        let slot = Arc::new(ChannelSlot::new());
        slot.replace(Some(Arc::clone(&channel)));
        let bridge = Arc::new(RecordingBridge::default());
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&slot),
            Arc::clone(&bridge) as Arc<dyn Bridge>,
            Duration::from_secs(2),
            5,
        );

        let outcome = dispatcher
            .emit_with_retry("saveSettings", json!({}), 5)
            .await;
        let value = match outcome {
            Ok(value) => value,
            Err(e) => panic!("call did not recover: {e}"),
        };
        assert_eq!(value, json!("saved"));
        let warnings = bridge.logs_at(LogLevel::Warn);
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings.iter().all(|w| w.starts_with("Attempt 1 failed for saveSettings")));
        channel.close();
    }
}
