//! WebSocket connection driver.
//!
//! One driver task owns the socket for a [`super::WsChannel`]: it dials,
//! runs the read/write loop, resolves pending acks by frame ID and redials
//! after a dropped connection until shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::messages::{Frame, FrameKind};
use crate::channel::{ChannelEvent, ChannelRequest};
use crate::domain::notice::CLIENT_DISCONNECT_REASON;
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type AckSender = oneshot::Sender<Result<Value, TransportError>>;

/// Reason reported when the server closes the socket.
pub const SERVER_DISCONNECT_REASON: &str = "io server disconnect";

/// Reason reported when the socket ends without a close frame.
pub const TRANSPORT_CLOSE_REASON: &str = "transport close";

/// Reason reported when the socket fails.
pub const TRANSPORT_ERROR_REASON: &str = "transport error";

/// State shared between a channel handle and its driver.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) request: ChannelRequest,
    events: mpsc::UnboundedSender<ChannelEvent>,
    pending: Mutex<HashMap<String, AckSender>>,
    connected: AtomicBool,
}

impl Shared {
    pub(crate) fn new(request: ChannelRequest, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self {
            request,
            events,
            pending: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, AckSender>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Registers a waiter for the ack of request `id`.
    pub(crate) fn await_ack(&self, id: &str) -> oneshot::Receiver<Result<Value, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id.to_string(), tx);
        rx
    }

    /// Forgets the waiter for `id`; a later ack is discarded.
    pub(crate) fn forget_ack(&self, id: &str) {
        self.pending().remove(id);
    }

    /// Drops every waiter, which resolves them with `ConnectionLost`.
    pub(crate) fn fail_pending(&self) {
        let dropped = std::mem::take(&mut *self.pending());
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "failing pending acks");
        }
    }

    /// Resolves every waiter with a retryable socket error after a dropped
    /// connection; the driver keeps redialing.
    pub(crate) fn interrupt_pending(&self, reason: &str) {
        let interrupted = std::mem::take(&mut *self.pending());
        if interrupted.is_empty() {
            return;
        }
        tracing::debug!(count = interrupted.len(), reason, "interrupting pending acks");
        for tx in interrupted.into_values() {
            let _ = tx.send(Err(TransportError::Socket(reason.to_string())));
        }
    }

    fn report(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    fn dispatch(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring inbound frame");
                return;
            }
        };
        match frame.kind {
            FrameKind::Ack => {
                if let Some(tx) = self.pending().remove(&frame.id) {
                    let _ = tx.send(Ok(frame.payload));
                } else {
                    tracing::debug!(id = %frame.id, "ack without waiter discarded");
                }
            }
            FrameKind::Event => {
                let Some(event) = frame.event.clone() else {
                    tracing::warn!(id = %frame.id, "event frame without name");
                    return;
                };
                self.report(ChannelEvent::Message {
                    event,
                    args: frame.into_args(),
                });
            }
            FrameKind::Request => {
                tracing::debug!(id = %frame.id, "server requests are not supported");
            }
        }
    }
}

enum SocketEnd {
    Shutdown,
    ServerClosed,
    Dropped(&'static str),
}

/// Dials the endpoint with the bearer credential on the upgrade request.
async fn dial(request: &ChannelRequest) -> Result<WsStream, TransportError> {
    let mut upgrade = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::Socket(e.to_string()))?;
    let bearer = HeaderValue::from_str(&request.credential.bearer())
        .map_err(|e| TransportError::Socket(format!("invalid credential: {e}")))?;
    upgrade.headers_mut().insert(AUTHORIZATION, bearer);

    let timeout = request.policy.connect_timeout;
    let (ws, _response) = tokio::time::timeout(timeout, connect_async(upgrade))
        .await
        .map_err(|_| {
            TransportError::Socket(format!("connect timed out after {}ms", timeout.as_millis()))
        })?
        .map_err(|e| TransportError::Socket(e.to_string()))?;
    Ok(ws)
}

/// Runs the connect/read/write/redial cycle until shutdown.
pub(crate) async fn drive(
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let dialed = tokio::select! {
            result = dial(&shared.request) => result,
            _ = shutdown.changed() => break,
        };
        match dialed {
            Ok(ws) => {
                attempt = 0;
                shared.connected.store(true, Ordering::SeqCst);
                tracing::debug!(url = %shared.request.url, "ws connected");
                shared.report(ChannelEvent::Opened);

                let end = run_socket(ws, &shared, &mut outbound, &mut shutdown).await;
                shared.connected.store(false, Ordering::SeqCst);
                match end {
                    SocketEnd::Shutdown => {
                        shared.fail_pending();
                        shared.report(ChannelEvent::Closed {
                            reason: CLIENT_DISCONNECT_REASON.to_string(),
                            reconnecting: false,
                        });
                        break;
                    }
                    SocketEnd::ServerClosed => {
                        shared.fail_pending();
                        shared.report(ChannelEvent::Closed {
                            reason: SERVER_DISCONNECT_REASON.to_string(),
                            reconnecting: false,
                        });
                        break;
                    }
                    SocketEnd::Dropped(reason) => {
                        shared.interrupt_pending(reason);
                        shared.report(ChannelEvent::Closed {
                            reason: reason.to_string(),
                            reconnecting: true,
                        });
                    }
                }
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "ws connect failed");
                shared.report(ChannelEvent::ConnectFailed {
                    message: e.to_string(),
                });
            }
        }

        let delay = shared.request.policy.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    shared.connected.store(false, Ordering::SeqCst);
    shared.fail_pending();
    tracing::debug!("ws driver stopped");
}

/// Runs the read/write loop for one socket.
async fn run_socket(
    ws: WsStream,
    shared: &Shared,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> SocketEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                    Some(Ok(Message::Close(_))) => return SocketEnd::ServerClosed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "ws read failed");
                        return SocketEnd::Dropped(TRANSPORT_ERROR_REASON);
                    }
                    None => return SocketEnd::Dropped(TRANSPORT_CLOSE_REASON),
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SocketEnd::Shutdown;
                };
                if let Err(e) = write_frame(&mut ws_tx, &frame).await {
                    tracing::warn!(error = %e, "ws write failed");
                    return SocketEnd::Dropped(TRANSPORT_ERROR_REASON);
                }
            }
            _ = shutdown.changed() => {
                while let Ok(frame) = outbound.try_recv() {
                    if write_frame(&mut ws_tx, &frame).await.is_err() {
                        break;
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                return SocketEnd::Shutdown;
            }
        }
    }
}

async fn write_frame<S>(ws_tx: &mut S, frame: &Frame) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = frame.to_text()?;
    ws_tx
        .send(Message::text(text))
        .await
        .map_err(|e| TransportError::Socket(e.to_string()))
}
