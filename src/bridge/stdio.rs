//! JSON-lines bridge over stdin/stdout.
//!
//! The host process writes one JSON object per line:
//!
//! ```text
//! {"type":"connect","token":"..."}
//! {"type":"message","event":"typing","args":[{"channel":"c1"}]}
//! {"type":"invoke","id":"7","event":"sendMessage","payload":{...}}
//! {"type":"disconnect"}
//! ```
//!
//! and reads back `event`, `log` and `reply` lines in the same format.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{Bridge, LogLevel, UiIntent};
use crate::error::InvokeReply;

/// A line written by the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Fire-and-forget event.
    Message {
        /// Event name.
        event: String,
        /// Argument list.
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Acknowledged call, answered by a `reply` line with the same `id`.
    Invoke {
        /// Host correlation id.
        id: String,
        /// Event name.
        event: String,
        /// Call payload.
        #[serde(default)]
        payload: Value,
    },
    /// Open the channel.
    Connect {
        /// Bearer token.
        token: String,
    },
    /// Close the channel.
    Disconnect,
}

/// A line written to the host.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostOutput<'a> {
    Event {
        event: &'a str,
        args: &'a [Value],
    },
    Log {
        level: LogLevel,
        message: &'a str,
    },
    Reply {
        id: &'a str,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<&'a Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u32>,
    },
}

/// [`Bridge`] that writes JSON lines to `W`.
#[derive(Debug)]
pub struct StdioBridge<W> {
    out: Mutex<W>,
}

impl StdioBridge<io::Stdout> {
    /// Creates a bridge writing to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> StdioBridge<W> {
    /// Creates a bridge writing to `out`.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Writes the reply line for invoke `id`.
    pub fn reply(&self, id: &str, reply: &InvokeReply) {
        self.write_line(&HostOutput::Reply {
            id,
            ok: reply.ok,
            data: reply.data.as_ref(),
            error: reply.error.as_deref(),
            code: reply.code,
        });
    }

    /// Consumes the bridge and returns the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, line: &HostOutput<'_>) {
        let Ok(json) = serde_json::to_string(line) else {
            tracing::error!("failed to encode host line");
            return;
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if writeln!(out, "{json}").and_then(|()| out.flush()).is_err() {
            tracing::error!("failed to write to host");
        }
    }
}

impl<W: Write + Send + std::fmt::Debug> Bridge for StdioBridge<W> {
    fn send_to_ui(&self, event: &str, args: Vec<Value>) {
        self.write_line(&HostOutput::Event { event, args: &args });
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.write_line(&HostOutput::Log { level, message });
    }
}

/// Parses one host line.
///
/// # Errors
///
/// Returns the decode error if the line is not a known command.
pub fn parse_line(line: &str) -> Result<HostCommand, serde_json::Error> {
    serde_json::from_str(line)
}

/// Reads host lines from `reader` and feeds them to `intents` until either
/// side closes.
///
/// Each invoke gets its own reply task so slow calls never block later
/// lines.
pub fn spawn_reader<R, W>(
    reader: R,
    bridge: Arc<StdioBridge<W>>,
    intents: mpsc::Sender<UiIntent>,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: Write + Send + std::fmt::Debug + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    bridge.error(&format!("Host input failed: {e}"));
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let command = match parse_line(&line) {
                Ok(command) => command,
                Err(e) => {
                    bridge.warn(&format!("Ignoring malformed host line: {e}"));
                    continue;
                }
            };
            let intent = into_intent(command, &bridge);
            if intents.send(intent).await.is_err() {
                break;
            }
        }
        tracing::debug!("host input closed");
    })
}

fn into_intent<W>(command: HostCommand, bridge: &Arc<StdioBridge<W>>) -> UiIntent
where
    W: Write + Send + std::fmt::Debug + 'static,
{
    match command {
        HostCommand::Message { event, args } => UiIntent::Message { event, args },
        HostCommand::Connect { token } => UiIntent::Connect { token },
        HostCommand::Disconnect => UiIntent::Disconnect,
        HostCommand::Invoke { id, event, payload } => {
            let (reply, rx) = oneshot::channel();
            let bridge = Arc::clone(bridge);
            tokio::spawn(async move {
                if let Ok(outcome) = rx.await {
                    bridge.reply(&id, &outcome);
                }
            });
            UiIntent::Invoke {
                event,
                payload,
                reply,
            }
        }
    }
}
