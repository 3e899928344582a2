//! Heartbeat tickets, sequence counter and latency reports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Event name used for liveness probes.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Process-lifetime heartbeat sequence counter.
///
/// Never reset on reconnect; the first issued sequence is `1`.
#[derive(Debug, Default)]
pub struct HeartbeatSequence(AtomicU64);

impl HeartbeatSequence {
    /// Creates a counter that has issued nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket carrying the next sequence number, stamped now.
    pub fn issue(&self) -> HeartbeatTicket {
        let sequence = self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        HeartbeatTicket {
            sequence,
            sent_at: Instant::now(),
        }
    }

    /// Returns the most recently issued sequence (`0` if none).
    #[must_use]
    pub fn last(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// One outstanding liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTicket {
    /// Strictly increasing probe number.
    pub sequence: u64,
    /// When the probe was sent.
    pub sent_at: Instant,
}

impl HeartbeatTicket {
    /// Round-trip time elapsed since the probe was sent.
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.sent_at.elapsed()
    }

    /// Builds the report forwarded to the host.
    #[must_use]
    pub fn report(&self) -> HeartbeatReport {
        HeartbeatReport {
            seq: self.sequence,
            latency: u64::try_from(self.latency().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Latency update forwarded as the `heartbeat` lifecycle notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReport {
    /// Sequence the ack answered.
    pub seq: u64,
    /// Round trip in milliseconds.
    pub latency: u64,
}

/// Server reply to a probe: `{ "seq": n }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HeartbeatAck {
    /// Echoed sequence, when the server includes it.
    #[serde(default)]
    pub seq: Option<u64>,
}

impl HeartbeatAck {
    /// Returns `true` if this ack answers `ticket`.
    ///
    /// An ack without a sequence is accepted.
    #[must_use]
    pub fn answers(&self, ticket: &HeartbeatTicket) -> bool {
        self.seq.is_none_or(|seq| seq == ticket.sequence)
    }
}
