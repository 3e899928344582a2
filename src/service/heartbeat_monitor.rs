//! Periodic liveness probes and latency reporting.
//!
//! [`HeartbeatMonitor`] runs one timer task per connection. The task probes
//! immediately, then every interval, and each probe waits at most the
//! configured bound for its ack before the next tick can fire, so there is
//! never more than one outstanding ticket. A missed ack is only logged; the
//! host notices silence as a missing latency update.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::bridge::Bridge;
use crate::channel::{Channel, ChannelSlot};
use crate::domain::heartbeat::HEARTBEAT_EVENT;
use crate::domain::{HeartbeatAck, HeartbeatSequence, LifecycleNotice};
use crate::error::TransportError;

/// Default probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default probe ack bound.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness prober for the current channel.
#[derive(Debug)]
pub struct HeartbeatMonitor<C> {
    slot: Arc<ChannelSlot<C>>,
    bridge: Arc<dyn Bridge>,
    sequence: Arc<HeartbeatSequence>,
    interval: Duration,
    timeout: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Channel> HeartbeatMonitor<C> {
    /// Creates a stopped monitor.
    #[must_use]
    pub fn new(
        slot: Arc<ChannelSlot<C>>,
        bridge: Arc<dyn Bridge>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            slot,
            bridge,
            sequence: Arc::new(HeartbeatSequence::new()),
            interval,
            timeout,
            timer: Mutex::new(None),
        }
    }

    /// Starts probing on behalf of `owner`, replacing any running timer.
    ///
    /// Does nothing and returns `false` if `owner` is no longer the current
    /// channel.
    pub fn start(&self, owner: &Arc<C>) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.slot.is_current(owner) {
            return false;
        }
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(probe_loop(
            Arc::clone(&self.slot),
            Arc::clone(&self.bridge),
            Arc::clone(&self.sequence),
            self.interval,
            self.timeout,
        )));
        tracing::debug!(interval_ms = self.interval.as_millis(), "heartbeat started");
        true
    }

    /// Cancels the timer. A probe in flight is abandoned, not retried.
    pub fn stop(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
            tracing::debug!("heartbeat stopped");
        }
    }

    /// Cancels the timer only if `owner` is still the current channel.
    ///
    /// Lets a superseded channel's late events leave a newer connection's
    /// timer alone.
    pub fn stop_for(&self, owner: &Arc<C>) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.slot.is_current(owner) {
            return;
        }
        if let Some(handle) = timer.take() {
            handle.abort();
            tracing::debug!("heartbeat stopped");
        }
    }

    /// Returns `true` while a timer is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Returns the most recently issued sequence number.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.sequence.last()
    }
}

impl<C> Drop for HeartbeatMonitor<C> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn probe_loop<C: Channel>(
    slot: Arc<ChannelSlot<C>>,
    bridge: Arc<dyn Bridge>,
    sequence: Arc<HeartbeatSequence>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(channel) = slot.current() else {
            continue;
        };
        let ticket = sequence.issue();
        let seq = ticket.sequence;
        match channel
            .emit_with_ack(HEARTBEAT_EVENT, json!({ "seq": seq }), timeout)
            .await
        {
            Ok(raw) => match decode_ack(raw) {
                Ok(ack) if ack.answers(&ticket) => {
                    let report = ticket.report();
                    tracing::debug!(seq, latency_ms = report.latency, "heartbeat acknowledged");
                    bridge.notify(&LifecycleNotice::Heartbeat(report));
                }
                Ok(ack) => {
                    bridge.warn(&format!(
                        "Heartbeat {seq} answered with mismatched sequence {:?}",
                        ack.seq
                    ));
                }
                Err(e) => {
                    bridge.warn(&format!("Heartbeat {seq} answered with malformed ack: {e}"));
                }
            },
            Err(TransportError::Timeout { .. }) => {
                bridge.warn(&format!("Heartbeat {seq} timed out"));
            }
            Err(e) => {
                bridge.warn(&format!("Heartbeat {seq} failed: {e}"));
            }
        }
    }
}

/// A bare ack carries no sequence and answers any heartbeat.
fn decode_ack(raw: Value) -> Result<HeartbeatAck, serde_json::Error> {
    if raw.is_null() {
        return Ok(HeartbeatAck::default());
    }
    serde_json::from_value(raw)
}
