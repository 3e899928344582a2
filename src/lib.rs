//! # session-link
//!
//! Real-time session transport core for a chat/voice client.
//!
//! The crate keeps one persistent bidirectional channel to a server on
//! behalf of a host process. It probes liveness with sequenced heartbeats,
//! runs acknowledged calls with a per-attempt timeout and bounded retry,
//! and filters events crossing the host/network boundary through static
//! allow-lists.
//!
//! ## Architecture
//!
//! ```text
//! Host process (JSON lines on stdio)
//!     │
//!     ├── Bridge + intent reader (bridge/)
//!     ├── Session (session.rs)
//!     │
//!     ├── ConnectionManager (service/)
//!     │     ├── HeartbeatMonitor
//!     │     ├── EventRouter ── RequestDispatcher
//!     │     └── ChannelSlot (channel/)
//!     │
//!     └── WsConnector / WsChannel (ws/)
//!           └── Server (WebSocket)
//! ```

pub mod bridge;
pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod session;
pub mod ws;

#[cfg(test)]
mod testing;
