//! Domain layer: connection state, credentials, heartbeat and ack types.
//!
//! This module contains the value types shared by every component of the
//! transport core: the connection lifecycle state, the bearer credential,
//! heartbeat tickets, the ack envelope, the static event allow-lists and the
//! lifecycle notices forwarded to the host.

pub mod ack;
pub mod allow_list;
pub mod connection_state;
pub mod credential;
pub mod heartbeat;
pub mod notice;

pub use ack::AckEnvelope;
pub use allow_list::EventAllowList;
pub use connection_state::ConnectionState;
pub use credential::Credential;
pub use heartbeat::{HeartbeatAck, HeartbeatReport, HeartbeatSequence, HeartbeatTicket};
pub use notice::LifecycleNotice;
