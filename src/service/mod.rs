//! Service layer: connection ownership, heartbeats, acknowledged calls and
//! event routing.
//!
//! [`ConnectionManager`] owns the channel and wires the other three
//! components to it through a shared [`crate::channel::ChannelSlot`].

pub mod connection_manager;
pub mod event_router;
pub mod heartbeat_monitor;
pub mod request_dispatcher;
pub mod retry;

pub use connection_manager::ConnectionManager;
pub use event_router::EventRouter;
pub use heartbeat_monitor::HeartbeatMonitor;
pub use request_dispatcher::RequestDispatcher;
pub use retry::{Failure, RetryOutcome};
