//! WebSocket transport: frame envelope, socket driver and the channel
//! implementation handed to [`crate::service::ConnectionManager`].

pub mod connection;
pub mod connector;
pub mod messages;

pub use connector::{WsChannel, WsConnector};
pub use messages::{Frame, FrameKind};
