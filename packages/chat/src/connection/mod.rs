//! Realtime connection: socket ownership, STOMP handshake, heart-beats and
//! reconnection with exponential backoff.

mod connector;
mod manager;

#[cfg(test)]
pub(crate) mod testing;

pub use connector::{Connector, FrameSink, FrameStream, WebSocketConnector};
pub use manager::{ConnectionEvent, ConnectionManager};
