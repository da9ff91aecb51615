//! Minimal STOMP 1.2 framing used over the chat WebSocket.

mod frame;

pub use frame::{Decoded, Frame, HEARTBEAT, command, decode, encode};
