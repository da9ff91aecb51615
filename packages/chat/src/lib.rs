//! SurveyLink dispatcher chat.
//!
//! A STOMP-over-WebSocket chat client for field surveyors: frame codec,
//! connection lifecycle with heart-beats and backoff, topic subscriptions,
//! REST fallback, and the session layer that reconciles optimistic sends
//! with what the server delivers.

// protocol and transport
pub mod connection;
pub mod stomp;
pub mod subscription;
pub mod transport;

// REST
pub mod api;
pub mod dto;

// session
pub mod domain;
pub mod model;
pub mod session;

// terminal client
pub mod formatter;
pub mod runner;
pub mod ui;

pub mod config;
pub mod error;

pub use api::{ChatApi, RestChatApi};
pub use config::{ChatConfig, ConnectionConfig};
pub use connection::{ConnectionManager, Connector, WebSocketConnector};
pub use model::{ChatMessage, ConnectionState, Identity, SenderType};
pub use session::{AppState, ChatSessionController, SendOutcome, SessionState, SessionUpdate};
pub use transport::{ChatTransport, EventSubscription, TransportEvent};
