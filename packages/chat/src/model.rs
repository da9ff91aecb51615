//! Domain models of the chat client.

use serde::{Deserialize, Serialize};

/// Prefix of ids assigned to optimistic local echoes
pub const OPTIMISTIC_ID_PREFIX: &str = "opt-";

/// Prefix of ids assigned to realtime messages that arrived without a server id
pub const LOCAL_ID_PREFIX: &str = "ws-";

/// Role of a chat participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Surveyor,
    Dispatcher,
}

impl SenderType {
    /// Wire representation (`SURVEYOR` / `DISPATCHER`)
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Surveyor => "SURVEYOR",
            SenderType::Dispatcher => "DISPATCHER",
        }
    }
}

/// The logged-in surveyor the transport acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub surveyor_id: i64,
    pub surveyor_name: String,
}

impl Identity {
    pub fn new(surveyor_id: i64, surveyor_name: impl Into<String>) -> Self {
        Self {
            surveyor_id,
            surveyor_name: surveyor_name.into(),
        }
    }
}

/// Observable state of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// A chat message held in session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Server id, or an `opt-`/`ws-` prefixed local id
    pub id: String,
    pub conversation_id: String,
    pub sender_id: i64,
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
    pub content: String,
    /// Unix timestamp (milliseconds)
    pub sent_at: i64,
}

impl ChatMessage {
    /// Build the optimistic local echo of a message the surveyor just sent
    pub fn optimistic(identity: &Identity, conversation_id: String, content: String, now: i64) -> Self {
        Self {
            id: format!("{}{}", OPTIMISTIC_ID_PREFIX, uuid::Uuid::new_v4()),
            conversation_id,
            sender_id: identity.surveyor_id,
            sender_type: SenderType::Surveyor,
            sender_name: Some(identity.surveyor_name.clone()),
            content,
            sent_at: now,
        }
    }

    /// Whether this entry is still waiting for its server id
    pub fn is_optimistic(&self) -> bool {
        self.id.starts_with(OPTIMISTIC_ID_PREFIX)
    }

    /// Whether the id was assigned by the server
    pub fn has_server_id(&self) -> bool {
        !self.id.starts_with(OPTIMISTIC_ID_PREFIX) && !self.id.starts_with(LOCAL_ID_PREFIX)
    }
}
