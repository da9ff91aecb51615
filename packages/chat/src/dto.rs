//! Data Transfer Objects (DTOs) exchanged with the chat backend.
//!
//! The same JSON shapes travel in STOMP frame bodies and REST payloads.

use serde::{Deserialize, Serialize};
use surveylink_shared::time::parse_rfc3339_millis;

use crate::model::{ChatMessage, LOCAL_ID_PREFIX, SenderType};

/// Content kind of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    Location,
}

/// Chat message as delivered by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub conversation_id: String,
    pub sender_id: i64,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_type: Option<SenderType>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    /// RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Payload of `SEND /app/chat.send` and `POST /chat/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: i64,
    pub sender_type: SenderType,
    pub sender_name: String,
    pub recipient_id: i64,
    pub recipient_type: SenderType,
    pub content: String,
    pub message_type: MessageType,
    pub conversation_id: String,
}

/// Typing indicator, both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub conversation_id: String,
    pub user_id: i64,
    pub user_type: SenderType,
    pub user_name: String,
    pub is_typing: bool,
}

/// Read receipt, both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_type: Option<SenderType>,
}

/// Entry of the surveyor's conversation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConversation {
    pub conversation_id: String,
    pub other_party_id: i64,
    #[serde(default)]
    pub other_party_name: String,
    pub other_party_type: SenderType,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub unread_count: u64,
}

/// Response of `GET /chat/unread`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

/// Response of `POST /chat/conversations/start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationResponse {
    pub conversation_id: String,
}

// ========================================
// DTO → Domain Model
// ========================================

impl ChatMessage {
    /// Convert a server DTO into a session message.
    ///
    /// A missing id becomes a local `ws-` id; a missing or unparsable
    /// `sentAt` falls back to `now`.
    pub fn from_dto(dto: ChatMessageDto, now: i64) -> Self {
        let id = match dto.id {
            Some(id) => id.to_string(),
            None => format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()),
        };
        let sent_at = dto
            .sent_at
            .as_deref()
            .and_then(parse_rfc3339_millis)
            .unwrap_or(now);

        Self {
            id,
            conversation_id: dto.conversation_id,
            sender_id: dto.sender_id,
            sender_type: dto.sender_type,
            sender_name: dto.sender_name,
            content: dto.content,
            sent_at,
        }
    }
}
