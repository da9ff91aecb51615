//! Message formatting utilities for the terminal client.

use surveylink_shared::time::millis_to_local_hhmm;

use crate::{
    dto::ChatConversation,
    model::{ChatMessage, ConnectionState, SenderType},
};

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    /// * `surveyor_id` - The current surveyor (their own messages are shown as "me")
    ///
    /// # Returns
    ///
    /// A formatted string with the chat message
    pub fn format_chat_message(message: &ChatMessage, surveyor_id: i64) -> String {
        let from = if message.sender_type == SenderType::Surveyor && message.sender_id == surveyor_id {
            "me".to_string()
        } else {
            match (&message.sender_name, message.sender_type) {
                (Some(name), _) => name.clone(),
                (None, SenderType::Dispatcher) => "Dispatch".to_string(),
                (None, SenderType::Surveyor) => format!("surveyor {}", message.sender_id),
            }
        };
        let pending = if message.is_optimistic() { " (sending)" } else { "" };
        format!(
            "\n[{}] @{}: {}{}\n",
            millis_to_local_hhmm(message.sent_at),
            from,
            message.content,
            pending
        )
    }

    /// Format the full message list, oldest first
    pub fn format_history(messages: &[ChatMessage], surveyor_id: i64) -> String {
        let mut output = String::new();
        output.push_str("\n============================================================\n");
        if messages.is_empty() {
            output.push_str("(No messages)\n");
        } else {
            for message in messages {
                output.push_str(
                    Self::format_chat_message(message, surveyor_id).trim_start_matches('\n'),
                );
            }
        }
        output.push_str("============================================================\n");
        output
    }

    /// Format the conversation list
    pub fn format_conversations(conversations: &[ChatConversation]) -> String {
        let mut output = String::new();
        output.push_str("\n============================================================\n");
        output.push_str("Conversations:\n");

        if conversations.is_empty() {
            output.push_str("(No conversations)\n");
        } else {
            for conversation in conversations {
                let last = conversation.last_message.as_deref().unwrap_or("-");
                output.push_str(&format!(
                    "{} ({}) - {} unread - {}\n",
                    conversation.other_party_name,
                    conversation.conversation_id,
                    conversation.unread_count,
                    last
                ));
            }
        }

        output.push_str("============================================================\n");
        output
    }

    pub fn format_connection_state(state: ConnectionState) -> String {
        let label = match state {
            ConnectionState::Disconnected => "Offline",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Online",
            ConnectionState::Reconnecting => "Reconnecting...",
        };
        format!("\n* {}\n", label)
    }

    pub fn format_typing(user_name: &str) -> String {
        format!("\n{} is typing...\n", user_name)
    }

    pub fn format_unread_count(count: u64) -> String {
        format!("\n* {} unread\n", count)
    }

    /// Format a notice for a message outside the conversation on screen
    pub fn format_elsewhere(message: &ChatMessage) -> String {
        format!("\n* New message in {}\n", message.conversation_id)
    }

    /// Format a notice for a message that went to the outbound queue
    pub fn format_queued(queued_count: usize) -> String {
        format!(
            "\nMessage queued ({} waiting). It will be sent when the connection is restored.\n",
            queued_count
        )
    }
}
