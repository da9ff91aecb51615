//! Outbound messages waiting for the socket.

use std::collections::VecDeque;

use crate::dto::OutgoingMessage;

#[derive(Debug, Clone, PartialEq)]
struct Queued {
    message: OutgoingMessage,
    queued_at: i64,
}

/// Bounded FIFO of messages that neither the socket nor REST accepted.
///
/// When full, the queued messages are kept and new ones are dropped.
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    retention_millis: i64,
    entries: VecDeque<Queued>,
}

impl OutboundQueue {
    pub fn new(capacity: usize, retention_millis: i64) -> Self {
        Self {
            capacity,
            retention_millis,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: OutgoingMessage, now: i64) {
        if self.entries.len() >= self.capacity {
            tracing::warn!(
                "Outbound queue full ({} messages), dropping message",
                self.capacity
            );
            return;
        }
        self.entries.push_back(Queued {
            message,
            queued_at: now,
        });
    }

    /// Take every message still within the retention window, oldest first
    pub fn drain_fresh(&mut self, now: i64) -> Vec<OutgoingMessage> {
        let before = self.entries.len();
        let fresh: Vec<OutgoingMessage> = self
            .entries
            .drain(..)
            .filter(|queued| now - queued.queued_at <= self.retention_millis)
            .map(|queued| queued.message)
            .collect();
        let expired = before - fresh.len();
        if expired > 0 {
            tracing::info!("Discarded {} expired queued messages", expired);
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dto::MessageType, model::SenderType};

    fn message(content: &str) -> OutgoingMessage {
        OutgoingMessage {
            sender_id: 7,
            sender_type: SenderType::Surveyor,
            sender_name: "Sam".to_string(),
            recipient_id: 1,
            recipient_type: SenderType::Dispatcher,
            content: content.to_string(),
            message_type: MessageType::Text,
            conversation_id: "7_1".to_string(),
        }
    }

    #[test]
    fn test_full_queue_drops_new_messages() {
        // テスト項目: 上限に達すると古いメッセージを残し、新しいメッセージを捨てる
        // given (前提条件):
        let mut queue = OutboundQueue::new(2, 300_000);
        queue.push(message("a"), 0);
        queue.push(message("b"), 1);

        // when (操作):
        queue.push(message("c"), 2);

        // then (期待する結果):
        let contents: Vec<String> = queue
            .drain_fresh(3)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_discards_expired_messages() {
        // テスト項目: 保持期間を過ぎたメッセージは送信対象から除外される
        // given (前提条件):
        let mut queue = OutboundQueue::new(100, 300_000);
        queue.push(message("stale"), 0);
        queue.push(message("fresh"), 200_000);

        // when (操作):
        let drained = queue.drain_fresh(300_001);

        // then (期待する結果):
        assert_eq!(drained, vec![message("fresh")]);
        assert_eq!(queue.len(), 0);
    }
}
