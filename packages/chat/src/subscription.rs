//! Topic subscriptions of one surveyor session.
//!
//! The set of channels is closed: chat messages, typing indicators and read
//! receipts. There is no general purpose registration API.

use crate::stomp::{Frame, command};

/// Subscription to one broker destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub destination: String,
}

/// Channel a MESSAGE frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Message,
    Typing,
    ReadReceipt,
}

/// Message topic of a surveyor; typing and read topics hang below it
pub fn surveyor_topic(surveyor_id: i64) -> String {
    format!("/topic/chat/surveyor/{surveyor_id}")
}

/// Tracks the live subscriptions and hands out subscription ids.
///
/// Ids are `sub-N` with `N` increasing for the lifetime of the registry;
/// they are never reused, not even after a reconnect.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    active: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active set with the three topics of `surveyor_id`.
    ///
    /// Returns the SUBSCRIBE frames to write, in order.
    pub fn subscribe_all(&mut self, surveyor_id: i64) -> Vec<Frame> {
        let topic = surveyor_topic(surveyor_id);
        let destinations = [
            topic.clone(),
            format!("{topic}/typing"),
            format!("{topic}/read"),
        ];

        self.active.clear();
        destinations
            .into_iter()
            .map(|destination| {
                let subscription = Subscription {
                    id: format!("sub-{}", self.next_id),
                    destination,
                };
                self.next_id += 1;
                let frame = Frame::subscribe(&subscription.id, &subscription.destination);
                tracing::debug!(
                    "Subscribing {} to {}",
                    subscription.id,
                    subscription.destination
                );
                self.active.push(subscription);
                frame
            })
            .collect()
    }

    /// Drop every subscription; the broker forgets them with the socket
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn active(&self) -> &[Subscription] {
        &self.active
    }

    /// Route a frame to its channel.
    ///
    /// Returns `None` for anything that is not a MESSAGE frame. Destinations
    /// ending in `/typing` or `/read` go to those channels, everything else
    /// is a chat message.
    pub fn route(&self, frame: &Frame) -> Option<Channel> {
        if frame.command != command::MESSAGE {
            return None;
        }

        let destination = frame.get("destination").unwrap_or_default();
        let channel = if destination.ends_with("/typing") {
            Channel::Typing
        } else if destination.ends_with("/read") {
            Channel::ReadReceipt
        } else {
            Channel::Message
        };
        Some(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_to(destination: &str) -> Frame {
        Frame::new(command::MESSAGE).header("destination", destination)
    }

    #[test]
    fn test_subscribe_all_issues_three_frames() {
        // テスト項目: 接続時に 3 つの SUBSCRIBE フレームが生成される
        // given (前提条件):
        let mut registry = SubscriptionRegistry::new();

        // when (操作):
        let frames = registry.subscribe_all(7);

        // then (期待する結果):
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.command == command::SUBSCRIBE));
        let destinations: Vec<_> = frames.iter().map(|f| f.get("destination").unwrap()).collect();
        assert_eq!(
            destinations,
            vec![
                "/topic/chat/surveyor/7",
                "/topic/chat/surveyor/7/typing",
                "/topic/chat/surveyor/7/read",
            ]
        );
        let ids: Vec<_> = frames.iter().map(|f| f.get("id").unwrap()).collect();
        assert_eq!(ids, vec!["sub-0", "sub-1", "sub-2"]);
    }

    #[test]
    fn test_ids_are_not_reused_after_resubscribe() {
        // テスト項目: 再接続後の購読 ID は以前の ID を再利用せず増加し続ける
        // given (前提条件):
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe_all(7);
        registry.clear();

        // when (操作):
        let frames = registry.subscribe_all(7);

        // then (期待する結果):
        let ids: Vec<_> = frames.iter().map(|f| f.get("id").unwrap()).collect();
        assert_eq!(ids, vec!["sub-3", "sub-4", "sub-5"]);
        assert_eq!(registry.active().len(), 3);
    }

    #[test]
    fn test_clear_removes_active_subscriptions() {
        // テスト項目: clear で購読がすべて破棄される
        // given (前提条件):
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe_all(7);

        // when (操作):
        registry.clear();

        // then (期待する結果):
        assert!(registry.active().is_empty());
    }

    #[test]
    fn test_route_by_destination_suffix() {
        // テスト項目: 宛先の末尾でチャンネルが振り分けられる
        // given (前提条件):
        let registry = SubscriptionRegistry::new();

        // when (操作):
        let typing = registry.route(&message_to("/topic/chat/surveyor/7/typing"));
        let read = registry.route(&message_to("/topic/chat/surveyor/7/read"));
        let message = registry.route(&message_to("/topic/chat/surveyor/7"));

        // then (期待する結果):
        assert_eq!(typing, Some(Channel::Typing));
        assert_eq!(read, Some(Channel::ReadReceipt));
        assert_eq!(message, Some(Channel::Message));
    }

    #[test]
    fn test_route_unknown_destination_is_message() {
        // テスト項目: 未知の宛先や宛先無しのフレームはチャットメッセージとして扱われる
        // given (前提条件):
        let registry = SubscriptionRegistry::new();

        // when (操作):
        let unknown = registry.route(&message_to("/queue/somewhere/else"));
        let missing = registry.route(&Frame::new(command::MESSAGE));

        // then (期待する結果):
        assert_eq!(unknown, Some(Channel::Message));
        assert_eq!(missing, Some(Channel::Message));
    }

    #[test]
    fn test_route_ignores_non_message_frames() {
        // テスト項目: MESSAGE 以外のフレームはルーティングされない
        // given (前提条件):
        let registry = SubscriptionRegistry::new();
        let frame = Frame::new("RECEIPT").header("receipt-id", "1");

        // when (操作):
        let result = registry.route(&frame);

        // then (期待する結果):
        assert_eq!(result, None);
    }
}
