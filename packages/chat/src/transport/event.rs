//! Typed event fan-out to transport listeners.
//!
//! ## Responsibilities
//!
//! - Keep the `UnboundedSender` of every live listener
//! - Broadcast each event to all of them, dropping listeners that went away
//!
//! A listener unregisters by calling [`EventSubscription::unsubscribe`] or by
//! dropping its subscription.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use tokio::sync::mpsc;

use super::lock;
use crate::{
    dto::{ChatConversation, ChatMessageDto, ReadReceipt, TypingIndicator},
    model::ConnectionState,
};

/// Event published by the chat transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ConnectionChanged(ConnectionState),
    Message(ChatMessageDto),
    Typing(TypingIndicator),
    ReadReceipt(ReadReceipt),
    /// Conversation list refreshed over REST
    Conversations(Vec<ChatConversation>),
    /// Unread count refreshed over REST
    UnreadCount(u64),
}

type Listeners = Mutex<HashMap<u64, mpsc::UnboundedSender<TransportEvent>>>;

#[derive(Default)]
struct Registry {
    next_id: Mutex<u64>,
    listeners: Listeners,
}

/// Broadcast hub for [`TransportEvent`]s
#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Registry>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener
    pub fn subscribe(&self) -> EventSubscription {
        let id = {
            let mut next_id = lock(&self.registry.next_id);
            *next_id += 1;
            *next_id
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.registry.listeners).insert(id, sender);
        tracing::debug!("Transport listener {} registered", id);

        EventSubscription {
            id,
            registry: Arc::downgrade(&self.registry),
            receiver,
        }
    }

    /// Deliver `event` to every listener
    pub fn publish(&self, event: TransportEvent) {
        let mut listeners = lock(&self.registry.listeners);
        listeners.retain(|id, sender| {
            // a failed send only drops that listener
            if sender.send(event.clone()).is_err() {
                tracing::warn!("Transport listener {} is gone, removing it", id);
                false
            } else {
                true
            }
        });
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry.listeners).len()
    }
}

/// Receiving end of one listener registration
pub struct EventSubscription {
    id: u64,
    registry: Weak<Registry>,
    receiver: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry.listeners).remove(&self.id);
            tracing::debug!("Transport listener {} unregistered", self.id);
        }
    }
}
