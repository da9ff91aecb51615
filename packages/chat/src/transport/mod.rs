//! Chat transport: the realtime socket plus the REST fallback.
//!
//! One [`ChatTransport`] is owned per chat session. It drives the STOMP
//! connection, subscribes the surveyor's topics on every CONNECTED, decodes
//! MESSAGE frames into [`TransportEvent`]s and falls back to REST (then to an
//! in-memory outbound queue) while the socket is down.

mod event;
mod queue;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use surveylink_shared::time::Clock;
use tokio::{sync::mpsc, task::JoinHandle};

pub use event::{EventHub, EventSubscription, TransportEvent};
pub use queue::OutboundQueue;

use crate::{
    api::ChatApi,
    config::ChatConfig,
    connection::{ConnectionEvent, ConnectionManager, Connector},
    domain::conversation_id,
    dto::{ChatConversation, ChatMessageDto, MessageType, OutgoingMessage, ReadReceipt, TypingIndicator},
    error::{ConfigError, TransportError},
    model::{ConnectionState, Identity, SenderType},
    stomp::Frame,
    subscription::{Channel, SubscriptionRegistry},
};

const SEND_DESTINATION: &str = "/app/chat.send";
const TYPING_DESTINATION: &str = "/app/chat.typing";
const READ_DESTINATION: &str = "/app/chat.read";

/// Realtime chat transport of one surveyor session
pub struct ChatTransport {
    inner: Arc<Inner>,
    pump: JoinHandle<()>,
}

struct Inner {
    connection: ConnectionManager,
    api: Arc<dyn ChatApi>,
    hub: EventHub,
    identity: Mutex<Option<Identity>>,
    active_conversation: Mutex<Option<String>>,
    queue: Mutex<OutboundQueue>,
    clock: Arc<dyn Clock>,
    config: ChatConfig,
}

impl ChatTransport {
    /// Create the transport and spawn its connection driver.
    ///
    /// Must be called inside a tokio runtime. Nothing connects until
    /// [`ChatTransport::connect`].
    pub fn new(
        config: ChatConfig,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let url = config.websocket_url()?;
        let (connection, events) = ConnectionManager::spawn(url, connector, config.connection.clone());
        let queue = OutboundQueue::new(
            config.outbound_queue_capacity,
            config.outbound_retention.as_millis() as i64,
        );

        let inner = Arc::new(Inner {
            connection,
            api,
            hub: EventHub::new(),
            identity: Mutex::new(None),
            active_conversation: Mutex::new(None),
            queue: Mutex::new(queue),
            clock,
            config,
        });
        let pump = tokio::spawn(pump(Arc::clone(&inner), events));

        Ok(Self { inner, pump })
    }

    /// Connect as `identity`. Idempotent for the same identity.
    pub fn connect(&self, identity: Identity) {
        *lock(&self.inner.identity) = Some(identity.clone());
        self.inner.connection.connect(identity);
    }

    /// Send DISCONNECT, close the socket and cancel any pending retry
    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn identity(&self) -> Option<Identity> {
        lock(&self.inner.identity).clone()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    /// Register a listener for transport events
    pub fn subscribe(&self) -> EventSubscription {
        self.inner.hub.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.hub.listener_count()
    }

    /// Send a text message to `recipient_id`.
    ///
    /// Goes over the socket when connected. Otherwise it is posted over REST
    /// and the stored message is published as a received message. When REST
    /// fails too, the message is queued until the next CONNECTED and
    /// [`TransportError::Queued`] is returned.
    pub async fn send_message(
        &self,
        recipient_id: i64,
        recipient_type: SenderType,
        content: &str,
    ) -> Result<(), TransportError> {
        let identity = self.identity().ok_or(TransportError::NoIdentity)?;
        let message = OutgoingMessage {
            sender_id: identity.surveyor_id,
            sender_type: SenderType::Surveyor,
            sender_name: identity.surveyor_name,
            recipient_id,
            recipient_type,
            content: content.to_string(),
            message_type: MessageType::Text,
            conversation_id: conversation_id(identity.surveyor_id, recipient_id),
        };

        if self.state().is_connected() {
            self.inner.send_json(SEND_DESTINATION, &message);
            return Ok(());
        }

        tracing::info!("Socket not connected, sending message over REST");
        match self.inner.api.send_message(&message).await {
            Ok(stored) => {
                self.inner.hub.publish(TransportEvent::Message(stored));
                Ok(())
            }
            Err(e) => {
                tracing::warn!("REST send failed, queueing message: {}", e);
                let now = self.inner.clock.now_millis();
                lock(&self.inner.queue).push(message, now);
                Err(TransportError::Queued(e))
            }
        }
    }

    /// Tell the other party whether the surveyor is typing. No-op when not connected.
    pub fn send_typing_indicator(&self, conversation_id: &str, is_typing: bool) {
        if !self.state().is_connected() {
            return;
        }
        let Some(identity) = self.identity() else {
            return;
        };
        let indicator = TypingIndicator {
            conversation_id: conversation_id.to_string(),
            user_id: identity.surveyor_id,
            user_type: SenderType::Surveyor,
            user_name: identity.surveyor_name,
            is_typing,
        };
        self.inner.send_json(TYPING_DESTINATION, &indicator);
    }

    /// Mark a conversation read. No-op when not connected.
    pub fn mark_as_read(&self, conversation_id: &str) {
        self.inner.mark_as_read(conversation_id);
    }

    /// Record the conversation on screen and mark it read
    pub fn set_active_conversation(&self, conversation_id: Option<String>) {
        if let Some(id) = &conversation_id {
            self.inner.mark_as_read(id);
        }
        *lock(&self.inner.active_conversation) = conversation_id;
    }

    pub fn active_conversation(&self) -> Option<String> {
        lock(&self.inner.active_conversation).clone()
    }

    /// Messages waiting in the outbound queue
    pub fn queued_message_count(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    // ========================================
    // REST fallback
    // ========================================

    /// One page of a conversation's history, newest first.
    ///
    /// `offset` counts messages skipped from the newest end, so older pages
    /// are fetched with `offset = pages_loaded * limit`.
    pub async fn load_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessageDto>, TransportError> {
        Ok(self
            .inner
            .api
            .load_messages(conversation_id, limit, offset)
            .await?)
    }

    pub async fn load_conversations(&self) -> Result<Vec<ChatConversation>, TransportError> {
        let identity = self.identity().ok_or(TransportError::NoIdentity)?;
        Ok(self.inner.api.load_conversations(identity.surveyor_id).await?)
    }

    pub async fn unread_count(&self) -> Result<u64, TransportError> {
        let identity = self.identity().ok_or(TransportError::NoIdentity)?;
        Ok(self
            .inner
            .api
            .unread_count(identity.surveyor_id, SenderType::Surveyor)
            .await?)
    }

    /// Open the conversation with `dispatcher_id` and return its id
    pub async fn start_conversation(&self, dispatcher_id: i64) -> Result<String, TransportError> {
        let identity = self.identity().ok_or(TransportError::NoIdentity)?;
        Ok(self
            .inner
            .api
            .start_conversation(identity.surveyor_id, dispatcher_id)
            .await?)
    }

    pub async fn send_message_rest(&self, message: &OutgoingMessage) -> Result<ChatMessageDto, TransportError> {
        Ok(self.inner.api.send_message(message).await?)
    }
}

impl Drop for ChatTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Turn connection events into transport events
async fn pump(inner: Arc<Inner>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
    let mut registry = SubscriptionRegistry::new();
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::StateChanged(state) => inner.on_state_changed(state, &mut registry),
            ConnectionEvent::Frame(frame) => inner.on_frame(&frame, &registry),
        }
    }
}

impl Inner {
    fn on_state_changed(self: &Arc<Self>, state: ConnectionState, registry: &mut SubscriptionRegistry) {
        match state {
            ConnectionState::Connected => {
                if let Some(identity) = lock(&self.identity).clone() {
                    for frame in registry.subscribe_all(identity.surveyor_id) {
                        self.connection.send(frame);
                    }
                }
                self.flush_queue();
                self.hub.publish(TransportEvent::ConnectionChanged(state));
                self.spawn_refresh_conversations();
                self.spawn_refresh_unread_count();
            }
            ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                registry.clear();
                self.hub.publish(TransportEvent::ConnectionChanged(state));
            }
            ConnectionState::Connecting => {
                self.hub.publish(TransportEvent::ConnectionChanged(state));
            }
        }
    }

    fn on_frame(self: &Arc<Self>, frame: &Frame, registry: &SubscriptionRegistry) {
        let Some(channel) = registry.route(frame) else {
            tracing::debug!("Ignoring {} frame", frame.command);
            return;
        };

        match channel {
            Channel::Message => match serde_json::from_str::<ChatMessageDto>(&frame.body) {
                Ok(message) => {
                    let is_active = lock(&self.active_conversation).as_deref()
                        == Some(message.conversation_id.as_str());
                    self.hub.publish(TransportEvent::Message(message));
                    self.spawn_refresh_conversations();
                    if !is_active {
                        self.spawn_refresh_unread_count();
                    }
                }
                Err(e) => tracing::warn!("Failed to parse chat message: {}", e),
            },
            Channel::Typing => match serde_json::from_str::<TypingIndicator>(&frame.body) {
                Ok(indicator) => self.hub.publish(TransportEvent::Typing(indicator)),
                Err(e) => tracing::warn!("Failed to parse typing indicator: {}", e),
            },
            Channel::ReadReceipt => match serde_json::from_str::<ReadReceipt>(&frame.body) {
                Ok(receipt) => self.hub.publish(TransportEvent::ReadReceipt(receipt)),
                Err(e) => tracing::warn!("Failed to parse read receipt: {}", e),
            },
        }
    }

    fn flush_queue(&self) {
        let now = self.clock.now_millis();
        let pending = lock(&self.queue).drain_fresh(now);
        if pending.is_empty() {
            return;
        }
        tracing::info!("Flushing {} queued messages", pending.len());
        for message in &pending {
            self.send_json(SEND_DESTINATION, message);
        }
    }

    fn mark_as_read(&self, conversation_id: &str) {
        if !self.connection.state().is_connected() {
            return;
        }
        let identity = lock(&self.identity).clone();
        let receipt = ReadReceipt {
            conversation_id: conversation_id.to_string(),
            recipient_id: identity.as_ref().map(|identity| identity.surveyor_id),
            recipient_type: Some(SenderType::Surveyor),
        };
        self.send_json(READ_DESTINATION, &receipt);
    }

    fn send_json<T: Serialize>(&self, destination: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.connection.send(Frame::send_json(destination, json)),
            Err(e) => tracing::error!("Failed to serialize payload for {}: {}", destination, e),
        }
    }

    fn spawn_refresh_conversations(self: &Arc<Self>) {
        let Some(identity) = lock(&self.identity).clone() else {
            return;
        };
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.api.load_conversations(identity.surveyor_id).await {
                Ok(conversations) => inner.hub.publish(TransportEvent::Conversations(conversations)),
                Err(e) => tracing::warn!("Failed to refresh conversations: {}", e),
            }
        });
    }

    fn spawn_refresh_unread_count(self: &Arc<Self>) {
        let Some(identity) = lock(&self.identity).clone() else {
            return;
        };
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner
                .api
                .unread_count(identity.surveyor_id, SenderType::Surveyor)
                .await
            {
                Ok(count) => inner.hub.publish(TransportEvent::UnreadCount(count)),
                Err(e) => tracing::warn!("Failed to refresh unread count: {}", e),
            }
        });
    }
}

/// Lock ignoring poisoning; the guarded values stay consistent across panics
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
