//! Session state of the chat screen.
//!
//! [`ChatSessionController`] owns the message list of the active
//! conversation and reconciles it with what the transport delivers:
//! optimistic local echoes, de-duplication of server echoes, typing-indicator
//! throttling and the remote typing banner, and the refresh on foreground
//! resume.

use std::sync::Arc;

use surveylink_shared::time::Clock;
use tokio::time::Instant;

use crate::{
    domain::{self, TYPING_BANNER_TIMEOUT},
    dto::{ChatConversation, ChatMessageDto, ReadReceipt, TypingIndicator},
    error::TransportError,
    model::{ChatMessage, ConnectionState, Identity, SenderType},
    transport::{ChatTransport, EventSubscription, TransportEvent},
};

/// Lifecycle state of the hosting application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Active,
    Inactive,
    Background,
}

/// What the UI renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Oldest first
    pub messages: Vec<ChatMessage>,
    pub active_conversation_id: Option<String>,
    pub unread_count: u64,
    pub connection_state: ConnectionState,
    /// Name of the dispatcher currently typing
    pub typing_user: Option<String>,
    pub conversations: Vec<ChatConversation>,
    pub queued_message_count: usize,
}

/// Result of [`ChatSessionController::send_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the socket or stored over REST
    Sent,
    /// Waiting in the outbound queue for the next connection
    Queued,
    /// Blank input, nothing sent
    Ignored,
    /// `initialize` has not been called
    NotInitialized,
}

/// State change reported by [`ChatSessionController::next_update`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    ConnectionChanged(ConnectionState),
    MessageAppended(ChatMessage),
    /// The server echo of an optimistic entry; the entry now carries the server id
    MessageConfirmed {
        optimistic_id: String,
        server_id: String,
    },
    DuplicateIgnored,
    /// A message for a conversation other than the active one
    MessageElsewhere(ChatMessage),
    TypingStarted(String),
    TypingCleared,
    ReadReceipt(ReadReceipt),
    Conversations(Vec<ChatConversation>),
    UnreadCount(u64),
}

/// Reconciliation layer between the chat transport and the UI
pub struct ChatSessionController {
    transport: Arc<ChatTransport>,
    clock: Arc<dyn Clock>,
    identity: Option<Identity>,
    state: SessionState,
    subscription: Option<EventSubscription>,
    last_typing_sent: Option<i64>,
    typing_deadline: Option<Instant>,
    app_state: AppState,
}

impl ChatSessionController {
    pub fn new(transport: Arc<ChatTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            identity: None,
            state: SessionState::default(),
            subscription: None,
            last_typing_sent: None,
            typing_deadline: None,
            app_state: AppState::Active,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Start chatting as `identity`.
    ///
    /// Releases the previous listener, registers a new one, connects and
    /// opens the conversation with the dispatcher. Switching to another
    /// surveyor drops everything held for the previous one first. A failure
    /// to open the conversation is logged and leaves the message list empty.
    pub async fn initialize(&mut self, identity: Identity) {
        tracing::info!("Initializing chat for surveyor {}", identity.surveyor_id);

        self.release_listeners();
        if self.identity.as_ref() != Some(&identity) {
            self.reset_session();
        }
        self.subscription = Some(self.transport.subscribe());
        self.identity = Some(identity.clone());
        self.state.connection_state = self.transport.state();
        self.transport.connect(identity);

        self.start_dispatcher_conversation().await;
    }

    async fn start_dispatcher_conversation(&mut self) {
        let dispatcher_id = self.transport.config().dispatcher_id;
        let conversation_id = match self.transport.start_conversation(dispatcher_id).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to start dispatcher conversation: {}", e);
                self.state.messages.clear();
                return;
            }
        };

        self.state.active_conversation_id = Some(conversation_id.clone());
        self.transport
            .set_active_conversation(Some(conversation_id.clone()));

        match self.load_history(&conversation_id).await {
            Ok(history) => self.state.messages = self.from_history(history),
            Err(e) => {
                tracing::error!("Failed to load chat history: {}", e);
                self.state.messages.clear();
            }
        }
    }

    /// Reload the active conversation from REST and replace the list.
    ///
    /// On failure the current list is kept.
    pub async fn refresh_messages(&mut self) {
        let Some(conversation_id) = self.state.active_conversation_id.clone() else {
            return;
        };
        match self.load_history(&conversation_id).await {
            Ok(history) => self.state.messages = self.from_history(history),
            Err(e) => tracing::error!("Failed to refresh chat messages: {}", e),
        }
    }

    /// Send `text` to the dispatcher.
    ///
    /// An optimistic entry is appended first; the call never fails. When
    /// the transport could not deliver, the entry stays and the message
    /// waits in the outbound queue.
    pub async fn send_message(&mut self, text: &str) -> SendOutcome {
        let content = text.trim();
        if content.is_empty() {
            return SendOutcome::Ignored;
        }
        let Some(identity) = self.identity.as_ref() else {
            tracing::warn!("Chat not initialized, message not sent");
            return SendOutcome::NotInitialized;
        };

        let dispatcher_id = self.transport.config().dispatcher_id;
        let conversation_id = self
            .state
            .active_conversation_id
            .clone()
            .unwrap_or_else(|| domain::conversation_id(identity.surveyor_id, dispatcher_id));
        let optimistic = ChatMessage::optimistic(
            identity,
            conversation_id,
            content.to_string(),
            self.clock.now_millis(),
        );
        self.state.messages.push(optimistic);

        let outcome = match self
            .transport
            .send_message(dispatcher_id, SenderType::Dispatcher, content)
            .await
        {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                tracing::warn!("Failed to send message: {}", e);
                SendOutcome::Queued
            }
        };
        self.state.queued_message_count = self.transport.queued_message_count();
        outcome
    }

    /// Input field changed; emits a typing indicator at most every 2 s
    pub fn handle_input_change(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let Some(conversation_id) = self.state.active_conversation_id.as_deref() else {
            return;
        };

        let now = self.clock.now_millis();
        if domain::should_send_typing(self.last_typing_sent, now) {
            self.last_typing_sent = Some(now);
            self.transport.send_typing_indicator(conversation_id, true);
        }
    }

    /// Application lifecycle hook.
    ///
    /// Coming back to the foreground reconnects if needed and reloads the
    /// active conversation from REST.
    pub async fn on_app_state_change(&mut self, next: AppState) {
        let resumed = matches!(self.app_state, AppState::Background | AppState::Inactive)
            && next == AppState::Active;
        self.app_state = next;
        if !resumed {
            return;
        }

        tracing::debug!("App came to foreground, refreshing chat");
        if let Some(identity) = &self.identity {
            if !self.transport.state().is_connected() {
                self.transport.connect(identity.clone());
            }
        }
        self.refresh_messages().await;
        self.state.queued_message_count = self.transport.queued_message_count();
    }

    /// Release the listener and disconnect.
    ///
    /// Used on logout, identity change and screen teardown.
    pub async fn teardown(&mut self) {
        self.release_listeners();
        self.identity = None;
        self.reset_session();
        self.transport.disconnect().await;
        self.state.connection_state = ConnectionState::Disconnected;
    }

    /// Wait for the next transport event or typing-banner expiry and apply it.
    ///
    /// Returns `None` before `initialize` and after `teardown`.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let subscription = self.subscription.as_mut()?;
        let event = tokio::select! {
            event = subscription.recv() => event?,
            _ = typing_expiry(self.typing_deadline) => {
                self.typing_deadline = None;
                self.state.typing_user = None;
                return Some(SessionUpdate::TypingCleared);
            }
        };
        Some(self.apply(event))
    }

    fn apply(&mut self, event: TransportEvent) -> SessionUpdate {
        match event {
            TransportEvent::ConnectionChanged(state) => {
                self.state.connection_state = state;
                self.state.queued_message_count = self.transport.queued_message_count();
                SessionUpdate::ConnectionChanged(state)
            }
            TransportEvent::Message(dto) => self.on_message(dto),
            TransportEvent::Typing(indicator) => self.on_typing(indicator),
            TransportEvent::ReadReceipt(receipt) => SessionUpdate::ReadReceipt(receipt),
            TransportEvent::Conversations(conversations) => {
                self.state.conversations = conversations.clone();
                SessionUpdate::Conversations(conversations)
            }
            TransportEvent::UnreadCount(count) => {
                self.state.unread_count = count;
                SessionUpdate::UnreadCount(count)
            }
        }
    }

    fn on_message(&mut self, dto: ChatMessageDto) -> SessionUpdate {
        let incoming = ChatMessage::from_dto(dto, self.clock.now_millis());

        if let Some(active) = self.state.active_conversation_id.as_deref() {
            if incoming.conversation_id != active {
                return SessionUpdate::MessageElsewhere(incoming);
            }
        }

        let existing = self
            .state
            .messages
            .iter_mut()
            .find(|existing| domain::is_duplicate(existing, &incoming));
        match existing {
            Some(existing) if existing.is_optimistic() && incoming.has_server_id() => {
                let optimistic_id = std::mem::replace(&mut existing.id, incoming.id.clone());
                tracing::debug!("Confirmed {} as message {}", optimistic_id, incoming.id);
                SessionUpdate::MessageConfirmed {
                    optimistic_id,
                    server_id: incoming.id,
                }
            }
            Some(_) => SessionUpdate::DuplicateIgnored,
            None => {
                self.state.messages.push(incoming.clone());
                SessionUpdate::MessageAppended(incoming)
            }
        }
    }

    fn on_typing(&mut self, indicator: TypingIndicator) -> SessionUpdate {
        if indicator.is_typing && indicator.user_type == SenderType::Dispatcher {
            self.state.typing_user = Some(indicator.user_name.clone());
            self.typing_deadline = Some(Instant::now() + TYPING_BANNER_TIMEOUT);
            SessionUpdate::TypingStarted(indicator.user_name)
        } else {
            self.state.typing_user = None;
            self.typing_deadline = None;
            SessionUpdate::TypingCleared
        }
    }

    fn release_listeners(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.typing_deadline = None;
        self.state.typing_user = None;
    }

    /// Forget the conversation, counters and throttle of the previous surveyor
    fn reset_session(&mut self) {
        let connection_state = self.state.connection_state;
        self.state = SessionState {
            connection_state,
            queued_message_count: self.transport.queued_message_count(),
            ..SessionState::default()
        };
        self.last_typing_sent = None;
        self.transport.set_active_conversation(None);
    }

    /// Newest page of the conversation
    async fn load_history(&self, conversation_id: &str) -> Result<Vec<ChatMessageDto>, TransportError> {
        let page_size = self.transport.config().history_page_size;
        self.transport.load_messages(conversation_id, page_size, 0).await
    }

    /// REST history is newest first
    fn from_history(&self, history: Vec<ChatMessageDto>) -> Vec<ChatMessage> {
        let now = self.clock.now_millis();
        history
            .into_iter()
            .rev()
            .map(|dto| ChatMessage::from_dto(dto, now))
            .collect()
    }
}

/// Resolve when the typing banner expires, or never without a banner
async fn typing_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
