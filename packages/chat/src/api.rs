//! REST fallback for the chat backend.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::{
    dto::{
        ChatConversation, ChatMessageDto, OutgoingMessage, StartConversationResponse,
        UnreadCountResponse,
    },
    error::ApiError,
    model::SenderType,
};

/// Chat REST endpoints.
///
/// Non-2xx responses are errors. Nothing is retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// History of a conversation, newest first
    async fn load_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessageDto>, ApiError>;

    async fn load_conversations(&self, surveyor_id: i64) -> Result<Vec<ChatConversation>, ApiError>;

    async fn unread_count(&self, user_id: i64, user_type: SenderType) -> Result<u64, ApiError>;

    /// Open (or reopen) the conversation and return its id
    async fn start_conversation(
        &self,
        surveyor_id: i64,
        dispatcher_id: i64,
    ) -> Result<String, ApiError>;

    async fn send_message(&self, message: &OutgoingMessage) -> Result<ChatMessageDto, ApiError>;
}

/// [`ChatApi`] over HTTP with `reqwest`
pub struct RestChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl RestChatApi {
    /// `base_url` is the API root, e.g. `https://api.example.com/api`
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatApi for RestChatApi {
    async fn load_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessageDto>, ApiError> {
        let endpoint = format!("/chat/messages/{}", conversation_id);
        let request = self
            .client
            .get(self.url(&endpoint))
            .query(&[("limit", limit), ("offset", offset)]);
        execute(&endpoint, request).await
    }

    async fn load_conversations(&self, surveyor_id: i64) -> Result<Vec<ChatConversation>, ApiError> {
        let endpoint = format!("/chat/conversations/surveyor/{}", surveyor_id);
        let request = self.client.get(self.url(&endpoint));
        execute(&endpoint, request).await
    }

    async fn unread_count(&self, user_id: i64, user_type: SenderType) -> Result<u64, ApiError> {
        let endpoint = "/chat/unread";
        let request = self.client.get(self.url(endpoint)).query(&[
            ("userId", user_id.to_string()),
            ("userType", user_type.as_str().to_string()),
        ]);
        let response: UnreadCountResponse = execute(endpoint, request).await?;
        Ok(response.unread_count)
    }

    async fn start_conversation(
        &self,
        surveyor_id: i64,
        dispatcher_id: i64,
    ) -> Result<String, ApiError> {
        let endpoint = "/chat/conversations/start";
        let request = self
            .client
            .post(self.url(endpoint))
            .query(&[("surveyorId", surveyor_id), ("dispatcherId", dispatcher_id)]);
        let response: StartConversationResponse = execute(endpoint, request).await?;
        Ok(response.conversation_id)
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<ChatMessageDto, ApiError> {
        let endpoint = "/chat/messages";
        let request = self.client.post(self.url(endpoint)).json(message);
        execute(endpoint, request).await
    }
}

async fn execute<T: DeserializeOwned>(
    endpoint: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ApiError> {
    tracing::debug!("REST {}", endpoint);
    let response = request.send().await.map_err(|e| ApiError::Request {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!("REST {} failed with HTTP {}", endpoint, status);
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    response.json::<T>().await.map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
