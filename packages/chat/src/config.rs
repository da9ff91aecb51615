//! Client configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Dispatcher the surveyor chats with unless told otherwise.
pub const DEFAULT_DISPATCHER_ID: i64 = 1;

/// Connection tuning for the STOMP socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Interval between client keep-alive newlines once connected
    pub heartbeat_interval: Duration,
    /// First reconnect delay; doubled on every unacknowledged retry
    pub base_reconnect_delay: Duration,
    /// Upper bound for a single reconnect delay
    pub max_reconnect_delay: Duration,
    /// Retries scheduled before giving up and staying disconnected
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            base_reconnect_delay: Duration::from_millis(1_000),
            max_reconnect_delay: Duration::from_millis(30_000),
            max_reconnect_attempts: 5,
        }
    }
}

/// Top-level chat configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// REST base URL, e.g. `https://api.example.com/api`
    pub api_base_url: String,
    /// Dispatcher on the other side of the conversation
    pub dispatcher_id: i64,
    pub connection: ConnectionConfig,
    /// Messages kept for re-sending while both socket and REST are down
    pub outbound_queue_capacity: usize,
    /// Queued messages older than this are discarded instead of flushed
    pub outbound_retention: Duration,
    /// Page size used when loading conversation history
    pub history_page_size: u32,
}

impl ChatConfig {
    /// Create a configuration with default tuning for the given API base URL
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            dispatcher_id: DEFAULT_DISPATCHER_ID,
            connection: ConnectionConfig::default(),
            outbound_queue_capacity: 100,
            outbound_retention: Duration::from_secs(5 * 60),
            history_page_size: 50,
        }
    }

    /// WebSocket endpoint derived from the REST base URL
    pub fn websocket_url(&self) -> Result<String, ConfigError> {
        crate::domain::websocket_url(&self.api_base_url)
            .ok_or_else(|| ConfigError::InvalidBaseUrl(self.api_base_url.clone()))
    }
}
