//! Domain logic for the chat client.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use std::time::Duration;

use crate::{config::ConnectionConfig, model::ChatMessage};

/// Two messages with the same content and sender closer than this are one message.
pub const DEDUP_WINDOW_MILLIS: i64 = 5_000;

/// Minimum spacing between two outgoing typing indicators.
pub const TYPING_THROTTLE_MILLIS: i64 = 2_000;

/// How long the remote typing banner survives without a new indicator.
pub const TYPING_BANNER_TIMEOUT: Duration = Duration::from_secs(3);

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `current_attempt` - The number of retries already scheduled (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
///
/// # Returns
///
/// `true` if another reconnection should be scheduled, `false` otherwise
pub fn should_attempt_reconnect(current_attempt: u32, max_attempts: u32) -> bool {
    current_attempt < max_attempts
}

/// Delay before the retry numbered `attempt` (0-indexed).
///
/// `min(base * 2^attempt, max)`, i.e. 1000, 2000, 4000, 8000, 16000, 30000 ms
/// with the default configuration.
pub fn reconnect_delay(attempt: u32, config: &ConnectionConfig) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    config
        .base_reconnect_delay
        .checked_mul(factor)
        .map_or(config.max_reconnect_delay, |delay| {
            delay.min(config.max_reconnect_delay)
        })
}

/// Derive the chat WebSocket URL from the REST base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, a trailing `/api` segment is
/// dropped and `/ws/chat/websocket` is appended.
///
/// Returns `None` when the base URL is not an http(s) URL.
pub fn websocket_url(api_base_url: &str) -> Option<String> {
    let trimmed = api_base_url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);

    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return None;
    };

    Some(format!("{ws_base}/ws/chat/websocket"))
}

/// Deterministic conversation id between a surveyor and a dispatcher
pub fn conversation_id(surveyor_id: i64, dispatcher_id: i64) -> String {
    format!("surveyor_{surveyor_id}_dispatcher_{dispatcher_id}")
}

/// Check whether `incoming` is the same message as `existing`.
///
/// Matches by id, or by identical content and sender sent less than
/// [`DEDUP_WINDOW_MILLIS`] apart. The time-window match can merge two
/// genuinely distinct messages typed in quick succession; it stays until the
/// server echoes the client's optimistic id.
pub fn is_duplicate(existing: &ChatMessage, incoming: &ChatMessage) -> bool {
    if existing.id == incoming.id {
        return true;
    }

    existing.content == incoming.content
        && existing.sender_id == incoming.sender_id
        && existing.sender_type == incoming.sender_type
        && (existing.sent_at - incoming.sent_at).abs() < DEDUP_WINDOW_MILLIS
}

/// Check whether a typing indicator may be sent now.
///
/// # Arguments
///
/// * `last_sent` - When the previous indicator went out, if ever (milliseconds)
/// * `now` - Current time (milliseconds)
pub fn should_send_typing(last_sent: Option<i64>, now: i64) -> bool {
    match last_sent {
        Some(last) => now - last > TYPING_THROTTLE_MILLIS,
        None => true,
    }
}
