//! Error types for the SurveyLink chat client.

use thiserror::Error;

/// Protocol-level errors raised while decoding a STOMP frame.
///
/// These never reach callers: the connection driver logs and drops the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The payload has no command line
    #[error("frame has no command line")]
    MissingCommand,

    /// A non-header line appeared before the blank line that ends the headers
    #[error("malformed header line '{0}'")]
    MalformedHeader(String),
}

/// Transport-level errors of the WebSocket itself.
///
/// These are consumed by the reconnect state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The WebSocket could not be opened
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// Reading from or writing to an open socket failed
    #[error("WebSocket I/O error: {0}")]
    Socket(String),

    /// The peer closed the socket
    #[error("WebSocket closed by peer")]
    Closed,
}

/// REST-level errors. These propagate to the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// The server answered with a non-2xx status
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// The response body could not be decoded
    #[error("invalid response body from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Errors returned by `ChatTransport`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No surveyor identity has been set
    #[error("no surveyor identity; connect first")]
    NoIdentity,

    /// A REST call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Neither the socket nor REST accepted the message; it waits in the
    /// outbound queue
    #[error("message queued for re-sending: {0}")]
    Queued(#[source] ApiError),
}

/// Configuration errors detected at start-up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The API base URL is not an http(s) URL
    #[error("API base URL '{0}' must start with http:// or https://")]
    InvalidBaseUrl(String),
}

/// Terminal client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
