//! Socket seam between the connection state machine and the network.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::error::ConnectionError;

/// Write half of an open socket: one text payload per item
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;

/// Read half of an open socket. The stream ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// Opens sockets for the connection driver
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), ConnectionError>;
}

/// Production connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), ConnectionError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
        tracing::debug!(
            "WebSocket transport connected to {} (HTTP {})",
            url,
            response.status()
        );

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| ConnectionError::Socket(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, ConnectionError>(Message::Text(text.into()))));

        let stream = read
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(data)) => Some(Ok(String::from_utf8_lossy(&data).into_owned())),
                    // Ping/pong are answered by tungstenite
                    Ok(_) => None,
                    Err(e) => Some(Err(ConnectionError::Socket(e.to_string()))),
                })
            });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
