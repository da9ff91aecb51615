//! In-memory sockets for driving the connection state machine in tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::{sync::mpsc, time::Instant};

use super::{Connector, FrameSink, FrameStream};
use crate::{
    error::ConnectionError,
    stomp::{self, Decoded, Frame, command},
};

/// Connector handing the server side of every accepted socket to the test
pub(crate) struct FakeConnector {
    refuse: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    accepted: mpsc::UnboundedSender<FakeSocket>,
}

impl FakeConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeSocket>) {
        let (accepted, sockets) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            refuse: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
            accepted,
        });
        (connector, sockets)
    }

    /// Make every following connect attempt fail
    pub(crate) fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Instants of every connect attempt so far
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<(FrameSink, FrameStream), ConnectionError> {
        self.attempts.lock().unwrap().push(Instant::now());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectionError::Handshake("connection refused".to_string()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel::<String>();
        let (to_client, from_server) = mpsc::unbounded_channel::<Result<String, ConnectionError>>();

        let sink = sink::unfold(to_server, |tx, payload: String| async move {
            tx.send(payload).map_err(|_| ConnectionError::Closed)?;
            Ok::<_, ConnectionError>(tx)
        });
        let stream = stream::unfold(from_server, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let _ = self.accepted.send(FakeSocket {
            from_client,
            to_client,
        });
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Server side of one fake socket. Dropping it closes the socket.
pub(crate) struct FakeSocket {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String, ConnectionError>>,
}

impl FakeSocket {
    /// Next frame written by the client, skipping heart-beats
    pub(crate) async fn next_frame(&mut self) -> Option<Frame> {
        while let Some(raw) = self.from_client.recv().await {
            match stomp::decode(&raw) {
                Ok(Decoded::Frame(frame)) => return Some(frame),
                Ok(Decoded::Heartbeat) => continue,
                Err(e) => panic!("client wrote a malformed frame: {e}"),
            }
        }
        None
    }

    /// Next raw payload written by the client, heart-beats included
    pub(crate) async fn next_raw(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Expect the CONNECT frame and answer with CONNECTED
    pub(crate) async fn accept(&mut self) -> Frame {
        let connect = self.next_frame().await.expect("socket closed before CONNECT");
        assert_eq!(connect.command, command::CONNECT);
        self.send_frame(Frame::new(command::CONNECTED).header("version", "1.2"));
        connect
    }

    pub(crate) fn send_raw(&self, raw: &str) {
        let _ = self.to_client.send(Ok(raw.to_string()));
    }

    pub(crate) fn send_frame(&self, frame: Frame) {
        self.send_raw(&frame.encode());
    }

    /// Deliver a MESSAGE frame on `destination`
    pub(crate) fn deliver(&self, destination: &str, body: &str) {
        self.send_frame(
            Frame::new(command::MESSAGE)
                .header("destination", destination)
                .header("subscription", "sub-0")
                .header("message-id", "1")
                .body(body),
        );
    }

    /// Fail the socket with a transport error
    pub(crate) fn fail(&self) {
        let _ = self
            .to_client
            .send(Err(ConnectionError::Socket("connection reset".to_string())));
    }
}
