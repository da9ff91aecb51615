//! Connection state machine.
//!
//! ```text
//! Disconnected --connect()--> Connecting --socket open / CONNECT--> (CONNECTED) Connected
//! Connected --close/error--> Reconnecting --backoff--> Connecting ...
//! any --disconnect()--> Disconnected
//! ```
//!
//! A single driver task owns the socket, the heart-beat interval and the
//! retry timer. The public handle talks to it over a command channel.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};

use super::{Connector, FrameSink};
use crate::{
    config::ConnectionConfig,
    domain::{reconnect_delay, should_attempt_reconnect},
    model::{ConnectionState, Identity},
    stomp::{self, Decoded, Frame, HEARTBEAT, command},
};

/// Event emitted by the driver, in socket order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// A server frame other than CONNECTED / ERROR / heart-beat
    Frame(Frame),
}

enum Command {
    Connect(Identity),
    Disconnect,
    Send(Frame),
}

/// Handle to the connection driver.
///
/// At most one socket is live per manager. Dropping the manager stops the
/// driver and closes the socket.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    driver: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the driver for `url`.
    ///
    /// Returns the handle and the receiver of connection events.
    pub fn spawn(
        url: String,
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            url,
            connector,
            config,
            commands: commands_rx,
            events: events_tx,
            state: state_tx,
            identity: None,
            attempt: 0,
        };
        let driver = tokio::spawn(driver.run());

        let manager = Self {
            commands: commands_tx,
            state: state_rx,
            driver,
        };
        (manager, events_rx)
    }

    /// Connect as `identity`.
    ///
    /// Idempotent while connecting or connected with the same identity; a
    /// different identity replaces the live socket. Resets the retry counter.
    pub fn connect(&self, identity: Identity) {
        self.command(Command::Connect(identity));
    }

    /// Clean shutdown: DISCONNECT frame if connected, close the socket, cancel
    /// any pending retry. Resolves once the state is `Disconnected`.
    pub async fn disconnect(&self) {
        self.command(Command::Disconnect);
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }

    /// Queue a frame for the socket. Dropped with a warning unless connected.
    pub fn send(&self, frame: Frame) {
        self.command(Command::Send(frame));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Connection driver has stopped; command dropped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Why a socket session ended
enum SessionEnd {
    /// Socket closed or failed; reconnect
    Lost(String),
    /// `disconnect()` was called
    Closed,
    /// `connect()` was called with another identity
    Switch(Identity),
    /// Every handle is gone
    Shutdown,
}

/// Outcome of waiting for the next retry
enum Retry {
    Now,
    GiveUp,
    Cancelled,
    Shutdown,
}

struct Driver {
    url: String,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    identity: Option<Identity>,
    /// Retries scheduled since the last CONNECTED
    attempt: u32,
}

impl Driver {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Connect(identity) => {
                    self.identity = Some(identity);
                    self.attempt = 0;
                    if !self.connection_cycle().await {
                        break;
                    }
                }
                Command::Disconnect => tracing::debug!("Already disconnected"),
                Command::Send(frame) => {
                    tracing::warn!("Cannot send {} frame - not connected", frame.command)
                }
            }
        }
        tracing::debug!("Connection driver stopped");
    }

    /// Connect, and keep reconnecting until the user disconnects or retries
    /// are exhausted. Returns `false` when the driver should stop.
    async fn connection_cycle(&mut self) -> bool {
        loop {
            self.set_state(ConnectionState::Connecting);

            match self.session().await {
                SessionEnd::Closed => {
                    self.attempt = 0;
                    self.set_state(ConnectionState::Disconnected);
                    return true;
                }
                SessionEnd::Shutdown => return false,
                SessionEnd::Switch(identity) => {
                    self.identity = Some(identity);
                    self.attempt = 0;
                }
                SessionEnd::Lost(reason) => {
                    tracing::info!("Chat connection lost: {}", reason);
                    match self.wait_for_retry().await {
                        Retry::Now => {}
                        Retry::GiveUp => {
                            self.set_state(ConnectionState::Disconnected);
                            return true;
                        }
                        Retry::Cancelled => {
                            self.attempt = 0;
                            self.set_state(ConnectionState::Disconnected);
                            return true;
                        }
                        Retry::Shutdown => return false,
                    }
                }
            }
        }
    }

    async fn wait_for_retry(&mut self) -> Retry {
        if !should_attempt_reconnect(self.attempt, self.config.max_reconnect_attempts) {
            tracing::warn!(
                "Failed to reconnect after {} attempts; staying disconnected",
                self.attempt
            );
            return Retry::GiveUp;
        }

        let delay = reconnect_delay(self.attempt, &self.config);
        self.attempt += 1;
        self.set_state(ConnectionState::Reconnecting);
        tracing::info!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            self.attempt,
            self.config.max_reconnect_attempts
        );

        let retry_at = tokio::time::sleep(delay);
        tokio::pin!(retry_at);
        loop {
            tokio::select! {
                _ = &mut retry_at => return Retry::Now,
                command = self.commands.recv() => match command {
                    None => return Retry::Shutdown,
                    Some(Command::Disconnect) => return Retry::Cancelled,
                    Some(Command::Connect(identity)) => {
                        self.identity = Some(identity);
                        self.attempt = 0;
                        return Retry::Now;
                    }
                    Some(Command::Send(frame)) => {
                        tracing::warn!("Cannot send {} frame - reconnecting", frame.command)
                    }
                },
            }
        }
    }

    /// Run one socket from open to close
    async fn session(&mut self) -> SessionEnd {
        let Some(identity) = self.identity.clone() else {
            return SessionEnd::Closed;
        };
        tracing::info!(
            "Connecting to {} as surveyor {}",
            self.url,
            identity.surveyor_id
        );

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let opening = connector.connect(&url);
        tokio::pin!(opening);
        let (mut sink, mut stream) = loop {
            tokio::select! {
                result = &mut opening => match result {
                    Ok(socket) => break socket,
                    Err(e) => return SessionEnd::Lost(e.to_string()),
                },
                command = self.commands.recv() => match command {
                    None => return SessionEnd::Shutdown,
                    Some(Command::Disconnect) => return SessionEnd::Closed,
                    Some(Command::Connect(next)) if next != identity => return SessionEnd::Switch(next),
                    Some(Command::Connect(_)) => tracing::debug!("Already connecting"),
                    Some(Command::Send(frame)) => {
                        tracing::warn!("Cannot send {} frame - still connecting", frame.command)
                    }
                },
            }
        };

        tracing::debug!("WebSocket open, sending STOMP CONNECT");
        let connect = Frame::connect(self.config.heartbeat_interval.as_millis());
        if let Err(e) = sink.send(connect.encode()).await {
            return SessionEnd::Lost(e.to_string());
        }

        let mut heartbeat: Option<Interval> = None;
        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    None => return SessionEnd::Lost("socket closed".to_string()),
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    Some(Ok(raw)) => {
                        if heartbeat.is_none() {
                            if let Some(interval) = self.on_handshake_payload(&raw) {
                                heartbeat = Some(interval);
                            }
                        } else {
                            self.on_payload(&raw);
                        }
                    }
                },
                _ = next_heartbeat(&mut heartbeat) => {
                    tracing::trace!("Sending heart-beat");
                    if let Err(e) = sink.send(HEARTBEAT.to_string()).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                },
                command = self.commands.recv() => {
                    let connected = heartbeat.is_some();
                    match command {
                        None => {
                            close(&mut sink, connected).await;
                            return SessionEnd::Shutdown;
                        }
                        Some(Command::Disconnect) => {
                            close(&mut sink, connected).await;
                            return SessionEnd::Closed;
                        }
                        Some(Command::Connect(next)) if next != identity => {
                            close(&mut sink, connected).await;
                            return SessionEnd::Switch(next);
                        }
                        Some(Command::Connect(_)) => tracing::debug!("Already connected or connecting"),
                        Some(Command::Send(frame)) if connected => {
                            if let Err(e) = sink.send(frame.encode()).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                        }
                        Some(Command::Send(frame)) => {
                            tracing::warn!("Cannot send {} frame - awaiting CONNECTED", frame.command)
                        }
                    }
                },
            }
        }
    }

    /// Handle a payload received before CONNECTED.
    ///
    /// Returns the heart-beat interval once the handshake completes.
    fn on_handshake_payload(&mut self, raw: &str) -> Option<Interval> {
        match stomp::decode(raw) {
            Ok(Decoded::Frame(frame)) if frame.command == command::CONNECTED => {
                tracing::info!("STOMP CONNECTED - fully connected");
                self.attempt = 0;
                self.set_state(ConnectionState::Connected);

                let period = self.config.heartbeat_interval;
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(interval)
            }
            _ => {
                self.on_payload(raw);
                None
            }
        }
    }

    fn on_payload(&mut self, raw: &str) {
        match stomp::decode(raw) {
            Ok(Decoded::Heartbeat) => tracing::trace!("Received heart-beat"),
            Ok(Decoded::Frame(frame)) if frame.command == command::ERROR => {
                tracing::error!(
                    "STOMP error: {} {}",
                    frame.get("message").unwrap_or_default(),
                    frame.body
                );
            }
            Ok(Decoded::Frame(frame)) if frame.command == command::CONNECTED => {
                tracing::debug!("Ignoring repeated CONNECTED frame");
            }
            Ok(Decoded::Frame(frame)) => {
                let _ = self.events.send(ConnectionEvent::Frame(frame));
            }
            Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::debug!("Connection state changed to {:?}", next);
            let _ = self.events.send(ConnectionEvent::StateChanged(next));
        }
    }
}

/// Resolve on the next heart-beat tick, or never before CONNECTED
async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Clean close: DISCONNECT if the STOMP session is up, then close the socket
async fn close(sink: &mut FrameSink, connected: bool) {
    if connected {
        if let Err(e) = sink.send(Frame::disconnect().encode()).await {
            tracing::debug!("Failed to send DISCONNECT: {}", e);
        }
    }
    if let Err(e) = sink.close().await {
        tracing::debug!("Failed to close socket: {}", e);
    }
}
