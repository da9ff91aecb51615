//! Stand-in chat backend for integration tests: a STOMP broker on
//! `/ws/chat/websocket` plus the REST endpoints under `/api/chat`.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use surveylink_chat::{
    SenderType,
    dto::{
        ChatConversation, ChatMessageDto, MessageType, OutgoingMessage,
        StartConversationResponse, UnreadCountResponse,
    },
    stomp::{self, Decoded, Frame, command},
};
use surveylink_shared::time::{get_timestamp_millis, millis_to_rfc3339};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};

/// Upper bound for any single wait in the integration tests
pub const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
enum Outbound {
    Frame(String),
    Close,
}

/// Everything the broker has seen, plus switches to make it misbehave
pub struct BrokerState {
    /// Destinations of every SUBSCRIBE frame, in arrival order
    pub subscriptions: Mutex<Vec<String>>,
    /// Every SEND frame, in arrival order
    pub sends: Mutex<Vec<Frame>>,
    /// Stored messages, oldest first
    pub messages: Mutex<Vec<ChatMessageDto>>,
    /// `(limit, offset)` of the last history request
    pub last_page: Mutex<Option<(usize, usize)>>,
    /// `userType` of the last unread-count request
    pub last_unread_user_type: Mutex<Option<String>>,
    pub unread_count: AtomicU64,
    /// Answer WebSocket upgrades with 503
    pub reject_websocket: AtomicBool,
    /// Answer `POST /api/chat/messages` with 503
    pub fail_rest_send: AtomicBool,
    next_id: AtomicI64,
    outbound: broadcast::Sender<Outbound>,
}

impl BrokerState {
    fn new() -> Self {
        let (outbound, _) = broadcast::channel(64);
        Self {
            subscriptions: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            last_page: Mutex::new(None),
            last_unread_user_type: Mutex::new(None),
            unread_count: AtomicU64::new(0),
            reject_websocket: AtomicBool::new(false),
            fail_rest_send: AtomicBool::new(false),
            next_id: AtomicI64::new(100),
            outbound,
        }
    }

    /// Persist a message the way the backend does: new id, server timestamp
    fn store(&self, message: &OutgoingMessage) -> ChatMessageDto {
        let stored = ChatMessageDto {
            id: Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id,
            sender_type: message.sender_type,
            sender_name: Some(message.sender_name.clone()),
            recipient_id: Some(message.recipient_id),
            recipient_type: Some(message.recipient_type),
            content: message.content.clone(),
            message_type: Some(message.message_type),
            sent_at: Some(millis_to_rfc3339(get_timestamp_millis())),
            status: Some("SENT".to_string()),
        };
        self.messages.lock().unwrap().push(stored.clone());
        stored
    }

    /// Push a MESSAGE frame to every open socket
    fn deliver(&self, destination: &str, body: String) {
        let frame = Frame::new(command::MESSAGE)
            .header("destination", destination)
            .header("subscription", "sub-0")
            .header("message-id", self.next_id.load(Ordering::SeqCst).to_string())
            .body(body);
        let _ = self.outbound.send(Outbound::Frame(frame.encode()));
    }

    /// Handle one client frame. Returns the replies and whether to close.
    fn on_frame(&self, frame: Frame) -> (Vec<String>, bool) {
        match frame.command.as_str() {
            command::CONNECT => {
                let connected = Frame::new(command::CONNECTED)
                    .header("version", "1.2")
                    .header("heart-beat", "0,0");
                (vec![connected.encode()], false)
            }
            command::SUBSCRIBE => {
                if let Some(destination) = frame.get("destination") {
                    self.subscriptions
                        .lock()
                        .unwrap()
                        .push(destination.to_string());
                }
                (Vec::new(), false)
            }
            command::SEND => {
                let echo = if frame.get("destination") == Some("/app/chat.send") {
                    serde_json::from_str::<OutgoingMessage>(&frame.body)
                        .ok()
                        .map(|message| self.store(&message))
                } else {
                    None
                };
                self.sends.lock().unwrap().push(frame);
                if let Some(stored) = echo {
                    let destination = format!("/topic/chat/surveyor/{}", stored.sender_id);
                    self.deliver(&destination, serde_json::to_string(&stored).unwrap());
                }
                (Vec::new(), false)
            }
            command::DISCONNECT => (Vec::new(), true),
            _ => (Vec::new(), false),
        }
    }
}

/// Running stand-in backend; stops when dropped
pub struct TestBroker {
    pub state: Arc<BrokerState>,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl TestBroker {
    pub async fn start() -> Self {
        let state = Arc::new(BrokerState::new());
        let app = Router::new()
            .route("/ws/chat/websocket", get(websocket_handler))
            .route("/api/chat/messages/{conversation_id}", get(load_messages))
            .route("/api/chat/messages", post(send_message))
            .route(
                "/api/chat/conversations/surveyor/{surveyor_id}",
                get(load_conversations),
            )
            .route("/api/chat/conversations/start", post(start_conversation))
            .route("/api/chat/unread", get(unread_count))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            addr,
            server,
        }
    }

    /// REST base URL the client is configured with
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Close every open socket as a network drop would
    pub fn drop_connections(&self) {
        let _ = self.state.outbound.send(Outbound::Close);
    }

    /// Store and deliver a message from dispatcher 1
    pub fn push_dispatcher_message(&self, surveyor_id: i64, content: &str) -> ChatMessageDto {
        let stored = self.state.store(&OutgoingMessage {
            sender_id: 1,
            sender_type: SenderType::Dispatcher,
            sender_name: "Dispatch".to_string(),
            recipient_id: surveyor_id,
            recipient_type: SenderType::Surveyor,
            content: content.to_string(),
            message_type: MessageType::Text,
            conversation_id: format!("surveyor_{surveyor_id}_dispatcher_1"),
        });
        self.state.deliver(
            &format!("/topic/chat/surveyor/{surveyor_id}"),
            serde_json::to_string(&stored).unwrap(),
        );
        stored
    }

    /// Deliver a raw body on a destination
    pub fn deliver(&self, destination: &str, body: &str) {
        self.state.deliver(destination, body.to_string());
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<Frame> {
        self.state.sends.lock().unwrap().clone()
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Poll `condition` until it holds or [`WAIT`] elapses
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<BrokerState>>) -> Response {
    if state.reject_websocket.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BrokerState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = state.outbound.subscribe();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(message)) = incoming else {
                    break;
                };
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(Decoded::Frame(frame)) = stomp::decode(text.as_str()) else {
                    continue;
                };
                let (replies, close) = state.on_frame(frame);
                for reply in replies {
                    if sender.send(Message::Text(reply.into())).await.is_err() {
                        return;
                    }
                }
                if close {
                    break;
                }
            }
            outgoing = outbound.recv() => match outgoing {
                Ok(Outbound::Frame(raw)) => {
                    if sender.send(Message::Text(raw.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Outbound::Close) | Err(_) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}

#[derive(Deserialize)]
struct Page {
    limit: usize,
    offset: usize,
}

async fn load_messages(
    State(state): State<Arc<BrokerState>>,
    Path(conversation_id): Path<String>,
    Query(page): Query<Page>,
) -> Json<Vec<ChatMessageDto>> {
    *state.last_page.lock().unwrap() = Some((page.limit, page.offset));
    let messages = state.messages.lock().unwrap();
    let newest_first = messages
        .iter()
        .rev()
        .filter(|m| m.conversation_id == conversation_id)
        .skip(page.offset)
        .take(page.limit)
        .cloned()
        .collect();
    Json(newest_first)
}

async fn send_message(
    State(state): State<Arc<BrokerState>>,
    Json(message): Json<OutgoingMessage>,
) -> Result<Json<ChatMessageDto>, StatusCode> {
    if state.fail_rest_send.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(state.store(&message)))
}

async fn load_conversations(Path(surveyor_id): Path<i64>) -> Json<Vec<ChatConversation>> {
    Json(vec![ChatConversation {
        conversation_id: format!("surveyor_{surveyor_id}_dispatcher_1"),
        other_party_id: 1,
        other_party_name: "Dispatch".to_string(),
        other_party_type: SenderType::Dispatcher,
        last_message: None,
        last_message_at: None,
        unread_count: 0,
    }])
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartQuery {
    surveyor_id: i64,
    dispatcher_id: i64,
}

async fn start_conversation(Query(query): Query<StartQuery>) -> Json<StartConversationResponse> {
    Json(StartConversationResponse {
        conversation_id: format!(
            "surveyor_{}_dispatcher_{}",
            query.surveyor_id, query.dispatcher_id
        ),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadQuery {
    #[allow(dead_code)]
    user_id: i64,
    user_type: String,
}

async fn unread_count(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<UnreadQuery>,
) -> Json<UnreadCountResponse> {
    *state.last_unread_user_type.lock().unwrap() = Some(query.user_type);
    Json(UnreadCountResponse {
        unread_count: state.unread_count.load(Ordering::SeqCst),
    })
}
