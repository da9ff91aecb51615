//! Terminal chat client.
//!
//! Reads lines with `rustyline` on a blocking thread and multiplexes them
//! with session updates. Lines starting with `/` are commands:
//!
//! - `/refresh` reload the conversation from REST
//! - `/background`, `/foreground` simulate the app lifecycle
//! - `/conversations` show the conversation list
//! - `/quit` leave

use std::sync::Arc;

use rustyline::{DefaultEditor, error::ReadlineError};
use surveylink_shared::time::{Clock, SystemClock};
use tokio::sync::mpsc;

use crate::{
    api::RestChatApi,
    config::ChatConfig,
    connection::WebSocketConnector,
    error::ClientError,
    formatter::MessageFormatter,
    model::Identity,
    session::{AppState, ChatSessionController, SendOutcome, SessionUpdate},
    transport::ChatTransport,
    ui::redisplay_prompt,
};

enum Flow {
    Continue,
    Quit,
}

/// Run the terminal client until `/quit`, Ctrl+C or Ctrl+D
pub async fn run_client(config: ChatConfig, identity: Identity) -> Result<(), ClientError> {
    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| ClientError::HttpClient(e.to_string()))?;
    let api = Arc::new(RestChatApi::new(http, config.api_base_url.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport = Arc::new(ChatTransport::new(
        config,
        api,
        Arc::new(WebSocketConnector),
        Arc::clone(&clock),
    )?);

    let mut controller = ChatSessionController::new(transport, clock);
    controller.initialize(identity.clone()).await;

    println!(
        "\nYou are '{}'. Type messages and press Enter to send. Type /quit to exit.",
        identity.surveyor_name
    );
    print!(
        "{}",
        MessageFormatter::format_history(&controller.state().messages, identity.surveyor_id)
    );

    let mut input_rx = spawn_readline(identity.surveyor_name.clone());

    loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                if let Flow::Quit = handle_line(&mut controller, &identity, &line).await {
                    break;
                }
            }
            update = controller.next_update() => {
                let Some(update) = update else {
                    break;
                };
                render(&update, &identity);
            }
        }
    }

    controller.teardown().await;
    tracing::info!("Chat client stopped");
    Ok(())
}

/// Spawn a blocking thread for rustyline (synchronous readline)
fn spawn_readline(prompt_name: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", prompt_name);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

async fn handle_line(controller: &mut ChatSessionController, identity: &Identity, line: &str) -> Flow {
    match line {
        "/quit" => return Flow::Quit,
        "/refresh" => {
            controller.refresh_messages().await;
            print!(
                "{}",
                MessageFormatter::format_history(&controller.state().messages, identity.surveyor_id)
            );
        }
        "/background" => {
            controller.on_app_state_change(AppState::Background).await;
            println!("\n* App in background");
        }
        "/foreground" => {
            controller.on_app_state_change(AppState::Active).await;
            print!(
                "{}",
                MessageFormatter::format_history(&controller.state().messages, identity.surveyor_id)
            );
        }
        "/conversations" => {
            print!(
                "{}",
                MessageFormatter::format_conversations(&controller.state().conversations)
            );
        }
        // rustyline only yields whole lines, so there is no partial input to
        // report as typing
        text => {
            match controller.send_message(text).await {
                SendOutcome::Sent => {
                    if let Some(message) = controller.state().messages.last() {
                        print!("{}", MessageFormatter::format_chat_message(message, identity.surveyor_id));
                    }
                }
                SendOutcome::Queued => {
                    print!(
                        "{}",
                        MessageFormatter::format_queued(controller.state().queued_message_count)
                    );
                }
                SendOutcome::Ignored => {}
                SendOutcome::NotInitialized => tracing::warn!("Chat is not initialized"),
            }
        }
    }
    redisplay_prompt(&identity.surveyor_name);
    Flow::Continue
}

fn render(update: &SessionUpdate, identity: &Identity) {
    let surveyor_id = identity.surveyor_id;
    let formatted = match update {
        SessionUpdate::ConnectionChanged(state) => MessageFormatter::format_connection_state(*state),
        SessionUpdate::MessageAppended(message) => {
            MessageFormatter::format_chat_message(message, surveyor_id)
        }
        SessionUpdate::MessageElsewhere(message) => MessageFormatter::format_elsewhere(message),
        SessionUpdate::TypingStarted(user_name) => MessageFormatter::format_typing(user_name),
        SessionUpdate::UnreadCount(count) => MessageFormatter::format_unread_count(*count),
        SessionUpdate::MessageConfirmed {
            optimistic_id,
            server_id,
        } => {
            tracing::debug!("Message {} delivered as {}", optimistic_id, server_id);
            return;
        }
        SessionUpdate::DuplicateIgnored
        | SessionUpdate::TypingCleared
        | SessionUpdate::ReadReceipt(_)
        | SessionUpdate::Conversations(_) => return,
    };
    print!("{}", formatted);
    redisplay_prompt(&identity.surveyor_name);
}
