//! SurveyLink chat terminal client.
//!
//! Signs in as a surveyor, opens the conversation with the dispatcher and
//! chats over STOMP/WebSocket. Falls back to REST while the socket is down
//! and reconnects with exponential backoff (1s doubling up to 30s, 5 retries).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin surveylink-chat -- --surveyor-id 7 --surveyor-name Sam
//! cargo run --bin surveylink-chat -- -i 7 -n Sam -u https://api.example.com/api
//! ```

use clap::Parser;

use surveylink_chat::{ChatConfig, Identity, runner::run_client};
use surveylink_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "surveylink-chat")]
#[command(about = "Dispatcher chat client for SurveyLink surveyors", long_about = None)]
struct Args {
    /// Surveyor ID
    #[arg(short = 'i', long)]
    surveyor_id: i64,

    /// Name shown to the dispatcher
    #[arg(short = 'n', long)]
    surveyor_name: String,

    /// REST API base URL; the WebSocket URL is derived from it
    #[arg(short = 'u', long, default_value = "http://127.0.0.1:8080/api")]
    api_url: String,

    /// Dispatcher to chat with
    #[arg(short = 'd', long, default_value_t = surveylink_chat::config::DEFAULT_DISPATCHER_ID)]
    dispatcher_id: i64,

    /// Reconnect retries before giving up
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &["surveylink_chat"], "info");

    let args = Args::parse();

    let mut config = ChatConfig::new(args.api_url);
    config.dispatcher_id = args.dispatcher_id;
    config.connection.max_reconnect_attempts = args.max_reconnect_attempts;
    let identity = Identity::new(args.surveyor_id, args.surveyor_name);

    if let Err(e) = run_client(config, identity).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
