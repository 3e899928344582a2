//! session-link entry point.
//!
//! Speaks JSON lines with the host on stdin/stdout and keeps the server
//! channel over WebSocket. Logs go to stderr.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use session_link::bridge::stdio::{StdioBridge, spawn_reader};
use session_link::bridge::{Bridge, UiIntent};
use session_link::channel::EnvEndpoint;
use session_link::config::{SERVER_URL_KEY, TransportConfig};
use session_link::domain::Credential;
use session_link::session::Session;
use session_link::ws::WsConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = TransportConfig::from_env()?;

    // Initialize tracing; stdout belongs to the host protocol
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    tracing::info!(url = %config.server_url, "starting session-link");

    // Host bridge and intent queue
    let bridge = Arc::new(StdioBridge::stdout());
    let (intents_tx, intents_rx) = mpsc::channel::<UiIntent>(config.intent_queue_capacity);
    let reader = spawn_reader(
        BufReader::new(tokio::io::stdin()),
        Arc::clone(&bridge),
        intents_tx,
    );

    // Session over WebSocket
    let session = Session::new(
        &config,
        WsConnector,
        Arc::new(EnvEndpoint::new(SERVER_URL_KEY, config.server_url.clone())),
        Arc::clone(&bridge) as Arc<dyn Bridge>,
    );
    if let Some(token) = &config.auth_token {
        session.manager().connect(Credential::new(token.as_str())).await;
    }

    session.run(intents_rx).await;
    reader.abort();
    tracing::info!("session-link stopped");

    Ok(())
}
