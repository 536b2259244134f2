//! # marquee-server
//!
//! HTTP front for the Marquee messaging core.
//!
//! This binary provides:
//! - **REST API** (axum) over conversations, messages and notifications
//! - **Server-sent event streams** that push fresh conversation and message
//!   lists to subscribed clients
//! - **Simulated delivery**: outgoing messages are acknowledged after a
//!   short delay and remote peers occasionally write back

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use marquee_client::{AppState, ChatService, LogNotifier, NotificationService};
use marquee_net::{RandomSource, SeededRandom, SimulatedChannel, ThreadRandom};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marquee_server=debug")),
        )
        .init();

    info!("Starting Marquee server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Build the services
    // -----------------------------------------------------------------------
    let random: Arc<dyn RandomSource> = match config.random_seed {
        Some(seed) => Arc::new(SeededRandom::new(seed)),
        None => Arc::new(ThreadRandom),
    };
    let channel = SimulatedChannel::with_random(config.simulator(), random);
    let chat = ChatService::new(Arc::new(channel));
    let notifications = NotificationService::new(Arc::new(LogNotifier::granted()));
    let state = AppState::new(chat, notifications);

    if config.seed_sample_data {
        let loaded = state.chat.load_sample_data()?;
        info!(conversations = loaded, "Sample data loaded");
    }

    // -----------------------------------------------------------------------
    // 4. Connect and start background activity
    // -----------------------------------------------------------------------
    state.chat.connect(config.local_user.clone());
    let bridge = state.bridge_message_notifications();

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(state.clone(), config.http_addr) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    bridge.unsubscribe();
    state.chat.disconnect();
    result
}
