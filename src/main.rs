//! Campus delivery bot
//!
//! Telegram bot for ordering food from campus cafes against a prepaid
//! balance, with orders routed to delivery channels by place and gender.

mod api;
mod commands;
mod config;
mod db;
mod messages;
mod pricing;
mod routing;
mod runtime;
mod state_machine;
mod telegram;

use config::Config;
use db::Database;
use runtime::{ConversationService, DatabaseLedger, InMemorySessionStore, RuntimeManager};
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use telegram::TelegramTransport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Idle time after which a user's worker task exits
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_delivery_bot=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        admins = config.admin_ids.len(),
        channels = config.channels.len(),
        cafes = config.cafes.len(),
        "Configuration loaded"
    );

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(path = %config.database_path.display(), "Opening database");
    let db = Database::open(&config.database_path)?;

    let ledger = Arc::new(DatabaseLedger::new(db));
    let sessions = Arc::new(InMemorySessionStore::new(config.session_idle_timeout));
    sessions.spawn_sweeper(SESSION_SWEEP_INTERVAL);

    let bot = Bot::new(&config.bot_token);
    let transport = Arc::new(TelegramTransport::new(bot.clone()));

    let service = Arc::new(ConversationService::new(
        config.service_settings(),
        ledger,
        sessions,
        transport,
    ));
    let manager = Arc::new(RuntimeManager::new(Arc::clone(&service), WORKER_IDLE_TIMEOUT));

    // Health endpoint for the hosting platform
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(port).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    telegram::run_polling(bot, manager).await;

    tracing::info!("Waiting for pending order notices");
    service.drain_notifications().await;

    Ok(())
}
