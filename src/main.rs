//! Sparkgate - AI Creation Gateway Core
//!
//! Startup order matters: config → logging → database → queue workers →
//! HTTP gateway. Shutdown reverses it: the server drains first, then the
//! queue senders drop so workers finish every in-flight write before exit.

use std::sync::Arc;

use sparkgate::auth::{PlatformClient, TokenSessionService};
use sparkgate::config::AppConfig;
use sparkgate::conversation::ConversationStore;
use sparkgate::db::Database;
use sparkgate::gateway::{self, state::AppState};
use sparkgate::ledger::CreditLedger;
use sparkgate::llm::ModelRegistry;
use sparkgate::logging::init_logging;
use sparkgate::moderation::ModerationGate;
use sparkgate::persist::{PersistQueue, spawn_workers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("SPARKGATE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Arc::new(AppConfig::load(&config_path)?);

    let _log_guard = init_logging(&config.log);
    tracing::info!(config = %config_path, "sparkgate starting");

    if config.database.url.is_empty() {
        anyhow::bail!("database url not configured (set database.url or DATABASE_URL)");
    }

    let db = Database::connect(&config.database.url, config.database.max_connections).await?;
    let pool = db.pool().clone();

    let ledger = CreditLedger::new(pool.clone(), &config.ledger);
    let store = ConversationStore::new(pool.clone());
    let moderation = Arc::new(ModerationGate::new(&config.moderation)?);
    let registry = Arc::new(ModelRegistry::new(&config.models)?);

    let platform = PlatformClient::new(config.platform.clone())?;
    let auth = Arc::new(TokenSessionService::new(
        pool.clone(),
        config.auth.clone(),
        platform,
    ));

    let (queue, receivers) = PersistQueue::new(config.persist.workers, config.persist.queue_cap);
    let workers = spawn_workers(
        store.clone(),
        queue.clone(),
        receivers,
        config.persist.max_attempts,
    );
    tracing::info!(workers = queue.workers(), "persistence workers running");

    let state = Arc::new(AppState::new(
        config.clone(),
        db,
        ledger,
        store,
        queue.clone(),
        moderation,
        registry,
        auth,
    ));

    gateway::run_server(state.clone()).await?;

    // Drop every strong queue handle so the worker channels close, then
    // wait for the workers to drain their partitions.
    drop(state);
    drop(queue);
    for handle in workers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "persist worker join failed");
        }
    }

    tracing::info!("sparkgate stopped");
    Ok(())
}
