use std::sync::Arc;

use crate::auth::TokenSessionService;
use crate::chat::FeeEstimator;
use crate::config::AppConfig;
use crate::conversation::ConversationStore;
use crate::db::Database;
use crate::ledger::CreditLedger;
use crate::llm::ModelRegistry;
use crate::moderation::ModerationGate;
use crate::persist::PersistQueue;
use crate::prompt::PromptBuilder;

/// Gateway application state (shared)
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// PostgreSQL pool wrapper
    pub db: Database,
    /// Credit ledger (freeze / settle / refund)
    pub ledger: CreditLedger,
    /// Conversation store (durable turns + stats)
    pub store: ConversationStore,
    /// Deferred persistence queue
    pub queue: Arc<PersistQueue>,
    /// Moderation gate (pre/post blocklist checks)
    pub moderation: Arc<ModerationGate>,
    /// Upstream model registry
    pub registry: Arc<ModelRegistry>,
    /// Prompt assembly
    pub prompt_builder: PromptBuilder,
    /// Fee estimation + settlement math
    pub estimator: FeeEstimator,
    /// Token session service
    pub auth: Arc<TokenSessionService>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        db: Database,
        ledger: CreditLedger,
        store: ConversationStore,
        queue: Arc<PersistQueue>,
        moderation: Arc<ModerationGate>,
        registry: Arc<ModelRegistry>,
        auth: Arc<TokenSessionService>,
    ) -> Self {
        let prompt_builder = PromptBuilder::new(config.prompt.sys_soft_max);
        let estimator = FeeEstimator::new(config.fee.clone(), &config.moderation);
        Self {
            config,
            db,
            ledger,
            store,
            queue,
            moderation,
            registry,
            prompt_builder,
            estimator,
            auth,
        }
    }
}
