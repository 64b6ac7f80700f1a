//! Sparkgate - AI Creation Gateway Core
//!
//! Mediates between mini-program clients and upstream LLM providers: every
//! turn is admitted against a compute-credit ledger, assembled into a
//! persona-aware prompt, streamed back as SSE frames, persisted off the hot
//! path, and settled exactly once.
//!
//! # Modules
//!
//! - [`core_types`] - Core ID aliases
//! - [`config`] - Configuration snapshot (YAML + env overrides)
//! - [`db`] - PostgreSQL pool wrapper
//! - [`user`] - User accounts and login reconciliation
//! - [`ledger`] - Credit ledger: freeze / settle / refund
//! - [`sequence`] - Collision-resistant message ordinals
//! - [`conversation`] - Durable turns + running statistics
//! - [`persist`] - Deferred persistence queue and workers
//! - [`agent`] - Preset system prompts with sampling defaults
//! - [`prompt`] - Persona injection under cache budgets
//! - [`moderation`] - Blocklist pre/post checks
//! - [`llm`] - Uniform streaming interface over provider families
//! - [`chat`] - Per-request orchestrator and SSE frames
//! - [`auth`] - Token session: issue, rotate, verify
//! - [`gateway`] - HTTP surface and server lifecycle

// Core types - must be first!
pub mod core_types;

// Ambient stack
pub mod config;
pub mod db;
pub mod logging;

// Domain components
pub mod agent;
pub mod auth;
pub mod chat;
pub mod conversation;
pub mod ledger;
pub mod llm;
pub mod moderation;
pub mod persist;
pub mod prompt;
pub mod sequence;
pub mod user;

// HTTP surface
pub mod gateway;

// Convenient re-exports at crate root
pub use chat::{ChatFrame, ChatTurnRequest, FeeEstimator};
pub use config::AppConfig;
pub use conversation::ConversationStore;
pub use ledger::{CreditLedger, FreezeOutcome, FreezeStatus, RefundOutcome, SettleOutcome};
pub use llm::{ModelRegistry, ProviderKind, StreamEvent};
pub use moderation::ModerationGate;
pub use persist::{EnqueueResult, PersistQueue};
pub use prompt::PromptBuilder;
pub use sequence::SequenceGenerator;
