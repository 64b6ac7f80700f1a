//! Durable conversation storage: turns plus running statistics, updated with
//! short self-locking UPDATEs instead of SELECT FOR UPDATE.

pub mod handlers;
mod models;
mod store;

pub use models::{
    Conversation, ConversationDetail, ConversationStatus, ConversationSummary, ListFilter,
    Message, MessageRole, MessageView,
};
pub use store::{AppendTurn, ConversationStore};
