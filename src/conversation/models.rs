use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::core_types::{AgentId, ConversationId, MessageId, ProjectId, SequenceNo, UserId};

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl ConversationStatus {
    pub const ACTIVE: i16 = 1;
    pub const ARCHIVED: i16 = 2;

    pub fn as_i16(self) -> i16 {
        match self {
            ConversationStatus::Active => Self::ACTIVE,
            ConversationStatus::Archived => Self::ARCHIVED,
        }
    }
}

impl From<i16> for ConversationStatus {
    fn from(v: i16) -> Self {
        match v {
            Self::ARCHIVED => ConversationStatus::Archived,
            _ => ConversationStatus::Active,
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub const USER: i16 = 1;
    pub const ASSISTANT: i16 = 2;
    pub const SYSTEM: i16 = 3;

    pub fn as_i16(self) -> i16 {
        match self {
            MessageRole::User => Self::USER,
            MessageRole::Assistant => Self::ASSISTANT,
            MessageRole::System => Self::SYSTEM,
        }
    }
}

impl From<i16> for MessageRole {
    fn from(v: i16) -> Self {
        match v {
            Self::ASSISTANT => MessageRole::Assistant,
            Self::SYSTEM => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

/// Conversation row. `message_count` and `total_tokens` are running
/// statistics kept in lockstep with the messages by the append transaction.
#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub agent_id: Option<AgentId>,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub message_count: i32,
    pub total_tokens: i64,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message row. Append-only; never mutated after write.
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub role: i16,
    pub content: String,
    pub tokens: i32,
    pub sequence: SequenceNo,
    pub embedding_status: i16,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn role_enum(&self) -> MessageRole {
        MessageRole::from(self.role)
    }
}

/// Listing filters for `GET /conversations`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    /// ACTIVE or ARCHIVED; absent means both.
    pub status: Option<ConversationStatus>,
    pub agent_id: Option<AgentId>,
    pub project_id: Option<ProjectId>,
    /// Free-text keyword on title.
    pub keyword: Option<String>,
}

/// List item for `GET /conversations`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub agent_id: Option<AgentId>,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub message_count: i32,
    pub total_tokens: i64,
    pub status: ConversationStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        ConversationSummary {
            conversation_id: c.conversation_id,
            agent_id: c.agent_id,
            project_id: c.project_id,
            title: c.title,
            message_count: c.message_count,
            total_tokens: c.total_tokens,
            status: ConversationStatus::from(c.status),
            updated_at: c.updated_at,
        }
    }
}

/// Message item inside a conversation detail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageView {
    pub message_id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub tokens: i32,
    pub sequence: SequenceNo,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        let role = m.role_enum();
        MessageView {
            message_id: m.message_id,
            role,
            content: m.content,
            tokens: m.tokens,
            sequence: m.sequence,
            created_at: m.created_at,
        }
    }
}

/// `GET /conversations/{id}` payload: header plus messages in turn order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub summary: ConversationSummary,
    pub messages: Vec<MessageView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::from(role.as_i16()), role);
        }
    }

    #[test]
    fn status_defaults_to_active_for_unknown() {
        assert_eq!(ConversationStatus::from(0), ConversationStatus::Active);
        assert_eq!(ConversationStatus::from(2), ConversationStatus::Archived);
    }
}
