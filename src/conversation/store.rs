//! Conversation persistence.
//!
//! Appends run in one short transaction: (optional) conversation INSERT, one
//! two-row message INSERT, one commutative stats UPDATE. The stats UPDATE
//! relies on its own row lock only, so concurrent appends to different
//! conversations never serialize against each other.

use sqlx::{PgPool, QueryBuilder};

use super::models::{
    Conversation, ConversationDetail, ConversationStatus, ConversationSummary, ListFilter,
    Message, MessageRole, MessageView,
};
use crate::core_types::{AgentId, ConversationId, ProjectId, UserId};
use crate::sequence::SequenceGenerator;

const CONVERSATION_COLUMNS: &str = "conversation_id, user_id, agent_id, project_id, title, \
                                    message_count, total_tokens, status, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "message_id, conversation_id, role, content, tokens, sequence, \
                               embedding_status, created_at";

/// Maximum characters of the first user message used as an auto title.
const AUTO_TITLE_CHARS: usize = 30;

/// One persisted turn: the user message and its assistant reply.
#[derive(Debug, Clone)]
pub struct AppendTurn {
    pub conversation_id: Option<ConversationId>,
    pub user_id: UserId,
    pub agent_id: Option<AgentId>,
    pub project_id: Option<ProjectId>,
    pub model_code: String,
    pub user_text: String,
    pub user_tokens: i32,
    pub assistant_text: String,
    pub assistant_tokens: i32,
}

#[derive(Clone)]
pub struct ConversationStore {
    pool: PgPool,
    seq: SequenceGenerator,
}

impl ConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            seq: SequenceGenerator::new(),
        }
    }

    /// Create an empty conversation and return its id.
    pub async fn create(
        &self,
        user_id: UserId,
        agent_id: Option<AgentId>,
        project_id: Option<ProjectId>,
        title: &str,
    ) -> Result<ConversationId, sqlx::Error> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO conversations_tb (user_id, agent_id, project_id, title, status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING conversation_id",
        )
        .bind(user_id)
        .bind(agent_id)
        .bind(project_id)
        .bind(title)
        .bind(ConversationStatus::ACTIVE)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Create a conversation titled from its first user message.
    pub async fn create_from_first_message(
        &self,
        user_id: UserId,
        agent_id: Option<AgentId>,
        project_id: Option<ProjectId>,
        user_text: &str,
    ) -> Result<ConversationId, sqlx::Error> {
        self.create(user_id, agent_id, project_id, &auto_title(user_text))
            .await
    }

    /// Append one turn. Creates the conversation when `conversation_id` is
    /// absent. Returns the (possibly fresh) conversation id.
    pub async fn append_turn(&self, turn: &AppendTurn) -> Result<ConversationId, sqlx::Error> {
        let (seq_user, seq_assistant) = self.seq.next_pair();
        let mut tx = self.pool.begin().await?;

        let conversation_id = match turn.conversation_id {
            Some(id) => id,
            None => {
                let (id,) = sqlx::query_as::<_, (i64,)>(
                    "INSERT INTO conversations_tb (user_id, agent_id, project_id, title, status) \
                     VALUES ($1, $2, $3, $4, $5) \
                     RETURNING conversation_id",
                )
                .bind(turn.user_id)
                .bind(turn.agent_id)
                .bind(turn.project_id)
                .bind(auto_title(&turn.user_text))
                .bind(ConversationStatus::ACTIVE)
                .fetch_one(&mut *tx)
                .await?;
                id
            }
        };

        sqlx::query(
            "INSERT INTO messages_tb (conversation_id, role, content, tokens, sequence) \
             VALUES ($1, $2, $3, $4, $5), ($1, $6, $7, $8, $9)",
        )
        .bind(conversation_id)
        .bind(MessageRole::USER)
        .bind(&turn.user_text)
        .bind(turn.user_tokens)
        .bind(seq_user)
        .bind(MessageRole::ASSISTANT)
        .bind(&turn.assistant_text)
        .bind(turn.assistant_tokens)
        .bind(seq_assistant)
        .execute(&mut *tx)
        .await?;

        // Direct UPDATE, no SELECT FOR UPDATE: the op is commutative across
        // turns and the row lock lives only until commit.
        sqlx::query(
            "UPDATE conversations_tb \
             SET message_count = message_count + 2, total_tokens = total_tokens + $2, \
                 updated_at = now() \
             WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .bind((turn.user_tokens + turn.assistant_tokens) as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(conversation_id)
    }

    /// Conversation header plus messages in sequence order, scoped to owner.
    pub async fn get_detail(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationDetail>, sqlx::Error> {
        let Some(conversation) = self.get_owned(user_id, conversation_id).await? else {
            return Ok(None);
        };

        let messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages_tb \
             WHERE conversation_id = $1 \
             ORDER BY sequence ASC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ConversationDetail {
            summary: ConversationSummary::from(conversation),
            messages: messages.into_iter().map(MessageView::from).collect(),
        }))
    }

    /// Last `limit` messages in turn order, for prompt history.
    pub async fn recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let mut rows = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages_tb \
             WHERE conversation_id = $1 \
             ORDER BY sequence DESC \
             LIMIT $2"
        ))
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Paged listing, `updated_at` descending, with optional filters.
    pub async fn list(
        &self,
        user_id: UserId,
        filter: &ListFilter,
        page_size: i64,
        offset: i64,
    ) -> Result<(Vec<ConversationSummary>, i64), sqlx::Error> {
        let mut query = QueryBuilder::new(format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations_tb WHERE user_id = "
        ));
        query.push_bind(user_id);
        push_filters(&mut query, filter);
        query.push(" ORDER BY updated_at DESC LIMIT ");
        query.push_bind(page_size);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let rows: Vec<Conversation> = query.build_query_as().fetch_all(&self.pool).await?;

        let mut count_query =
            QueryBuilder::new("SELECT COUNT(*) FROM conversations_tb WHERE user_id = ");
        count_query.push_bind(user_id);
        push_filters(&mut count_query, filter);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&self.pool).await?;

        Ok((
            rows.into_iter().map(ConversationSummary::from).collect(),
            total,
        ))
    }

    pub async fn update_title(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        title: &str,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "UPDATE conversations_tb SET title = $3, updated_at = now() \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(title)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn archive(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "UPDATE conversations_tb SET status = $3, updated_at = now() \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(ConversationStatus::ARCHIVED)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Delete a conversation; messages go with it via ON DELETE CASCADE.
    pub async fn delete(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "DELETE FROM conversations_tb WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Ownership-scoped fetch.
    pub async fn get_owned(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations_tb \
             WHERE conversation_id = $1 AND user_id = $2"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

fn push_filters(query: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &ListFilter) {
    if let Some(status) = filter.status {
        query.push(" AND status = ");
        query.push_bind(status.as_i16());
    }
    if let Some(agent_id) = filter.agent_id {
        query.push(" AND agent_id = ");
        query.push_bind(agent_id);
    }
    if let Some(project_id) = filter.project_id {
        query.push(" AND project_id = ");
        query.push_bind(project_id);
    }
    if let Some(keyword) = &filter.keyword {
        if !keyword.is_empty() {
            query.push(" AND title ILIKE ");
            query.push_bind(format!("%{}%", keyword));
        }
    }
}

fn auto_title(user_text: &str) -> String {
    let trimmed = user_text.trim();
    if trimmed.chars().count() <= AUTO_TITLE_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(AUTO_TITLE_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_title_truncates_at_char_boundary() {
        assert_eq!(auto_title("  hello  "), "hello");
        let long = "火".repeat(40);
        let title = auto_title(&long);
        assert_eq!(title.chars().count(), AUTO_TITLE_CHARS);
    }
}
