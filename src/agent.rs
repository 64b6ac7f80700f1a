//! Agents: preset system prompt plus sampling defaults.
//!
//! Agent administration lives elsewhere; the gateway only reads.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::core_types::AgentId;
use crate::llm::SamplingParams;

#[derive(Debug, Clone, FromRow)]
pub struct Agent {
    pub agent_id: AgentId,
    pub name: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: i32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Sampling parameters for one upstream call, output capped by the
    /// platform-wide limit.
    pub fn sampling(&self, output_cap: i32) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens.min(output_cap).max(1),
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }
}

pub struct AgentRepository;

impl AgentRepository {
    pub async fn get_active(pool: &PgPool, agent_id: AgentId) -> Result<Option<Agent>, sqlx::Error> {
        sqlx::query_as::<_, Agent>(
            "SELECT agent_id, name, system_prompt, temperature, max_tokens, top_p, \
                    frequency_penalty, presence_penalty, status, created_at \
             FROM agents_tb WHERE agent_id = $1 AND status = 1",
        )
        .bind(agent_id)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_caps_output_tokens() {
        let agent = Agent {
            agent_id: 1,
            name: "writer".into(),
            system_prompt: "write well".into(),
            temperature: 0.8,
            max_tokens: 8192,
            top_p: 0.9,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            status: 1,
            created_at: Utc::now(),
        };
        assert_eq!(agent.sampling(4096).max_tokens, 4096);
        assert_eq!(agent.sampling(16384).max_tokens, 8192);
    }
}
