//! Prompt assembly with cache-friendly sizing.
//!
//! Provider-side cache hits are maximized when the system prompt is stable
//! and small. Under the soft cap the persona rides in the system message;
//! above it the persona moves into the first user turn and later turns rely
//! on conversation history to carry it.

use crate::conversation::{Message, MessageRole};
use crate::llm::{ChatMessage, ProviderKind, SystemPrompt};

/// Assembled upstream prompt: the ordered message sequence plus the cache
/// decision, visible so the provider can serialize accordingly.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: SystemPrompt,
    pub messages: Vec<ChatMessage>,
    /// True when the persona block was folded into the user message.
    pub persona_in_user: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    sys_soft_max: usize,
}

impl PromptBuilder {
    pub fn new(sys_soft_max: usize) -> Self {
        Self { sys_soft_max }
    }

    pub fn build(
        &self,
        agent_prompt: &str,
        persona_block: Option<&str>,
        history: &[Message],
        user_input: &str,
        provider: ProviderKind,
    ) -> AssembledPrompt {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .filter_map(|m| match m.role_enum() {
                MessageRole::User => Some(ChatMessage::user(m.content.clone())),
                MessageRole::Assistant => Some(ChatMessage::assistant(m.content.clone())),
                MessageRole::System => None,
            })
            .collect();

        let full_system = match persona_block {
            Some(block) if !block.is_empty() => format!("{agent_prompt}\n\n{block}"),
            _ => agent_prompt.to_string(),
        };

        let (system_text, persona_in_user) = if char_len(&full_system) <= self.sys_soft_max {
            (full_system, false)
        } else {
            // Trimmed system keeps the agent's instructions, drops persona
            // detail. Only the first turn pays to carry the full block.
            let trimmed = trim_chars(agent_prompt, self.sys_soft_max);
            (trimmed, history.is_empty())
        };

        let user_text = match (persona_in_user, persona_block) {
            (true, Some(block)) => format!("{block}\n\n{user_input}"),
            _ => user_input.to_string(),
        };
        messages.push(ChatMessage::user(user_text));

        AssembledPrompt {
            system: SystemPrompt {
                text: system_text,
                cacheable: provider.supports_cache_hint(),
            },
            messages,
            persona_in_user,
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn trim_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn history_turn(role: MessageRole, content: &str) -> Message {
        Message {
            message_id: 1,
            conversation_id: 1,
            role: role.as_i16(),
            content: content.to_string(),
            tokens: 1,
            sequence: 1,
            embedding_status: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn under_cap_emits_full_block_as_system() {
        let builder = PromptBuilder::new(1500);
        let prompt = builder.build("agent rules", Some("persona"), &[], "hi", ProviderKind::OpenAi);
        assert_eq!(prompt.system.text, "agent rules\n\npersona");
        assert!(!prompt.persona_in_user);
        assert_eq!(prompt.messages.len(), 1);
        assert_eq!(prompt.messages[0].content.as_text(), "hi");
    }

    #[test]
    fn exactly_at_cap_uses_standard_strategy() {
        let agent = "a".repeat(700);
        let persona = "p".repeat(798); // 700 + 2 + 798 = 1500
        let builder = PromptBuilder::new(1500);
        let prompt = builder.build(&agent, Some(&persona), &[], "hi", ProviderKind::OpenAi);
        assert!(!prompt.persona_in_user);
        assert_eq!(prompt.system.text.chars().count(), 1500);
    }

    #[test]
    fn one_over_cap_switches_to_split_strategy() {
        let agent = "a".repeat(700);
        let persona = "p".repeat(799); // 1501 total
        let builder = PromptBuilder::new(1500);
        let prompt = builder.build(&agent, Some(&persona), &[], "hi", ProviderKind::OpenAi);
        assert!(prompt.persona_in_user);
        assert_eq!(prompt.system.text, agent);
        let user = prompt.messages.last().unwrap().content.as_text();
        assert!(user.starts_with(&persona));
        assert!(user.ends_with("hi"));
    }

    #[test]
    fn split_strategy_skips_persona_on_later_turns() {
        let agent = "a".repeat(1600);
        let persona = "p".repeat(100);
        let history = vec![
            history_turn(MessageRole::User, "earlier question"),
            history_turn(MessageRole::Assistant, "earlier answer"),
        ];
        let builder = PromptBuilder::new(1500);
        let prompt = builder.build(&agent, Some(&persona), &history, "next", ProviderKind::OpenAi);
        assert!(!prompt.persona_in_user);
        assert_eq!(prompt.system.text.chars().count(), 1500);
        assert_eq!(prompt.messages.len(), 3);
        assert_eq!(prompt.messages[2].content.as_text(), "next");
    }

    #[test]
    fn history_precedes_new_user_message() {
        let builder = PromptBuilder::new(1500);
        let history = vec![
            history_turn(MessageRole::User, "q1"),
            history_turn(MessageRole::Assistant, "a1"),
        ];
        let prompt = builder.build("sys", None, &history, "q2", ProviderKind::OpenAi);
        let texts: Vec<String> = prompt
            .messages
            .iter()
            .map(|m| m.content.as_text())
            .collect();
        assert_eq!(texts, vec!["q1", "a1", "q2"]);
    }

    #[test]
    fn cache_flag_follows_provider_family() {
        let builder = PromptBuilder::new(1500);
        let cached = builder.build("sys", None, &[], "hi", ProviderKind::Anthropic);
        assert!(cached.system.cacheable);
        let plain = builder.build("sys", None, &[], "hi", ProviderKind::DashScope);
        assert!(!plain.system.cacheable);
    }
}
