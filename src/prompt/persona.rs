//! Persona (project) bundle: read path and deterministic block rendering.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::core_types::{ProjectId, UserId};

/// User-owned persona bundle injected into prompts.
#[derive(Debug, Clone, FromRow)]
pub struct PersonaProfile {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub industry: Option<String>,
    pub tone: Option<String>,
    pub catchphrase: Option<String>,
    pub target_audience: Option<String>,
    pub content_style: Option<String>,
    pub introduction: Option<String>,
    pub keywords: Vec<String>,
    pub taboos: Vec<String>,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ProjectRepository;

impl ProjectRepository {
    /// Ownership-scoped fetch: an active project reference must resolve to
    /// a persona the user owns.
    pub async fn get_owned(
        pool: &PgPool,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<Option<PersonaProfile>, sqlx::Error> {
        sqlx::query_as::<_, PersonaProfile>(
            "SELECT project_id, user_id, name, industry, tone, catchphrase, target_audience, \
                    content_style, introduction, keywords, taboos, status, created_at, updated_at \
             FROM projects_tb \
             WHERE project_id = $1 AND user_id = $2 AND status = 1",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}

/// Render the persona paragraph. Deterministic: same bundle, same text.
/// Empty fields are omitted entirely, never rendered as blank lines.
pub fn render_persona_block(persona: &PersonaProfile) -> String {
    let mut lines = Vec::new();
    lines.push(format!("You are now {}.", persona.name));

    if let Some(intro) = non_empty(&persona.introduction) {
        lines.push(intro.to_string());
    }
    if let Some(tone) = non_empty(&persona.tone) {
        lines.push(format!("Tone of voice: {tone}"));
    }
    if let Some(catchphrase) = non_empty(&persona.catchphrase) {
        lines.push(format!("Signature catchphrase: {catchphrase}"));
    }
    if let Some(audience) = non_empty(&persona.target_audience) {
        lines.push(format!("Target audience: {audience}"));
    }
    if let Some(style) = non_empty(&persona.content_style) {
        lines.push(format!("Content style: {style}"));
    }
    if !persona.keywords.is_empty() {
        lines.push(format!("Preferred keywords: {}", persona.keywords.join(", ")));
    }
    if !persona.taboos.is_empty() {
        lines.push(format!("Topics to avoid: {}", persona.taboos.join(", ")));
    }

    lines.join("\n")
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) fn test_persona() -> PersonaProfile {
    PersonaProfile {
        project_id: 1,
        user_id: 1,
        name: "Chef Lin".into(),
        industry: Some("food".into()),
        tone: Some("warm and direct".into()),
        catchphrase: Some("let the wok speak".into()),
        target_audience: Some("home cooks".into()),
        content_style: Some("short videos".into()),
        introduction: Some("A Sichuan chef with twenty years behind the stove.".into()),
        keywords: vec!["sichuan".into(), "wok".into()],
        taboos: vec!["politics".into()],
        status: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bundle_renders_every_line_in_order() {
        let block = render_persona_block(&test_persona());
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "You are now Chef Lin.");
        assert_eq!(lines[1], "A Sichuan chef with twenty years behind the stove.");
        assert!(lines[2].starts_with("Tone of voice:"));
        assert!(block.contains("Preferred keywords: sichuan, wok"));
        assert!(block.contains("Topics to avoid: politics"));
    }

    #[test]
    fn empty_fields_are_omitted_not_blank() {
        let mut persona = test_persona();
        persona.tone = Some("   ".into());
        persona.catchphrase = None;
        persona.keywords.clear();
        let block = render_persona_block(&persona);
        assert!(!block.contains("Tone of voice"));
        assert!(!block.contains("catchphrase"));
        assert!(!block.contains("keywords"));
        assert!(!block.contains("\n\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let persona = test_persona();
        assert_eq!(render_persona_block(&persona), render_persona_block(&persona));
    }
}
