//! OpenAPI / Swagger UI documentation.
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Bearer access-token security scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sparkgate AI Creation Gateway API",
        version = "1.0.0",
        description = "Client API for the AI creation gateway: streaming chat, \
                       conversations, compute credits, token session.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::health_check,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh,
        crate::auth::handlers::get_user,
        crate::chat::handlers::chat_stream,
        crate::conversation::handlers::list_conversations,
        crate::conversation::handlers::get_conversation,
        crate::conversation::handlers::update_title,
        crate::conversation::handlers::archive_conversation,
        crate::conversation::handlers::delete_conversation,
        crate::ledger::handlers::get_balance,
        crate::ledger::handlers::list_transactions,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Auth", description = "Token session"),
        (name = "Chat", description = "Streaming chat"),
        (name = "Conversations", description = "Conversation management"),
        (name = "Credits", description = "Compute-credit ledger"),
    )
)]
pub struct ApiDoc;
