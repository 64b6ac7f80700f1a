//! HTTP gateway: routing, auth middleware wiring, server lifecycle.

pub mod openapi;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use serde::Serialize;
use tokio::net::TcpListener;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::middleware::jwt_auth_middleware;
use crate::gateway::types::{ApiError, ApiResult, ok};
use state::AppState;

/// Gateway health snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    /// Persistence jobs currently queued.
    pub persist_queue_depth: i64,
}

/// Health check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let database = match state.db.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            return ApiError::service_unavailable("Database unreachable").into_err();
        }
    };
    ok(HealthResponse {
        status: "ok",
        database,
        persist_queue_depth: state.queue.depth(),
    })
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Public: login and refresh must not require a valid access token.
    let auth_routes = Router::new()
        .route("/login", post(crate::auth::handlers::login))
        .route("/refresh", post(crate::auth::handlers::refresh));

    // Everything else under /client is behind the JWT middleware.
    let protected_routes = Router::new()
        .route("/auth/user", get(crate::auth::handlers::get_user))
        .route("/chat", post(crate::chat::handlers::chat_stream))
        .route(
            "/conversations",
            get(crate::conversation::handlers::list_conversations),
        )
        .route(
            "/conversations/{id}",
            get(crate::conversation::handlers::get_conversation)
                .delete(crate::conversation::handlers::delete_conversation),
        )
        .route(
            "/conversations/{id}/title",
            put(crate::conversation::handlers::update_title),
        )
        .route(
            "/conversations/{id}/archive",
            post(crate::conversation::handlers::archive_conversation),
        )
        .route("/coin/balance", get(crate::ledger::handlers::get_balance))
        .route(
            "/coin/transactions",
            get(crate::ledger::handlers::list_transactions),
        )
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .route("/api/v1/health", get(health_check))
        .nest("/api/v1/client/auth", auth_routes)
        .nest("/api/v1/client", protected_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start the HTTP gateway. Returns once the shutdown signal fires and
/// in-flight connections drain.
pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("gateway listening on http://{}", addr);
    tracing::info!("api docs at http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
