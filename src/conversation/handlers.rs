//! Conversation endpoints: list, detail, rename, archive, delete.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::models::{ConversationDetail, ConversationSummary, ListFilter};
use crate::auth::AuthUser;
use crate::core_types::ConversationId;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, ApiResult, PageQuery, ok};

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationPage {
    pub items: Vec<ConversationSummary>,
    pub total: i64,
    pub page_num: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateTitleRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
}

/// Paginated conversation list
#[utoipa::path(
    get,
    path = "/api/v1/client/conversations",
    params(PageQuery, ListFilter),
    responses(
        (status = 200, description = "Page of conversations", body = ConversationPage)
    ),
    security(("bearer_auth" = [])),
    tag = "Conversations"
)]
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<ConversationPage> {
    let (page_num, page_size, offset) = page.normalized();
    match state
        .store
        .list(auth.user_id, &filter, page_size, offset)
        .await
    {
        Ok((items, total)) => ok(ConversationPage {
            items,
            total,
            page_num,
            page_size,
        }),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}

/// Conversation detail with messages in turn order
#[utoipa::path(
    get,
    path = "/api/v1/client/conversations/{id}",
    params(("id" = i64, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Conversation with messages", body = ConversationDetail),
        (status = 404, description = "Not found or not owned")
    ),
    security(("bearer_auth" = [])),
    tag = "Conversations"
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ConversationId>,
) -> ApiResult<ConversationDetail> {
    match state.store.get_detail(auth.user_id, id).await {
        Ok(Some(detail)) => ok(detail),
        Ok(None) => ApiError::not_found("Conversation not found").into_err(),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}

/// Rename a conversation
#[utoipa::path(
    put,
    path = "/api/v1/client/conversations/{id}/title",
    params(("id" = i64, Path, description = "Conversation ID")),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Renamed"),
        (status = 404, description = "Not found or not owned")
    ),
    security(("bearer_auth" = [])),
    tag = "Conversations"
)]
pub async fn update_title(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ConversationId>,
    Json(req): Json<UpdateTitleRequest>,
) -> ApiResult<()> {
    if let Err(e) = req.validate() {
        return ApiError::bad_request(e.to_string()).into_err();
    }
    match state.store.update_title(auth.user_id, id, &req.title).await {
        Ok(true) => ok(()),
        Ok(false) => ApiError::not_found("Conversation not found").into_err(),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}

/// Archive a conversation
#[utoipa::path(
    post,
    path = "/api/v1/client/conversations/{id}/archive",
    params(("id" = i64, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Archived"),
        (status = 404, description = "Not found or not owned")
    ),
    security(("bearer_auth" = [])),
    tag = "Conversations"
)]
pub async fn archive_conversation(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ConversationId>,
) -> ApiResult<()> {
    match state.store.archive(auth.user_id, id).await {
        Ok(true) => ok(()),
        Ok(false) => ApiError::not_found("Conversation not found").into_err(),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}

/// Delete a conversation and its messages
#[utoipa::path(
    delete,
    path = "/api/v1/client/conversations/{id}",
    params(("id" = i64, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Deleted with cascaded messages"),
        (status = 404, description = "Not found or not owned")
    ),
    security(("bearer_auth" = [])),
    tag = "Conversations"
)]
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ConversationId>,
) -> ApiResult<()> {
    match state.store.delete(auth.user_id, id).await {
        Ok(true) => ok(()),
        Ok(false) => ApiError::not_found("Conversation not found").into_err(),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}
