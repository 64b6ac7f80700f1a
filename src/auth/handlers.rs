//! Auth endpoints: login, refresh, current user.

use std::sync::Arc;

use axum::{Extension, Json, extract::State};
use validator::Validate;

use super::models::{AuthUser, LoginRequest, LoginResponse, RefreshRequest, TokenPair, UserInfo};
use super::service::AuthError;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, ApiResult, ok};

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Platform(e) => {
                tracing::warn!(error = %e, "identity provider rejected login");
                ApiError::unauthorized("Platform login failed")
            }
            AuthError::RefreshRejected => ApiError::new(
                axum::http::StatusCode::UNAUTHORIZED,
                crate::gateway::types::error_codes::REFRESH_REJECTED,
                "Refresh token rejected",
            ),
            AuthError::Expired => ApiError::token_expired(),
            AuthError::Unauthorized => ApiError::unauthorized("Invalid token"),
            AuthError::UserNotFound => ApiError::not_found("User not found"),
            AuthError::Database(e) => ApiError::db_error(e.to_string()),
            AuthError::Encoding(e) => ApiError::internal(e.to_string()),
        }
    }
}

/// Exchange platform auth code for token pair and user info
#[utoipa::path(
    post,
    path = "/api/v1/client/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair and user info", body = LoginResponse),
        (status = 401, description = "Platform rejected the code")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    if let Err(e) = req.validate() {
        return ApiError::bad_request(e.to_string()).into_err();
    }
    match state.auth.login(&req.code).await {
        Ok(resp) => ok(resp),
        Err(e) => ApiError::from(e).into_err(),
    }
}

/// Rotate the token pair
///
/// Requires only the refresh token in the body; the access token is
/// typically already expired when this is called.
#[utoipa::path(
    post,
    path = "/api/v1/client/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh token pair", body = TokenPair),
        (status = 401, description = "Refresh token rejected (reused, revoked or expired)")
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<TokenPair> {
    if let Err(e) = req.validate() {
        return ApiError::bad_request(e.to_string()).into_err();
    }
    match state.auth.refresh(&req.refresh_token).await {
        Ok(pair) => ok(pair),
        Err(e) => ApiError::from(e).into_err(),
    }
}

/// Current user detail
#[utoipa::path(
    get,
    path = "/api/v1/client/auth/user",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<UserInfo> {
    match state.auth.current_user(auth.user_id).await {
        Ok(user) => ok(user),
        Err(e) => ApiError::from(e).into_err(),
    }
}
