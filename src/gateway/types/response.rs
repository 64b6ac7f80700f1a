//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiResult<T>`: Type alias for handler return types
//! - `ApiError`: Unified error type with IntoResponse
//! - `error_codes`: Standard error code constants

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All non-streaming responses follow this structure:
/// - code: 200 = success, anything else = error code
/// - data: actual data (success) or null (error)
/// - msg: short message description
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 200 for success
    #[schema(example = 200)]
    pub code: i32,
    /// Response data (null on error)
    pub data: Option<T>,
    /// Response message
    #[schema(example = "success")]
    pub msg: String,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            data: Some(data),
            msg: "success".to_string(),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            data: None,
            msg: msg.into(),
        }
    }
}

// ============================================================================
// ApiResult: DRY Type Alias for Handlers
// ============================================================================

/// Type alias for handler return types - reduces boilerplate
pub type ApiResult<T> =
    Result<(StatusCode, Json<ApiResponse<T>>), (StatusCode, Json<ApiResponse<()>>)>;

/// Helper to create success response (200 OK)
#[inline]
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

// ============================================================================
// ApiError: Unified Error Type
// ============================================================================

/// Unified API error type with automatic IntoResponse
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub message: String,
}

impl ApiError {
    /// Create a new ApiError
    pub fn new(status: StatusCode, code: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400 Bad Request with INVALID_PARAMETER code
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    /// 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg)
    }

    /// 401 Unauthorized with AUTH_FAILED code
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED, msg)
    }

    /// 401 with the dedicated expired-token code so clients know to refresh
    pub fn token_expired() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            error_codes::TOKEN_EXPIRED,
            "Access token expired",
        )
    }

    /// 402-style business error: not enough available credits
    pub fn insufficient_balance() -> Self {
        Self::new(
            StatusCode::OK,
            error_codes::INSUFFICIENT_BALANCE,
            "Insufficient balance",
        )
    }

    /// 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    /// 503 Service Unavailable (queue full, lock-wait exhausted, etc.)
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    /// Database error (500)
    pub fn db_error(msg: impl Into<String>) -> Self {
        Self::internal(format!("Database error: {}", msg.into()))
    }

    /// Convert to handler error tuple
    pub fn into_err<T>(self) -> ApiResult<T> {
        Err((
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.message)),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ApiResponse::<()>::error(self.code, self.message));
        (self.status, body).into_response()
    }
}

/// Enable ? operator for ApiError in handler functions
impl From<ApiError> for (StatusCode, Json<ApiResponse<()>>) {
    fn from(err: ApiError) -> Self {
        (
            err.status,
            Json(ApiResponse::<()>::error(err.code, err.message)),
        )
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
///
/// The numeric values are a stable client contract; the string forms in
/// `sse_codes` are the same contract for `/chat` error frames.
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 200;

    // Client errors (4xx-aligned)
    pub const INVALID_PARAMETER: i32 = 400;
    pub const MISSING_AUTH: i32 = 401;
    pub const AUTH_FAILED: i32 = 402;
    pub const TOKEN_EXPIRED: i32 = 403;
    pub const NOT_FOUND: i32 = 404;
    pub const REFRESH_REJECTED: i32 = 405;

    // Business-rule errors (1xxx)
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const CONTENT_VIOLATION_PRE: i32 = 1003;
    pub const CONTENT_VIOLATION_POST: i32 = 1004;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const UPSTREAM_ERROR: i32 = 5002;
    pub const TRANSIENT: i32 = 5003;
}

/// Stable string codes carried in `{error: ...}` SSE frames.
pub mod sse_codes {
    pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";
    pub const CONTENT_VIOLATION_PRE: &str = "content_violation_pre";
    pub const CONTENT_VIOLATION_POST: &str = "content_violation_post";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const ALREADY_PROCESSING: &str = "already_processing";
    pub const NOT_FOUND: &str = "not_found";
    pub const TRANSIENT: &str = "transient_error";
    pub const INTERNAL: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let resp = ApiResponse::success(42u32);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 200);
        assert_eq!(json["data"], 42);
        assert_eq!(json["msg"], "success");
    }

    #[test]
    fn error_envelope_keeps_null_data() {
        let resp = ApiResponse::<()>::error(error_codes::INSUFFICIENT_BALANCE, "Insufficient");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 1002);
        assert!(json["data"].is_null());
    }
}
