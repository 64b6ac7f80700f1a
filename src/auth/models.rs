use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::core_types::UserId;
use crate::user::User;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user_id as string)
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at
}

/// Authenticated principal injected by the middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// Access/refresh pair. Both values rotate together on refresh; the client
/// must replace both atomically in its storage.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Exchange a platform auth code for a token pair.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "071xKwkl2K9Qe84...")]
    #[validate(length(min = 1, max = 128))]
    pub code: String,
}

/// Rotate a token pair. Deliberately does not require a valid access token:
/// the usual caller holds an expired one.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 128))]
    pub refresh_token: String,
}

/// Client-facing user detail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserInfo {
    pub user_id: UserId,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub level_code: Option<String>,
    #[schema(value_type = String, example = "997.4900")]
    pub available_balance: rust_decimal::Decimal,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        UserInfo {
            user_id: user.user_id,
            nickname: user.nickname.clone(),
            avatar_url: user.avatar_url.clone(),
            phone: user.phone.clone(),
            level_code: user.level_code.clone(),
            available_balance: user.available(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserInfo,
}
