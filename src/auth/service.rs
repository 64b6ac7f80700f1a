//! Token issuance, rotation, and verification.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use sqlx::PgPool;
use thiserror::Error;

use super::models::{AuthUser, Claims, LoginResponse, TokenPair, UserInfo};
use super::platform::{PlatformClient, PlatformError};
use crate::config::AuthConfig;
use crate::core_types::UserId;
use crate::user::{PlatformIdentity, User, UserRepository};

const STATUS_ACTIVE: i16 = 1;
const STATUS_ROTATED: i16 = 2;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Invalid or malformed token")]
    Unauthorized,

    #[error("Access token expired")]
    Expired,

    #[error("Refresh token rejected")]
    RefreshRejected,

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("User not found")]
    UserNotFound,
}

pub struct TokenSessionService {
    pool: PgPool,
    cfg: AuthConfig,
    platform: PlatformClient,
}

impl TokenSessionService {
    pub fn new(pool: PgPool, cfg: AuthConfig, platform: PlatformClient) -> Self {
        Self {
            pool,
            cfg,
            platform,
        }
    }

    /// Exchange a platform auth code, reconcile the user record, and issue
    /// a fresh token pair.
    pub async fn login(&self, code: &str) -> Result<LoginResponse, AuthError> {
        let session = self.platform.code_to_session(code).await?;
        let user = UserRepository::resolve_login(
            &self.pool,
            &PlatformIdentity {
                openid: session.openid,
                unionid: session.unionid,
                phone: None,
            },
        )
        .await?;

        let tokens = self.issue_pair(user.user_id).await?;
        tracing::info!(user_id = user.user_id, "platform login succeeded");
        Ok(LoginResponse {
            tokens,
            user: UserInfo::from(&user),
        })
    }

    /// Rotate a token pair. The old refresh token is revoked in the same
    /// transaction that records the new one; a second use of a rotated
    /// token finds `rows_affected == 0` and is rejected.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let new_refresh = random_token();
        let expires_at = Utc::now() + Duration::seconds(self.cfg.refresh_ttl_seconds);

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (i64,)>(
            "UPDATE refresh_tokens_tb \
             SET status = $3, replaced_by = $2 \
             WHERE token = $1 AND status = $4 AND expires_at > now() \
             RETURNING user_id",
        )
        .bind(refresh_token)
        .bind(&new_refresh)
        .bind(STATUS_ROTATED)
        .bind(STATUS_ACTIVE)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = row else {
            tx.rollback().await?;
            tracing::warn!("refresh token reuse or unknown token rejected");
            return Err(AuthError::RefreshRejected);
        };

        sqlx::query(
            "INSERT INTO refresh_tokens_tb (token, user_id, status, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&new_refresh)
        .bind(user_id)
        .bind(STATUS_ACTIVE)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TokenPair {
            access_token: self.encode_access(user_id)?,
            refresh_token: new_refresh,
            expires_in: self.cfg.access_ttl_seconds,
        })
    }

    /// Cryptographic verification of an access token.
    pub fn authenticate(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(
            access_token,
            &DecodingKey::from_secret(self.cfg.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Unauthorized,
        })?;

        let user_id: UserId = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::Unauthorized)?;
        Ok(AuthUser { user_id })
    }

    /// Current user detail for `GET /auth/user`.
    pub async fn current_user(&self, user_id: UserId) -> Result<UserInfo, AuthError> {
        let user: User = UserRepository::get_by_id(&self.pool, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(UserInfo::from(&user))
    }

    async fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, AuthError> {
        let refresh_token = random_token();
        let expires_at = Utc::now() + Duration::seconds(self.cfg.refresh_ttl_seconds);

        sqlx::query(
            "INSERT INTO refresh_tokens_tb (token, user_id, status, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&refresh_token)
        .bind(user_id)
        .bind(STATUS_ACTIVE)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(TokenPair {
            access_token: self.encode_access(user_id)?,
            refresh_token,
            expires_in: self.cfg.access_ttl_seconds,
        })
    }

    fn encode_access(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::seconds(self.cfg.access_ttl_seconds)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.cfg.jwt_secret.as_bytes()),
        )?)
    }
}

/// 32 random bytes, hex-encoded: the opaque refresh token.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Read `exp` from a JWT payload without verifying the signature. This is
/// the client-style read path; server-side checks stay cryptographic.
pub fn decode_exp_unverified(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("exp")?.as_i64()
}

/// Expiry detection with a grace buffer: a token within `grace_seconds` of
/// `exp` is already treated as expired so callers refresh early. Tokens
/// without a readable `exp` are expired.
pub fn is_expired(token: &str, grace_seconds: i64, now: DateTime<Utc>) -> bool {
    match decode_exp_unverified(token) {
        Some(exp) => exp <= now.timestamp() + grace_seconds,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_exp(exp: i64) -> String {
        let claims = Claims {
            sub: "7".to_string(),
            exp: exp as usize,
            iat: (exp - 7200) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    #[test]
    fn expired_exactly_at_exp() {
        let now = Utc::now();
        let token = token_with_exp(now.timestamp());
        assert!(is_expired(&token, 0, now));
    }

    #[test]
    fn expired_inside_grace_window() {
        let now = Utc::now();
        let token = token_with_exp(now.timestamp() + 299);
        assert!(is_expired(&token, 300, now));
    }

    #[test]
    fn valid_just_outside_grace_window() {
        let now = Utc::now();
        // exp - grace - 1 relative to now: still valid.
        let token = token_with_exp(now.timestamp() + 301);
        assert!(!is_expired(&token, 300, now));
    }

    #[test]
    fn garbage_token_reads_as_expired() {
        assert!(is_expired("not-a-jwt", 300, Utc::now()));
        assert!(is_expired("", 300, Utc::now()));
    }

    #[test]
    fn unverified_decode_reads_exp() {
        let token = token_with_exp(1_900_000_000);
        assert_eq!(decode_exp_unverified(&token), Some(1_900_000_000));
    }

    #[test]
    fn random_tokens_are_distinct_64_hex_chars() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
