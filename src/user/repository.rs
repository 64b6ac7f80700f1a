//! Repository layer for user account rows.

use sqlx::PgPool;

use super::models::User;
use crate::core_types::UserId;

const USER_COLUMNS: &str = "user_id, openid, unionid, phone, nickname, avatar_url, level_code, \
                            balance, frozen_balance, status, created_at, updated_at";

/// Resolved platform identity for one login.
#[derive(Debug, Clone)]
pub struct PlatformIdentity {
    pub openid: String,
    pub unionid: Option<String>,
    pub phone: Option<String>,
}

/// User repository for account lookups and login reconciliation.
pub struct UserRepository;

impl UserRepository {
    /// Get user by ID
    pub async fn get_by_id(pool: &PgPool, user_id: UserId) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users_tb WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Resolve a platform login to a user row, creating one when no
    /// identifier matches.
    ///
    /// `unionid` (stable across apps) is authoritative; `openid` is the
    /// per-app fallback, then `phone`. After resolution the row is updated so
    /// all known identifiers converge on the resolved user.
    pub async fn resolve_login(
        pool: &PgPool,
        identity: &PlatformIdentity,
    ) -> Result<User, sqlx::Error> {
        if let Some(user) = Self::find_by_identity(pool, identity).await? {
            return Self::converge_identity(pool, user.user_id, identity).await;
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users_tb (openid, unionid, phone, status) \
             VALUES ($1, $2, $3, 1) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&identity.openid)
        .bind(&identity.unionid)
        .bind(&identity.phone)
        .fetch_one(pool)
        .await?;

        tracing::info!(user_id = user.user_id, "created user from platform login");
        Ok(user)
    }

    async fn find_by_identity(
        pool: &PgPool,
        identity: &PlatformIdentity,
    ) -> Result<Option<User>, sqlx::Error> {
        if let Some(unionid) = &identity.unionid {
            let found = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users_tb WHERE unionid = $1"
            ))
            .bind(unionid)
            .fetch_optional(pool)
            .await?;
            if found.is_some() {
                return Ok(found);
            }
        }

        let found = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users_tb WHERE openid = $1"
        ))
        .bind(&identity.openid)
        .fetch_optional(pool)
        .await?;
        if found.is_some() {
            return Ok(found);
        }

        if let Some(phone) = &identity.phone {
            return sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users_tb WHERE phone = $1"
            ))
            .bind(phone)
            .fetch_optional(pool)
            .await;
        }

        Ok(None)
    }

    /// Update the resolved row so openid/unionid/phone all point at it.
    /// COALESCE keeps existing values when the login did not carry one.
    async fn converge_identity(
        pool: &PgPool,
        user_id: UserId,
        identity: &PlatformIdentity,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users_tb \
             SET openid = $2, \
                 unionid = COALESCE($3, unionid), \
                 phone = COALESCE($4, phone), \
                 updated_at = now() \
             WHERE user_id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&identity.openid)
        .bind(&identity.unionid)
        .bind(&identity.phone)
        .fetch_one(pool)
        .await
    }
}
