use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::core_types::UserId;

/// User account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserStatus {
    Active,
    Disabled,
    Unknown,
}

impl From<i16> for UserStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => UserStatus::Active,
            2 => UserStatus::Disabled,
            _ => UserStatus::Unknown,
        }
    }
}

/// User account row.
///
/// `balance` is the total credits ever granted minus everything settled;
/// `frozen_balance` is the reserved portion. Available = balance - frozen.
/// The row-level invariant `balance >= frozen_balance >= 0` is enforced by
/// the conditional UPDATEs in the ledger and by a table CHECK.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: UserId,
    pub openid: Option<String>,
    pub unionid: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub level_code: Option<String>,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn available(&self) -> Decimal {
        self.balance - self.frozen_balance
    }
}

/// Read-only balance snapshot for `/coin/balance`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceSnapshot {
    #[schema(value_type = String, example = "1000.0000")]
    pub balance: Decimal,
    #[schema(value_type = String, example = "2.5100")]
    pub frozen: Decimal,
    #[schema(value_type = String, example = "997.4900")]
    pub available: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(balance: Decimal, frozen: Decimal) -> User {
        User {
            user_id: 1,
            openid: None,
            unionid: None,
            phone: None,
            nickname: None,
            avatar_url: None,
            level_code: None,
            balance,
            frozen_balance: frozen,
            status: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_is_balance_minus_frozen() {
        let u = user_with(Decimal::new(10_0000, 4), Decimal::new(2_5100, 4));
        assert_eq!(u.available(), Decimal::new(7_4900, 4));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(UserStatus::from(1), UserStatus::Active);
        assert_eq!(UserStatus::from(2), UserStatus::Disabled);
        assert_eq!(UserStatus::from(99), UserStatus::Unknown);
    }
}
