use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core_types::{ConversationId, FreezeId, UserId};

/// Freeze-log lifecycle. Created FROZEN, reaches exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FreezeStatus {
    Frozen,
    Settled,
    Refunded,
    Unknown,
}

impl FreezeStatus {
    pub const FROZEN: i16 = 1;
    pub const SETTLED: i16 = 2;
    pub const REFUNDED: i16 = 3;

    pub fn as_i16(self) -> i16 {
        match self {
            FreezeStatus::Frozen => Self::FROZEN,
            FreezeStatus::Settled => Self::SETTLED,
            FreezeStatus::Refunded => Self::REFUNDED,
            FreezeStatus::Unknown => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FreezeStatus::Frozen => "FROZEN",
            FreezeStatus::Settled => "SETTLED",
            FreezeStatus::Refunded => "REFUNDED",
            FreezeStatus::Unknown => "UNKNOWN",
        }
    }
}

impl From<i16> for FreezeStatus {
    fn from(v: i16) -> Self {
        match v {
            Self::FROZEN => FreezeStatus::Frozen,
            Self::SETTLED => FreezeStatus::Settled,
            Self::REFUNDED => FreezeStatus::Refunded,
            _ => FreezeStatus::Unknown,
        }
    }
}

/// One freeze-log row. `request_id` is globally unique: one row per
/// (user, chat turn), which is what makes every ledger op idempotent.
#[derive(Debug, Clone, FromRow)]
pub struct FreezeLog {
    pub freeze_id: FreezeId,
    pub request_id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    pub settled_amount: Option<Decimal>,
    pub model_code: String,
    pub conversation_id: Option<ConversationId>,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FreezeLog {
    pub fn status_enum(&self) -> FreezeStatus {
        FreezeStatus::from(self.status)
    }
}

/// Result of a freeze attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeOutcome {
    Frozen { freeze_id: FreezeId },
    /// Replay of an already-processed request id: no ledger effect.
    AlreadyFrozen { freeze_id: FreezeId },
    InsufficientBalance,
}

/// Result of a settle attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled {
        /// Portion of the freeze returned to available balance.
        refund_amount: Decimal,
    },
    /// The log already reached a terminal state; nothing changed.
    AlreadyFinal { status: FreezeStatus },
}

/// Result of a refund attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { amount: Decimal },
    AlreadyFinal { status: FreezeStatus },
}

/// Ledger history entry for `/coin/transactions`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    pub request_id: Uuid,
    #[schema(value_type = String, example = "2.5100")]
    pub amount: Decimal,
    #[schema(value_type = String, example = "2.1000")]
    pub settled_amount: Option<Decimal>,
    pub model_code: String,
    pub conversation_id: Option<ConversationId>,
    #[schema(example = "SETTLED")]
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

impl From<FreezeLog> for TransactionView {
    fn from(log: FreezeLog) -> Self {
        let status = log.status_enum().label();
        TransactionView {
            request_id: log.request_id,
            amount: log.amount,
            settled_amount: log.settled_amount,
            model_code: log.model_code,
            conversation_id: log.conversation_id,
            status,
            created_at: log.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            FreezeStatus::Frozen,
            FreezeStatus::Settled,
            FreezeStatus::Refunded,
        ] {
            assert_eq!(FreezeStatus::from(status.as_i16()), status);
        }
        assert_eq!(FreezeStatus::from(0), FreezeStatus::Unknown);
    }
}
