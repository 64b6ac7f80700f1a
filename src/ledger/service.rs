//! Ledger operations as single conditional UPDATEs.
//!
//! The freeze predicate `balance - frozen_balance >= amount` replaces a
//! read-modify-write pair; settle and refund are keyed by the freeze log's
//! `status = FROZEN` predicate so a concurrent duplicate observes
//! `rows_affected == 0` and gets the idempotent answer.

use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::LedgerError;
use super::models::{
    FreezeLog, FreezeOutcome, FreezeStatus, RefundOutcome, SettleOutcome, TransactionView,
};
use crate::config::LedgerConfig;
use crate::core_types::{ConversationId, UserId};
use crate::user::BalanceSnapshot;

const FREEZE_COLUMNS: &str = "freeze_id, request_id, user_id, amount, settled_amount, \
                              model_code, conversation_id, status, created_at, updated_at";

#[derive(Clone)]
pub struct CreditLedger {
    pool: PgPool,
    retry_max: u32,
    retry_base: Duration,
    page_size: i64,
}

impl CreditLedger {
    pub fn new(pool: PgPool, cfg: &LedgerConfig) -> Self {
        Self {
            pool,
            retry_max: cfg.freeze_retry_max.max(1),
            retry_base: Duration::from_millis(cfg.freeze_retry_base_ms),
            page_size: cfg.history_page_size,
        }
    }

    /// Reserve `amount` credits for `request_id`.
    ///
    /// The balance UPDATE runs before the freeze-log INSERT so the user-row
    /// lock is held only for the short UPDATE, not across the INSERT. A
    /// unique violation on `request_id` means a replay: the UPDATE is rolled
    /// back and the existing log id is returned.
    pub async fn freeze(
        &self,
        user_id: UserId,
        amount: Decimal,
        request_id: Uuid,
        model_code: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<FreezeOutcome, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .freeze_once(user_id, amount, request_id, model_code, conversation_id)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_retryable(&e) && attempt < self.retry_max => {
                    tracing::warn!(
                        %request_id,
                        attempt,
                        error = %e,
                        "freeze hit lock contention, backing off"
                    );
                    tokio::time::sleep(self.retry_base * attempt).await;
                }
                Err(e) if is_retryable(&e) => {
                    return Err(LedgerError::LockWaitExhausted { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn freeze_once(
        &self,
        user_id: UserId,
        amount: Decimal,
        request_id: Uuid,
        model_code: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<FreezeOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE users_tb \
             SET frozen_balance = frozen_balance + $1, updated_at = now() \
             WHERE user_id = $2 AND balance - frozen_balance >= $1",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            // A replay finds its own frozen amount already reserved, so the
            // predicate can fail even on a healthy balance. Check the log.
            if let Some(log) = self.get_by_request_id(request_id).await? {
                return Ok(FreezeOutcome::AlreadyFrozen {
                    freeze_id: log.freeze_id,
                });
            }
            return Ok(FreezeOutcome::InsufficientBalance);
        }

        let inserted = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO credit_freeze_tb \
             (request_id, user_id, amount, model_code, conversation_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING freeze_id",
        )
        .bind(request_id)
        .bind(user_id)
        .bind(amount)
        .bind(model_code)
        .bind(conversation_id)
        .bind(FreezeStatus::FROZEN)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok((freeze_id,)) => {
                tx.commit().await?;
                Ok(FreezeOutcome::Frozen { freeze_id })
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                let log = self
                    .get_by_request_id(request_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok(FreezeOutcome::AlreadyFrozen {
                    freeze_id: log.freeze_id,
                })
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Commit the consumed portion of a freeze; the difference returns to
    /// available balance. `actual` is clamped to `[0, amount]` in SQL so a
    /// provider over-report can never charge beyond the reservation.
    pub async fn settle(
        &self,
        user_id: UserId,
        request_id: Uuid,
        actual: Decimal,
    ) -> Result<SettleOutcome, LedgerError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.settle_once(user_id, request_id, actual).await {
                Ok(outcome) => return Ok(outcome),
                Err(LedgerError::Database(e)) if is_retryable(&e) && attempt < self.retry_max => {
                    tokio::time::sleep(self.retry_base * attempt).await;
                }
                Err(LedgerError::Database(e)) if is_retryable(&e) => {
                    return Err(LedgerError::LockWaitExhausted { attempts: attempt });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn settle_once(
        &self,
        user_id: UserId,
        request_id: Uuid,
        actual: Decimal,
    ) -> Result<SettleOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Decimal, Decimal)>(
            "UPDATE credit_freeze_tb \
             SET status = $3, settled_amount = LEAST(GREATEST($4, 0), amount), \
                 updated_at = now() \
             WHERE request_id = $1 AND user_id = $2 AND status = $5 \
             RETURNING amount, settled_amount",
        )
        .bind(request_id)
        .bind(user_id)
        .bind(FreezeStatus::SETTLED)
        .bind(actual)
        .bind(FreezeStatus::FROZEN)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((amount, settled)) = row else {
            tx.rollback().await?;
            let log = self
                .get_by_request_id(request_id)
                .await?
                .ok_or(LedgerError::FreezeNotFound(request_id))?;
            return Ok(SettleOutcome::AlreadyFinal {
                status: log.status_enum(),
            });
        };

        sqlx::query(
            "UPDATE users_tb \
             SET frozen_balance = frozen_balance - $1, balance = balance - $2, \
                 updated_at = now() \
             WHERE user_id = $3",
        )
        .bind(amount)
        .bind(settled)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(%request_id, %amount, %settled, "freeze settled");
        Ok(SettleOutcome::Settled {
            refund_amount: amount - settled,
        })
    }

    /// Release a freeze without consumption (upstream failure path).
    pub async fn refund(
        &self,
        user_id: UserId,
        request_id: Uuid,
    ) -> Result<RefundOutcome, LedgerError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.refund_once(user_id, request_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(LedgerError::Database(e)) if is_retryable(&e) && attempt < self.retry_max => {
                    tokio::time::sleep(self.retry_base * attempt).await;
                }
                Err(LedgerError::Database(e)) if is_retryable(&e) => {
                    return Err(LedgerError::LockWaitExhausted { attempts: attempt });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn refund_once(
        &self,
        user_id: UserId,
        request_id: Uuid,
    ) -> Result<RefundOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Decimal,)>(
            "UPDATE credit_freeze_tb \
             SET status = $3, settled_amount = 0, updated_at = now() \
             WHERE request_id = $1 AND user_id = $2 AND status = $4 \
             RETURNING amount",
        )
        .bind(request_id)
        .bind(user_id)
        .bind(FreezeStatus::REFUNDED)
        .bind(FreezeStatus::FROZEN)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((amount,)) = row else {
            tx.rollback().await?;
            let log = self
                .get_by_request_id(request_id)
                .await?
                .ok_or(LedgerError::FreezeNotFound(request_id))?;
            return Ok(RefundOutcome::AlreadyFinal {
                status: log.status_enum(),
            });
        };

        sqlx::query(
            "UPDATE users_tb \
             SET frozen_balance = frozen_balance - $1, updated_at = now() \
             WHERE user_id = $2",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(%request_id, %amount, "freeze refunded");
        Ok(RefundOutcome::Refunded { amount })
    }

    /// Balance snapshot. Always read from the database; no in-process cache.
    pub async fn get_balance(&self, user_id: UserId) -> Result<BalanceSnapshot, LedgerError> {
        let (balance, frozen) = sqlx::query_as::<_, (Decimal, Decimal)>(
            "SELECT balance, frozen_balance FROM users_tb WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BalanceSnapshot {
            balance,
            frozen,
            available: balance - frozen,
        })
    }

    pub async fn get_by_request_id(
        &self,
        request_id: Uuid,
    ) -> Result<Option<FreezeLog>, sqlx::Error> {
        sqlx::query_as::<_, FreezeLog>(&format!(
            "SELECT {FREEZE_COLUMNS} FROM credit_freeze_tb WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Paged ledger history, newest first, optionally narrowed to one
    /// terminal status.
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        status: Option<FreezeStatus>,
        page_num: i64,
        page_size: Option<i64>,
    ) -> Result<(Vec<TransactionView>, i64), LedgerError> {
        let size = page_size.unwrap_or(self.page_size).clamp(1, 100);
        let offset = (page_num.max(1) - 1) * size;
        // status = 0 disables the filter so one statement covers both paths.
        let status_filter = status.map(FreezeStatus::as_i16).unwrap_or(0);

        let rows = sqlx::query_as::<_, FreezeLog>(&format!(
            "SELECT {FREEZE_COLUMNS} FROM credit_freeze_tb \
             WHERE user_id = $1 AND ($2 = 0 OR status = $2) \
             ORDER BY created_at DESC, freeze_id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(user_id)
        .bind(status_filter)
        .bind(size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM credit_freeze_tb \
             WHERE user_id = $1 AND ($2 = 0 OR status = $2)",
        )
        .bind(user_id)
        .bind(status_filter)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows.into_iter().map(TransactionView::from).collect(), total))
    }
}

/// Lock-wait timeout, deadlock, or serialization failure.
fn is_retryable(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db) = err {
        if let Some(code) = db.code() {
            return matches!(code.as_ref(), "55P03" | "40P01" | "40001");
        }
    }
    false
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db) = err {
        return db.is_unique_violation();
    }
    false
}
