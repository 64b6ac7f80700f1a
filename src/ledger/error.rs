use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Lock wait exhausted after {attempts} attempts")]
    LockWaitExhausted { attempts: u32 },

    #[error("Invalid amount: must be positive")]
    InvalidAmount,

    #[error("No freeze log for request {0}")]
    FreezeNotFound(uuid::Uuid),
}

impl LedgerError {
    /// Transient errors may be retried by the caller; everything else is
    /// surfaced as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::LockWaitExhausted { .. })
    }
}
