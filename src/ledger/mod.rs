//! Compute-credit ledger: atomic freeze / settle / refund with idempotency
//! per request id.
//!
//! All mutual exclusion is delegated to row-level locking via conditional
//! UPDATEs; there are no application-level locks on user rows and no
//! in-process balance caches.

mod error;
pub mod handlers;
mod models;
mod service;

pub use error::LedgerError;
pub use models::{
    FreezeLog, FreezeOutcome, FreezeStatus, RefundOutcome, SettleOutcome, TransactionView,
};
pub use service::CreditLedger;
