//! User accounts: identity fields, credit balance columns, repository.

mod models;
mod repository;

pub use models::{BalanceSnapshot, User, UserStatus};
pub use repository::{PlatformIdentity, UserRepository};
