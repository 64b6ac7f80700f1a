//! Token session: platform login, access/refresh issuance, rotation on
//! refresh with reuse detection, expiry-aware read path.

pub mod handlers;
pub mod middleware;
mod models;
mod platform;
mod service;

pub use models::{AuthUser, Claims, LoginResponse, TokenPair, UserInfo};
pub use platform::{PlatformClient, PlatformError, PlatformSession};
pub use service::{AuthError, TokenSessionService, decode_exp_unverified, is_expired};
