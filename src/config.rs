//! Gateway configuration: YAML snapshot plus environment overrides.
//!
//! One `AppConfig` is built in `main`, wrapped in an `Arc`, and passed by
//! reference everywhere. Nothing re-reads the file after startup; secrets
//! (database URL, JWT secret, provider API keys) may be supplied through the
//! environment so the YAML stays checkable into source control.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::llm::ProviderKind;

/// Top-level configuration snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub fee: FeeConfig,
    #[serde(default)]
    pub persist: PersistConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    /// Chat model registry, keyed lookups happen by `code`.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Model used when the chat request carries no model hint.
    #[serde(default = "default_model_code")]
    pub default_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Overridden by `DATABASE_URL` when set.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_file")]
    pub file: String,
    /// "hourly", "daily" or anything else for a single never-rotated file.
    #[serde(default = "default_rotation")]
    pub rotation: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Overridden by `JWT_SECRET` when set.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: i64,
    /// Tokens within this many seconds of `exp` are treated as expired on
    /// the read path, so callers refresh before the hard cutoff.
    #[serde(default = "default_token_grace")]
    pub token_grace_seconds: i64,
}

/// Mini-program identity provider (code → session exchange).
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_code2session_url")]
    pub code2session_url: String,
    #[serde(default)]
    pub app_id: String,
    /// Overridden by `PLATFORM_APP_SECRET` when set.
    #[serde(default)]
    pub app_secret: String,
    #[serde(default = "default_platform_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Attempts before a lock-wait is surfaced as a transient error.
    #[serde(default = "default_freeze_retry_max")]
    pub freeze_retry_max: u32,
    /// Base of the linear backoff between attempts.
    #[serde(default = "default_freeze_retry_base_ms")]
    pub freeze_retry_base_ms: u64,
    #[serde(default = "default_page_size")]
    pub history_page_size: i64,
}

/// Fee formula coefficients, all fixed-point.
///
/// fee = ((in_tokens * w_in) + (out_tokens * w_out) + base)
///         * model_multiplier * scale
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_fee_base")]
    pub base: Decimal,
    #[serde(default = "default_fee_w_in")]
    pub w_in: Decimal,
    #[serde(default = "default_fee_w_out")]
    pub w_out: Decimal,
    #[serde(default = "default_fee_scale")]
    pub scale: Decimal,
    /// Hard cap on estimated output tokens regardless of agent settings.
    #[serde(default = "default_output_cap")]
    pub output_token_cap: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistConfig {
    #[serde(default = "default_persist_workers")]
    pub workers: usize,
    /// Per-partition channel capacity; `enqueue` reports `Dropped` once the
    /// partition is full and the caller falls back to an inline write.
    #[serde(default = "default_persist_queue_cap")]
    pub queue_cap: usize,
    #[serde(default = "default_persist_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    /// Compatibility cap on system prompt length enforced by some upstream
    /// gateways; above this the persona block moves into the first user turn.
    #[serde(default = "default_sys_soft_max")]
    pub sys_soft_max: usize,
    /// Prior turns loaded into the upstream message list.
    #[serde(default = "default_history_max")]
    pub history_max_messages: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    /// Case-insensitive substring hits.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex hits, compiled at startup.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Percentage of the estimate charged when the post-check blocks.
    #[serde(default = "default_penalty_pct")]
    pub penalty_pct: u32,
    /// Floor for the post-check penalty.
    #[serde(default = "default_penalty_min")]
    pub penalty_min: Decimal,
}

/// One upstream chat model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Platform-facing model code, e.g. "spark-pro".
    pub code: String,
    pub provider: ProviderKind,
    /// Upstream model identifier sent on the wire.
    pub upstream_model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: String,
    /// Fee multiplier relative to the platform base rate.
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
    /// Chars-to-tokens factor for prompt estimation.
    #[serde(default = "default_k_in")]
    pub k_in: Decimal,
    /// Chars-to-tokens factor when the provider reports no completion usage.
    #[serde(default = "default_k_out")]
    pub k_out: Decimal,
    #[serde(default = "default_max_output")]
    pub max_output_tokens: i32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-chunk read timeout while streaming.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Whole-request deadline.
    #[serde(default = "default_total_deadline")]
    pub total_deadline_ms: u64,
}

impl ModelConfig {
    /// Resolve the API key: explicit value wins, then the named env var.
    pub fn resolve_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        if !self.api_key_env.is_empty() {
            if let Ok(v) = std::env::var(&self.api_key_env) {
                return v;
            }
        }
        String::new()
    }
}

impl AppConfig {
    /// Load the YAML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut cfg: AppConfig = serde_yaml::from_str(&raw)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Environment overrides for the secrets that never belong in YAML.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(secret) = std::env::var("PLATFORM_APP_SECRET") {
            self.platform.app_secret = secret;
        }
    }

    pub fn model(&self, code: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.code == code)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file: default_log_file(),
            rotation: default_rotation(),
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_ttl_seconds: default_access_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            token_grace_seconds: default_token_grace(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            code2session_url: default_code2session_url(),
            app_id: String::new(),
            app_secret: String::new(),
            timeout_ms: default_platform_timeout(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            freeze_retry_max: default_freeze_retry_max(),
            freeze_retry_base_ms: default_freeze_retry_base_ms(),
            history_page_size: default_page_size(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            base: default_fee_base(),
            w_in: default_fee_w_in(),
            w_out: default_fee_w_out(),
            scale: default_fee_scale(),
            output_token_cap: default_output_cap(),
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            workers: default_persist_workers(),
            queue_cap: default_persist_queue_cap(),
            max_attempts: default_persist_max_attempts(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            sys_soft_max: default_sys_soft_max(),
            history_max_messages: default_history_max(),
        }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            patterns: Vec::new(),
            penalty_pct: default_penalty_pct(),
            penalty_min: default_penalty_min(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
            auth: AuthConfig::default(),
            platform: PlatformConfig::default(),
            ledger: LedgerConfig::default(),
            fee: FeeConfig::default(),
            persist: PersistConfig::default(),
            prompt: PromptConfig::default(),
            moderation: ModerationConfig::default(),
            models: Vec::new(),
            default_model: default_model_code(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_log_file() -> String {
    "sparkgate.log".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_jwt_secret() -> String {
    "change-me".to_string()
}
fn default_access_ttl() -> i64 {
    7200
}
fn default_refresh_ttl() -> i64 {
    30 * 24 * 3600
}
fn default_token_grace() -> i64 {
    300
}
fn default_code2session_url() -> String {
    "https://api.weixin.qq.com/sns/jscode2session".to_string()
}
fn default_platform_timeout() -> u64 {
    5_000
}
fn default_freeze_retry_max() -> u32 {
    3
}
fn default_freeze_retry_base_ms() -> u64 {
    100
}
fn default_page_size() -> i64 {
    20
}
fn default_fee_base() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_fee_w_in() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}
fn default_fee_w_out() -> Decimal {
    Decimal::new(3, 4) // 0.0003
}
fn default_fee_scale() -> Decimal {
    Decimal::ONE
}
fn default_output_cap() -> i32 {
    4096
}
fn default_persist_workers() -> usize {
    3
}
fn default_persist_queue_cap() -> usize {
    10_000
}
fn default_persist_max_attempts() -> u32 {
    5
}
fn default_sys_soft_max() -> usize {
    1500
}
fn default_history_max() -> i64 {
    20
}
fn default_penalty_pct() -> u32 {
    10
}
fn default_penalty_min() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_multiplier() -> Decimal {
    Decimal::ONE
}
fn default_k_in() -> Decimal {
    Decimal::new(6, 1) // 0.6 tokens per char
}
fn default_k_out() -> Decimal {
    Decimal::new(6, 1)
}
fn default_max_output() -> i32 {
    2048
}
fn default_connect_timeout() -> u64 {
    5_000
}
fn default_read_timeout() -> u64 {
    30_000
}
fn default_total_deadline() -> u64 {
    300_000
}
fn default_model_code() -> String {
    "spark-lite".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.prompt.sys_soft_max, 1500);
        assert_eq!(cfg.ledger.freeze_retry_max, 3);
        assert_eq!(cfg.ledger.freeze_retry_base_ms, 100);
        assert_eq!(cfg.persist.workers, 3);
        assert_eq!(cfg.persist.queue_cap, 10_000);
        assert_eq!(cfg.auth.token_grace_seconds, 300);
        assert_eq!(cfg.moderation.penalty_pct, 10);
    }

    #[test]
    fn yaml_snapshot_parses_with_partial_sections() {
        let yaml = r#"
server:
  port: 9000
models:
  - code: spark-pro
    provider: anthropic
    upstream_model: claude-sonnet-4-5
    base_url: https://api.anthropic.com
    multiplier: "2.5"
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        let m = cfg.model("spark-pro").unwrap();
        assert_eq!(m.provider, ProviderKind::Anthropic);
        assert_eq!(m.multiplier, Decimal::new(25, 1));
        assert!(cfg.model("nope").is_none());
    }

    #[test]
    fn api_key_resolution_prefers_literal() {
        let mut m = ModelConfig {
            code: "m".into(),
            provider: ProviderKind::OpenAi,
            upstream_model: "m".into(),
            base_url: "http://localhost".into(),
            api_key_env: "SPARKGATE_TEST_KEY_UNSET".into(),
            api_key: "literal".into(),
            multiplier: Decimal::ONE,
            k_in: default_k_in(),
            k_out: default_k_out(),
            max_output_tokens: 1024,
            connect_timeout_ms: 1000,
            read_timeout_ms: 1000,
            total_deadline_ms: 1000,
        };
        assert_eq!(m.resolve_api_key(), "literal");
        m.api_key.clear();
        assert_eq!(m.resolve_api_key(), "");
    }
}
