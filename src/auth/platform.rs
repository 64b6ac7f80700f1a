//! Mini-program identity provider client (auth code → session exchange).

use serde::Deserialize;
use thiserror::Error;

use crate::config::PlatformConfig;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider rejected code: {errcode} {errmsg}")]
    Rejected { errcode: i64, errmsg: String },

    #[error("Identity provider returned no openid")]
    MissingOpenid,
}

/// Resolved platform session for one login code.
#[derive(Debug, Clone)]
pub struct PlatformSession {
    pub openid: String,
    /// Stable cross-app id; present only when the app is bound to an
    /// open platform account.
    pub unionid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    openid: Option<String>,
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

pub struct PlatformClient {
    http: reqwest::Client,
    cfg: PlatformConfig,
}

impl PlatformClient {
    pub fn new(cfg: PlatformConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self { http, cfg })
    }

    /// Exchange a login code for openid/unionid.
    pub async fn code_to_session(&self, code: &str) -> Result<PlatformSession, PlatformError> {
        let resp: SessionResponse = self
            .http
            .get(&self.cfg.code2session_url)
            .query(&[
                ("appid", self.cfg.app_id.as_str()),
                ("secret", self.cfg.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json()
            .await?;

        if resp.errcode != 0 {
            return Err(PlatformError::Rejected {
                errcode: resp.errcode,
                errmsg: resp.errmsg,
            });
        }

        let openid = resp.openid.filter(|o| !o.is_empty());
        Ok(PlatformSession {
            openid: openid.ok_or(PlatformError::MissingOpenid)?,
            unionid: resp.unionid.filter(|u| !u.is_empty()),
        })
    }
}
