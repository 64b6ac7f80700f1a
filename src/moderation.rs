//! Blocklist moderation: pre-check on user input, post-check on model output.
//!
//! The classifier is a keyword list (case-insensitive substring) plus a
//! compiled regex list, both from configuration. Pre-check failures refuse
//! the request before any credit is frozen; post-check failures cancel the
//! upstream stream and settle with a penalty instead of a refund.

use regex::Regex;

use crate::config::ModerationConfig;

/// Single boolean verdict with the matched term kept for operator logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Blocked { matched: String },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }
}

pub struct ModerationGate {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl ModerationGate {
    pub fn new(cfg: &ModerationConfig) -> anyhow::Result<Self> {
        let keywords = cfg
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.trim().to_lowercase())
            .collect();

        let mut patterns = Vec::with_capacity(cfg.patterns.len());
        for raw in &cfg.patterns {
            patterns.push(
                Regex::new(raw)
                    .map_err(|e| anyhow::anyhow!("bad moderation pattern {raw:?}: {e}"))?,
            );
        }

        Ok(Self { keywords, patterns })
    }

    /// Check user input before any ledger effect.
    pub fn check_pre(&self, text: &str) -> Verdict {
        self.scan(text)
    }

    /// Check assembled model output after the stream ends.
    pub fn check_post(&self, text: &str) -> Verdict {
        self.scan(text)
    }

    fn scan(&self, text: &str) -> Verdict {
        let lowered = text.to_lowercase();
        for keyword in &self.keywords {
            if lowered.contains(keyword.as_str()) {
                return Verdict::Blocked {
                    matched: keyword.clone(),
                };
            }
        }
        for pattern in &self.patterns {
            if pattern.is_match(text) {
                return Verdict::Blocked {
                    matched: pattern.as_str().to_string(),
                };
            }
        }
        Verdict::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(keywords: &[&str], patterns: &[&str]) -> ModerationGate {
        ModerationGate::new(&ModerationConfig {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn clean_text_passes_both_checks() {
        let gate = gate(&["forbidden"], &[]);
        assert_eq!(gate.check_pre("a perfectly fine prompt"), Verdict::Ok);
        assert_eq!(gate.check_post("a perfectly fine reply"), Verdict::Ok);
    }

    #[test]
    fn keyword_hit_is_case_insensitive() {
        let gate = gate(&["Forbidden"], &[]);
        let verdict = gate.check_pre("this is FORBIDDEN content");
        assert!(verdict.is_blocked());
    }

    #[test]
    fn regex_hit_blocks() {
        let gate = gate(&[], &[r"\b1[3-9]\d{9}\b"]);
        assert!(gate.check_post("call me at 13800138000 now").is_blocked());
        assert_eq!(gate.check_post("call me maybe"), Verdict::Ok);
    }

    #[test]
    fn empty_config_blocks_nothing() {
        let gate = gate(&[], &[]);
        assert_eq!(gate.check_pre(""), Verdict::Ok);
    }

    #[test]
    fn bad_pattern_fails_startup() {
        let result = ModerationGate::new(&ModerationConfig {
            patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
