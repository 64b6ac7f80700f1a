//! Cost estimation and the settlement fee formula, all fixed-point.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::{FeeConfig, ModelConfig, ModerationConfig};

/// Credit amounts round to the ledger's 4-decimal scale.
const CREDIT_SCALE: u32 = 4;

#[derive(Debug, Clone)]
pub struct FeeEstimator {
    fee: FeeConfig,
    penalty_pct: Decimal,
    penalty_min: Decimal,
}

impl FeeEstimator {
    pub fn new(fee: FeeConfig, moderation: &ModerationConfig) -> Self {
        Self {
            fee,
            penalty_pct: Decimal::from(moderation.penalty_pct) / Decimal::ONE_HUNDRED,
            penalty_min: moderation.penalty_min,
        }
    }

    /// Prompt-side token estimate from a character count.
    pub fn input_tokens(&self, model: &ModelConfig, chars: usize) -> i64 {
        tokens_from_chars(chars, model.k_in)
    }

    /// Completion-side token estimate when the provider reports no usage.
    pub fn output_tokens_from_chars(&self, model: &ModelConfig, chars: usize) -> i64 {
        tokens_from_chars(chars, model.k_out)
    }

    /// Output-side estimate before the stream opens.
    pub fn estimated_output_tokens(&self, model: &ModelConfig, agent_max_tokens: i32) -> i64 {
        i64::from(
            agent_max_tokens
                .min(model.max_output_tokens)
                .min(self.fee.output_token_cap)
                .max(1),
        )
    }

    /// fee = ((in * w_in) + (out * w_out) + base) * multiplier * scale
    pub fn fee(&self, model: &ModelConfig, in_tokens: i64, out_tokens: i64) -> Decimal {
        let raw = (Decimal::from(in_tokens) * self.fee.w_in
            + Decimal::from(out_tokens) * self.fee.w_out
            + self.fee.base)
            * model.multiplier
            * self.fee.scale;
        raw.round_dp(CREDIT_SCALE)
    }

    /// Post-check violation charge: a percentage of the estimate, floored.
    pub fn penalty(&self, estimate: Decimal) -> Decimal {
        (estimate * self.penalty_pct)
            .max(self.penalty_min)
            .round_dp(CREDIT_SCALE)
    }
}

fn tokens_from_chars(chars: usize, k: Decimal) -> i64 {
    (Decimal::from(chars as u64) * k)
        .ceil()
        .to_i64()
        .unwrap_or(i64::MAX)
        .max(if chars == 0 { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;

    fn model(multiplier: Decimal) -> ModelConfig {
        ModelConfig {
            code: "m".into(),
            provider: ProviderKind::OpenAi,
            upstream_model: "m".into(),
            base_url: "http://localhost".into(),
            api_key_env: String::new(),
            api_key: String::new(),
            multiplier,
            k_in: Decimal::new(5, 1),  // 0.5
            k_out: Decimal::new(5, 1), // 0.5
            max_output_tokens: 2048,
            connect_timeout_ms: 1000,
            read_timeout_ms: 1000,
            total_deadline_ms: 1000,
        }
    }

    fn estimator() -> FeeEstimator {
        FeeEstimator::new(
            FeeConfig {
                base: Decimal::new(1, 2),   // 0.01
                w_in: Decimal::new(1, 4),   // 0.0001
                w_out: Decimal::new(3, 4),  // 0.0003
                scale: Decimal::ONE,
                output_token_cap: 4096,
            },
            &ModerationConfig {
                penalty_pct: 10,
                penalty_min: Decimal::new(1, 2),
                ..Default::default()
            },
        )
    }

    #[test]
    fn token_estimate_rounds_up() {
        let est = estimator();
        let m = model(Decimal::ONE);
        assert_eq!(est.input_tokens(&m, 3), 2); // 1.5 -> 2
        assert_eq!(est.input_tokens(&m, 0), 0);
        assert_eq!(est.input_tokens(&m, 1), 1);
    }

    #[test]
    fn fee_formula_is_exact_decimal_math() {
        let est = estimator();
        let m = model(Decimal::ONE);
        // (100 * 0.0001) + (500 * 0.0003) + 0.01 = 0.17
        assert_eq!(est.fee(&m, 100, 500), Decimal::new(1700, 4));
    }

    #[test]
    fn multiplier_scales_fee() {
        let est = estimator();
        let doubled = model(Decimal::TWO);
        assert_eq!(est.fee(&doubled, 100, 500), Decimal::new(3400, 4));
    }

    #[test]
    fn output_estimate_takes_the_tightest_cap() {
        let est = estimator();
        let m = model(Decimal::ONE);
        assert_eq!(est.estimated_output_tokens(&m, 8192), 2048);
        assert_eq!(est.estimated_output_tokens(&m, 100), 100);
    }

    #[test]
    fn penalty_is_ten_percent_of_estimate_with_floor() {
        let est = estimator();
        // 10% of 2.51 = 0.251
        assert_eq!(est.penalty(Decimal::new(2_5100, 4)), Decimal::new(2510, 4));
        // Floor kicks in below 0.1 estimate.
        assert_eq!(est.penalty(Decimal::new(500, 4)), Decimal::new(100, 4));
    }
}
