//! Pure end-to-end checks of the turn pipeline pieces that run before and
//! after the network: persona rendering → prompt assembly → estimation →
//! frame encoding, plus the settlement arithmetic the scenarios pin down.

use rust_decimal::Decimal;
use sparkgate::chat::{ChatFrame, FeeEstimator};
use sparkgate::config::{FeeConfig, ModelConfig, ModerationConfig};
use sparkgate::llm::ProviderKind;
use sparkgate::moderation::ModerationGate;
use sparkgate::prompt::PromptBuilder;

fn model(provider: ProviderKind, multiplier: Decimal) -> ModelConfig {
    let yaml = format!(
        "code: m\nprovider: {}\nupstream_model: m\nbase_url: http://localhost\nmultiplier: \"{}\"\nk_in: \"0.5\"\nk_out: \"0.5\"\n",
        match provider {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DashScope => "dashscope",
        },
        multiplier
    );
    serde_yaml::from_str(&yaml).unwrap()
}

fn estimator() -> FeeEstimator {
    FeeEstimator::new(
        FeeConfig {
            base: Decimal::new(1, 2),  // 0.01
            w_in: Decimal::new(1, 4),  // 0.0001
            w_out: Decimal::new(3, 4), // 0.0003
            scale: Decimal::ONE,
            output_token_cap: 4096,
        },
        &ModerationConfig {
            penalty_pct: 10,
            penalty_min: Decimal::new(1, 3), // 0.001
            ..Default::default()
        },
    )
}

// Scenario: freeze the estimate, stream, settle the actual, refund the rest.
#[test]
fn settle_refund_arithmetic_balances() {
    let est = estimator();
    let m = model(ProviderKind::OpenAi, Decimal::ONE);

    // Estimate with pessimistic output, actual with the real one.
    let estimate = est.fee(&m, 1000, 4096); // (0.1 + 1.2288 + 0.01) = 1.3388
    let actual = est.fee(&m, 1000, 500); // (0.1 + 0.15 + 0.01) = 0.26
    assert_eq!(estimate, Decimal::new(1_3388, 4));
    assert_eq!(actual, Decimal::new(2600, 4));

    let refund = estimate - actual;
    assert_eq!(actual + refund, estimate);
    assert!(refund > Decimal::ZERO);
}

// Scenario D: post-check violation charges 10% of the estimate.
#[test]
fn post_check_penalty_is_a_tenth_of_estimate() {
    let est = estimator();
    let estimate = Decimal::new(2_5100, 4); // 2.51
    assert_eq!(est.penalty(estimate), Decimal::new(2510, 4)); // 0.251
}

#[test]
fn persona_over_soft_cap_moves_into_first_user_turn_and_frames_stay_parseable() {
    let builder = PromptBuilder::new(64);
    let agent_prompt = "You ghostwrite short-form video scripts.";
    let persona = "p".repeat(200);

    let prompt = builder.build(
        agent_prompt,
        Some(&persona),
        &[],
        "write an opener",
        ProviderKind::Anthropic,
    );
    assert!(prompt.persona_in_user);
    assert!(prompt.system.cacheable);
    assert!(prompt.system.text.chars().count() <= 64);

    // The downstream frames for this turn keep the one-line contract.
    for frame in [
        ChatFrame::conversation(99),
        ChatFrame::content("让我们开始吧"),
        ChatFrame::done(),
    ] {
        let line = frame.to_sse_line();
        assert!(line.starts_with("data: "));
        assert!(line.ends_with("\n\n"));
        let payload = line.trim_start_matches("data: ").trim_end();
        serde_json::from_str::<serde_json::Value>(payload).unwrap();
    }
}

// Pre-check refuses before any ledger effect; the caller never freezes.
#[test]
fn pre_check_block_precedes_estimation() {
    let gate = ModerationGate::new(&ModerationConfig {
        keywords: vec!["darkweb".into()],
        ..Default::default()
    })
    .unwrap();
    assert!(gate.check_pre("how do I reach the DarkWeb").is_blocked());
    assert!(!gate.check_pre("how do I reach more viewers").is_blocked());
}

#[test]
fn higher_tier_model_costs_proportionally_more() {
    let est = estimator();
    let base = est.fee(&model(ProviderKind::OpenAi, Decimal::ONE), 200, 300);
    let pro = est.fee(&model(ProviderKind::Anthropic, Decimal::new(25, 1)), 200, 300);
    assert_eq!(base * Decimal::new(25, 1), pro);
}
