//! DVS (Data Viability Score) and EQS (Execution Quality Score): declarative
//! degradation-rule evaluators sharing one shape (§4.4). Both are pure
//! functions of the current state, the rule list, and the prior score.

use serde::{Deserialize, Serialize};

/// A single field compared against a threshold/value. The condition names
/// mirror the ones named in `SPEC_FULL.md` §4.4 verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    BarLagSecondsGte(f64),
    GapDetectedEq(bool),
    MissingFieldsGt(u32),
    SlippageVsExpectedGte(f64),
    OrderStateEq(String),
    ConnectionStateEq(String),
}

/// Effect applied when a rule's condition matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Subtract a fixed amount immediately.
    Penalty(f64),
    /// Subtract a fixed amount per bar the condition remains true.
    Decay(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationRule {
    pub condition: Condition,
    pub effect: Effect,
}

/// Observed state a quality score is evaluated against. Only the fields a
/// configured rule set actually references need to be populated by the
/// caller; unreferenced fields are harmless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityState {
    pub bar_lag_seconds: f64,
    pub gap_detected: bool,
    pub missing_fields: u32,
    pub slippage_vs_expected: f64,
    pub order_state: String,
    pub connection_state: String,
}

fn condition_matches(cond: &Condition, state: &QualityState) -> bool {
    match cond {
        Condition::BarLagSecondsGte(t) => state.bar_lag_seconds >= *t,
        Condition::GapDetectedEq(v) => state.gap_detected == *v,
        Condition::MissingFieldsGt(t) => state.missing_fields > *t,
        Condition::SlippageVsExpectedGte(t) => state.slippage_vs_expected >= *t,
        Condition::OrderStateEq(v) => &state.order_state == v,
        Condition::ConnectionStateEq(v) => &state.connection_state == v,
    }
}

/// Evaluate one quality score: apply every matched rule's effect in list
/// order, then add back `recovery_per_bar` toward 1.0, then clamp to [0,1].
/// Shared by both DVS and EQS — the two differ only in which `QualityState`
/// fields their configured rules reference.
pub fn evaluate_quality_score(
    prev_score: f64,
    rules: &[DegradationRule],
    state: &QualityState,
    recovery_per_bar: f64,
) -> f64 {
    let mut score = prev_score;
    for rule in rules {
        if condition_matches(&rule.condition, state) {
            let delta = match rule.effect {
                Effect::Penalty(p) => p,
                Effect::Decay(d) => d,
            };
            score -= delta;
        }
    }
    score += recovery_per_bar;
    score.clamp(0.0, 1.0)
}

/// Slippage ratio used by the `slippage_vs_expected_gte` rule: a floor on
/// the denominator prevents divide-by-zero from masquerading as "no
/// slippage" when expected slippage is configured as zero (`SPEC_FULL.md`
/// P4: the ratio must still trigger high-slippage rules in that case).
pub fn slippage_ratio(fill_price: f64, limit_price: f64, expected: f64, slippage_min_expected: f64) -> f64 {
    let denom = expected.max(slippage_min_expected);
    (fill_price - limit_price).abs() / denom
}
