//! DVS / EQS scorers — declarative degradation rules over data and execution
//! quality.
//!
//! Both scores follow the same shape: start from the prior score, walk a
//! `Vec<DegradationRule>` once applying every rule whose condition matches
//! the current state, then add per-bar recovery toward `1.0`. Rules are data,
//! never a hard-coded `if` chain per instance.

/// How a matched rule moves the score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Penalty {
    /// One-time additive penalty, e.g. `-0.10`.
    Delta(f64),
    /// Multiplicative per-bar decay while the condition keeps matching:
    /// `score *= 1.0 - rate`.
    DecayRate(f64),
}

impl Penalty {
    fn apply(&self, score: f64) -> f64 {
        match self {
            Penalty::Delta(delta) => score + delta,
            Penalty::DecayRate(rate) => score * (1.0 - rate),
        }
    }
}

/// Floor used when dividing by an expected-slippage value of zero, so the
/// ratio doesn't divide-by-zero and instead becomes large enough to trigger
/// any high-slippage rule.
pub const DEFAULT_SLIPPAGE_FLOOR: f64 = 1e-6;

fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// DVS — Data Viability Score
// ---------------------------------------------------------------------------

/// Observed data-feed state for one bar, used to evaluate DVS rules.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DataState {
    pub bar_lag_seconds: f64,
    pub gap_detected: bool,
    pub missing_fields: i64,
}

/// A DVS degradation condition, matched against [`DataState`].
#[derive(Clone, Debug, PartialEq)]
pub enum DvsCondition {
    BarLagSecondsGte(f64),
    GapDetectedEq(bool),
    MissingFieldsGt(i64),
}

impl DvsCondition {
    fn matches(&self, state: &DataState) -> bool {
        match self {
            DvsCondition::BarLagSecondsGte(threshold) => state.bar_lag_seconds >= *threshold,
            DvsCondition::GapDetectedEq(expected) => state.gap_detected == *expected,
            DvsCondition::MissingFieldsGt(threshold) => state.missing_fields > *threshold,
        }
    }
}

/// One configured DVS degradation rule, normally loaded from the data contract.
#[derive(Clone, Debug, PartialEq)]
pub struct DvsRule {
    pub id: String,
    pub condition: DvsCondition,
    pub penalty: Penalty,
}

/// Compute the next DVS from the prior score, the current data state, and the
/// configured rule list. Applies every matched penalty, then adds
/// `recovery_per_bar` toward `1.0`. Clamped to `[0, 1]`.
pub fn compute_dvs(prior: f64, state: &DataState, rules: &[DvsRule], recovery_per_bar: f64) -> f64 {
    let mut score = prior;
    for rule in rules {
        if rule.condition.matches(state) {
            score = rule.penalty.apply(score);
        }
    }
    score += recovery_per_bar;
    clamp_unit(score)
}

// ---------------------------------------------------------------------------
// EQS — Execution Quality Score
// ---------------------------------------------------------------------------

/// Observed fill/connection state, used to evaluate EQS rules.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionState {
    pub fill_price: f64,
    pub limit_price: f64,
    pub expected_slippage: f64,
    pub order_state: String,
    pub connection_state: String,
}

impl ExecutionState {
    /// `|fill_price - limit_price| / max(expected_slippage, floor)`.
    fn slippage_ratio(&self, floor: f64) -> f64 {
        let actual = (self.fill_price - self.limit_price).abs();
        actual / self.expected_slippage.max(floor)
    }
}

/// An EQS degradation condition, matched against [`ExecutionState`].
#[derive(Clone, Debug, PartialEq)]
pub enum EqsCondition {
    SlippageVsExpectedGt(f64),
    OrderStateEq(String),
    ConnectionStateEq(String),
}

impl EqsCondition {
    fn matches(&self, state: &ExecutionState, slippage_floor: f64) -> bool {
        match self {
            EqsCondition::SlippageVsExpectedGt(threshold) => {
                state.slippage_ratio(slippage_floor) > *threshold
            }
            EqsCondition::OrderStateEq(expected) => &state.order_state == expected,
            EqsCondition::ConnectionStateEq(expected) => &state.connection_state == expected,
        }
    }
}

/// One configured EQS degradation rule, normally loaded from the execution contract.
#[derive(Clone, Debug, PartialEq)]
pub struct EqsRule {
    pub id: String,
    pub condition: EqsCondition,
    pub penalty: Penalty,
}

/// Compute the next EQS from the prior score, the current execution state,
/// and the configured rule list. `slippage_min_expected` floors
/// `expected_slippage` before the ratio is computed, so a broker reporting
/// zero expected slippage still produces a (large, rule-triggering) ratio
/// rather than dividing by zero.
pub fn compute_eqs(
    prior: f64,
    state: &ExecutionState,
    rules: &[EqsRule],
    recovery_per_bar: f64,
    slippage_min_expected: f64,
) -> f64 {
    let mut score = prior;
    for rule in rules {
        if rule.condition.matches(state, slippage_min_expected) {
            score = rule.penalty.apply(score);
        }
    }
    score += recovery_per_bar;
    clamp_unit(score)
}
