use itx_signals::SignalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Min/max a raw signal value is rescaled against before it contributes to a
/// constraint's weighted score. Signals with no configured norm are assumed
/// already in `[0,1]` and are merely clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalNorm {
    pub min: f64,
    pub max: f64,
}

/// Static registry definition of one Tier-1 constraint belief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub id: String,
    pub weights: BTreeMap<SignalId, f64>,
    pub decay_lambda: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NormalizeMode {
    #[default]
    Independent,
    Softmax,
    Sum1,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeliefConfig {
    pub constraints: Vec<ConstraintSpec>,
    pub signal_norms: BTreeMap<SignalId, SignalNorm>,
    pub normalize_mode: NormalizeMode,
    pub stability_alpha: f64,
}

/// Belief engine output for one bar. `prev_price` is scratch state carried
/// forward purely to compute next bar's stability delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeliefState {
    pub beliefs: BTreeMap<String, f64>,
    pub stability: BTreeMap<String, f64>,
    pub top_constraints: Vec<String>,
    pub prev_price: Option<f64>,
}

impl BeliefState {
    pub fn belief(&self, id: &str) -> f64 {
        self.beliefs.get(id).copied().unwrap_or(0.0)
    }
}
