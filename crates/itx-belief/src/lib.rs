mod types;

pub use types::{BeliefConfig, BeliefState, ConstraintSpec, NormalizeMode, SignalNorm};

use itx_signals::{SignalId, SignalVector};
use std::collections::BTreeMap;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn normalize_signal(id: SignalId, value: f64, norms: &BTreeMap<SignalId, SignalNorm>) -> f64 {
    match norms.get(&id) {
        Some(spec) if spec.max != spec.min => clamp01((value - spec.min) / (spec.max - spec.min)),
        Some(_) => 0.0,
        None => clamp01(value),
    }
}

/// Recompute Tier-1 constraint beliefs, their stability, and the
/// belief-descending ranking, from this bar's signal vector and the prior
/// belief state.
pub fn update_beliefs(
    signals: &SignalVector,
    prev: &BeliefState,
    cfg: &BeliefConfig,
    last_price: Option<f64>,
) -> BeliefState {
    let mut beliefs: BTreeMap<String, f64> = BTreeMap::new();

    for c in &cfg.constraints {
        let mut score = 0.0;
        let mut total_w = 0.0;
        for (&sig, &w) in &c.weights {
            let wv = w.max(0.0);
            total_w += wv;
            score += wv * normalize_signal(sig, signals.get(sig), &cfg.signal_norms);
        }
        let prev_belief = prev.belief(&c.id);
        let belief_c = if total_w == 0.0 {
            // Zero-weight law (§4.5): a constraint with no positive-weight
            // inputs carries its previous belief forward unchanged,
            // independent of decay_lambda.
            prev_belief
        } else {
            let raw = score / total_w;
            clamp01((1.0 - c.decay_lambda) * raw + c.decay_lambda * prev_belief)
        };
        beliefs.insert(c.id.clone(), belief_c);
    }

    match cfg.normalize_mode {
        NormalizeMode::Independent => {}
        NormalizeMode::Softmax if !beliefs.is_empty() => {
            let max_v = beliefs.values().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exps: BTreeMap<String, f64> = beliefs.iter().map(|(k, v)| (k.clone(), (v - max_v).exp())).collect();
            let z: f64 = exps.values().sum();
            if z > 0.0 {
                beliefs = exps.into_iter().map(|(k, v)| (k, v / z)).collect();
            }
        }
        NormalizeMode::Sum1 if !beliefs.is_empty() => {
            let s: f64 = beliefs.values().sum();
            if s > 0.0 {
                beliefs = beliefs.into_iter().map(|(k, v)| (k, clamp01(v / s))).collect();
            }
        }
        _ => {}
    }

    let norm_delta = match (last_price, prev.prev_price) {
        (Some(lp), Some(pp)) if lp > 0.0 => {
            let delta_pct = (lp - pp).abs() / pp.max(1e-9);
            clamp01(delta_pct / 0.05)
        }
        _ => 0.0,
    };

    let mut stability = BTreeMap::new();
    for cid in beliefs.keys() {
        let prev_s = prev.stability.get(cid).copied().unwrap_or(0.0);
        stability.insert(cid.clone(), clamp01(cfg.stability_alpha * norm_delta + (1.0 - cfg.stability_alpha) * prev_s));
    }

    let mut top_constraints: Vec<String> = beliefs.keys().cloned().collect();
    top_constraints.sort_by(|a, b| beliefs[b].partial_cmp(&beliefs[a]).unwrap());

    BeliefState {
        beliefs,
        stability,
        top_constraints,
        prev_price: last_price,
    }
}
