mod types;

pub use types::{
    ActiveBias, ActiveStrategy, BiasCategory, BiasPolarity, BiasSpec, BiasState, CapitalTier,
    Conflict, DetectorKind, DominanceEntry, LiquidityRegime, Posture, Regime, RegimeTag,
    ScoringKind, StrategyClass, StrategySpec, StrategyState, TrapEntry, VolRegime,
};

use itx_signals::SignalVector;
use std::collections::HashSet;

fn detector_score(kind: DetectorKind, signals: &SignalVector) -> f64 {
    match kind {
        DetectorKind::SignalAbove(id, t) => {
            if signals.get(id) > t {
                1.0
            } else {
                0.0
            }
        }
        DetectorKind::SignalBelow(id, t) => {
            if signals.get(id) < t {
                1.0
            } else {
                0.0
            }
        }
        DetectorKind::SignalAbsAbove(id, t) => {
            if signals.get(id).abs() > t {
                1.0
            } else {
                0.0
            }
        }
        DetectorKind::SignalInRange(id, lo, hi) => {
            let v = signals.get(id);
            if v >= lo && v <= hi {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn run_detectors(detectors: &[DetectorKind], signals: &SignalVector) -> Vec<f64> {
    detectors.iter().map(|d| detector_score(*d, signals)).collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn apply_scoring(kind: ScoringKind, scores: &[f64], signals: &SignalVector) -> f64 {
    match kind {
        ScoringKind::Mean => mean(scores),
        ScoringKind::Max => scores.iter().cloned().fold(0.0, f64::max),
        ScoringKind::Min => {
            if scores.is_empty() {
                0.0
            } else {
                scores.iter().cloned().fold(f64::INFINITY, f64::min)
            }
        }
        ScoringKind::MeanScaledBySignal(id) => mean(scores) * signals.get(id),
    }
}

/// Evaluate every bias in the registry against this bar's signal vector.
pub fn compute_bias_state(signals: &SignalVector, registry: &[BiasSpec]) -> BiasState {
    let mut active = Vec::new();
    for spec in registry {
        let detector_scores = run_detectors(&spec.detectors, signals);
        let strength = apply_scoring(spec.strength_fn, &detector_scores, signals);
        let confidence = apply_scoring(spec.confidence_fn, &detector_scores, signals);
        if strength > 0.3 && confidence > 0.5 {
            active.push(ActiveBias {
                bias_id: spec.id.clone(),
                strength,
                confidence,
                category: spec.category,
            });
        }
    }

    let regime = classify_regime(&active, registry);
    let conflicts = detect_conflicts(&active, registry);

    BiasState { active, regime, conflicts }
}

fn spec_for<'a>(registry: &'a [BiasSpec], id: &str) -> Option<&'a BiasSpec> {
    registry.iter().find(|s| s.id == id)
}

fn classify_regime(active: &[ActiveBias], registry: &[BiasSpec]) -> Regime {
    let has_tag = |category_filter: &dyn Fn(BiasCategory) -> bool, tag: RegimeTag| {
        active.iter().any(|b| {
            category_filter(b.category)
                && spec_for(registry, &b.bias_id)
                    .map(|s| s.regime_tags.contains(&tag))
                    .unwrap_or(false)
        })
    };

    let is_vol_category = |c: BiasCategory| matches!(c, BiasCategory::Volatility | BiasCategory::Existential);
    let vol_regime = if has_tag(&is_vol_category, RegimeTag::VolatilityExpansion)
        || has_tag(&is_vol_category, RegimeTag::LiquidityVacuum)
    {
        VolRegime::High
    } else if has_tag(&is_vol_category, RegimeTag::DeadMarket) || has_tag(&is_vol_category, RegimeTag::MarketSilence) {
        VolRegime::Low
    } else {
        VolRegime::Normal
    };

    let has_trend = active
        .iter()
        .any(|b| spec_for(registry, &b.bias_id).map(|s| s.regime_tags.contains(&RegimeTag::Trend)).unwrap_or(false));
    let has_range = active
        .iter()
        .any(|b| spec_for(registry, &b.bias_id).map(|s| s.regime_tags.contains(&RegimeTag::Range)).unwrap_or(false));
    let trend_regime = match (has_trend, has_range) {
        (true, false) => TrendRegime::Trending,
        (false, true) => TrendRegime::Ranging,
        _ => TrendRegime::Mixed,
    };

    let liq_biases: Vec<&ActiveBias> = active.iter().filter(|b| b.category == BiasCategory::Liquidity).collect();
    let liquidity_regime = if liq_biases
        .iter()
        .any(|b| spec_for(registry, &b.bias_id).map(|s| s.regime_tags.contains(&RegimeTag::LiquidityVacuum)).unwrap_or(false))
    {
        LiquidityRegime::Thin
    } else if liq_biases.len() > 2 {
        LiquidityRegime::Active
    } else {
        LiquidityRegime::Normal
    };

    Regime { vol_regime, trend_regime, liquidity_regime }
}

fn detect_conflicts(active: &[ActiveBias], registry: &[BiasSpec]) -> Vec<Conflict> {
    let active_ids: HashSet<&str> = active.iter().map(|b| b.bias_id.as_str()).collect();
    let mut conflicts = Vec::new();
    for b in active {
        let Some(spec) = spec_for(registry, &b.bias_id) else { continue };
        for conflict_id in &spec.conflicts_with {
            if active_ids.contains(conflict_id.as_str()) {
                let other_strength = active.iter().find(|o| &o.bias_id == conflict_id).map(|o| o.strength).unwrap_or(0.0);
                conflicts.push(Conflict {
                    a: b.bias_id.clone(),
                    b: conflict_id.clone(),
                    severity: b.strength.min(other_strength),
                });
            }
        }
    }
    conflicts
}

/// Evaluate every strategy archetype in the registry against the current
/// bias state and signal vector.
pub fn compute_strategy_state(
    signals: &SignalVector,
    bias_state: &BiasState,
    registry: &[StrategySpec],
) -> StrategyState {
    let active_bias_ids: HashSet<&str> = bias_state.active.iter().map(|b| b.bias_id.as_str()).collect();

    let mut active = Vec::new();
    let mut dominance = Vec::new();
    let mut traps = Vec::new();

    for spec in registry {
        let required: HashSet<&str> = spec.bias_dependencies.iter().map(|s| s.as_str()).collect();
        let bias_support = if required.is_empty() {
            1.0
        } else {
            required.intersection(&active_bias_ids).count() as f64 / required.len() as f64
        };

        let signature_scores = run_detectors(&spec.signature_detectors, signals);
        let signature_strength = mean(&signature_scores);

        let failure_scores = run_detectors(&spec.failure_signatures, signals);
        let failure_strength = mean(&failure_scores);

        let probability = 0.5 * bias_support + 0.5 * signature_strength;

        let posture = if probability > 0.4 {
            if failure_strength > 0.6 {
                traps.push(TrapEntry { strategy_id: spec.id.clone(), trap_score: failure_strength });
                Posture::Fade
            } else if spec.recommended_postures.contains(&Posture::Align) {
                dominance.push(DominanceEntry {
                    strategy_id: spec.id.clone(),
                    dominance_score: probability * (1.0 - failure_strength),
                });
                Posture::Align
            } else if spec.recommended_postures.contains(&Posture::Fade) && failure_strength > 0.3 {
                Posture::Fade
            } else {
                Posture::StandDown
            }
        } else {
            Posture::StandDown
        };

        if probability > 0.3 {
            active.push(ActiveStrategy {
                strategy_id: spec.id.clone(),
                probability,
                posture,
                strategy_class: spec.strategy_class,
            });
        }
    }

    dominance.sort_by(|a, b| b.dominance_score.partial_cmp(&a.dominance_score).unwrap());
    traps.sort_by(|a, b| b.trap_score.partial_cmp(&a.trap_score).unwrap());
    dominance.truncate(5);
    traps.truncate(5);

    StrategyState { active, dominance, traps }
}
