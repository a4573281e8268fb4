use crate::types::{GateReason, Permission};
use itx_bias::{ActiveBias, BiasPolarity, BiasSpec, BiasState, LiquidityRegime, StrategySpec, StrategyState, TrendRegime, VolRegime};
use itx_schemas::Direction;
use itx_signals::SignalId;
use std::collections::HashSet;

/// Evaluate the five ordered permission gates (§4.7). The first failure
/// short-circuits with its reason; on full pass, derives allowed directions,
/// eligible playbooks, max risk units, and required confirmation signals.
pub fn evaluate_permission(
    bias_state: &BiasState,
    bias_registry: &[BiasSpec],
    strategy_state: &StrategyState,
    strategy_registry: &[StrategySpec],
    trend_direction: Option<Direction>,
) -> Permission {
    let dead_market = bias_state.regime.vol_regime == VolRegime::Low
        && bias_state.regime.liquidity_regime == LiquidityRegime::Thin;
    if dead_market {
        return Permission::denied(GateReason::DeadMarket);
    }

    let liquidity_vacuum = bias_state.regime.liquidity_regime == LiquidityRegime::Thin
        && bias_state.regime.vol_regime == VolRegime::High;
    if liquidity_vacuum {
        return Permission::denied(GateReason::LiquidityVacuum);
    }

    if bias_state.regime.trend_regime == TrendRegime::Mixed {
        let strong_biases = bias_state.active.iter().filter(|b| b.strength > 0.6).count();
        if strong_biases < 2 {
            return Permission::denied(GateReason::MixedRegimeWeakBias);
        }
    }

    let has_quality_bias = bias_state.active.iter().any(|b| b.strength >= 0.4 && b.confidence >= 0.6);
    if !has_quality_bias {
        return Permission::denied(GateReason::BiasQualityInsufficient);
    }

    if bias_state.conflicts.iter().any(|c| c.severity >= 0.5) {
        return Permission::denied(GateReason::BiasConflict);
    }

    if !strategy_state.dominance.iter().any(|d| d.dominance_score >= 0.4) {
        return Permission::denied(GateReason::NoDominantStrategy);
    }

    if strategy_state.traps.len() > strategy_state.dominance.len() {
        return Permission::denied(GateReason::TrapsDominant);
    }

    let mean_confidence = mean(bias_state.active.iter().map(|b| b.confidence).collect::<Vec<_>>().as_slice());
    let top_dominance = strategy_state
        .dominance
        .iter()
        .map(|d| d.dominance_score)
        .fold(0.0_f64, f64::max);
    let max_risk_units = (0.6 * mean_confidence + 0.4 * top_dominance).clamp(0.5, 1.0);

    Permission {
        allow_trade: true,
        allowed_directions: allowed_directions(bias_state, bias_registry, trend_direction),
        allowed_playbooks: allowed_playbooks(bias_state, strategy_registry),
        max_risk_units,
        required_confirmation: required_confirmation(bias_state, bias_registry),
        stand_down_reason: None,
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn active_polarities(bias_state: &BiasState, registry: &[BiasSpec]) -> HashSet<BiasPolarity> {
    bias_state
        .active
        .iter()
        .filter_map(|b: &ActiveBias| registry.iter().find(|s| s.id == b.bias_id).map(|s| s.polarity))
        .collect()
}

fn allowed_directions(bias_state: &BiasState, registry: &[BiasSpec], trend_direction: Option<Direction>) -> Vec<Direction> {
    let polarities = active_polarities(bias_state, registry);
    let mut dirs: HashSet<Direction> = HashSet::new();

    if let Some(trend) = trend_direction {
        if polarities.contains(&BiasPolarity::Reversion) {
            dirs.insert(trend.opposite());
        }
        if polarities.contains(&BiasPolarity::Trend) || polarities.contains(&BiasPolarity::Breakout) {
            dirs.insert(trend);
        }
    }

    if dirs.is_empty() {
        // No directional thesis contradicts either side; permit both rather
        // than silently blocking every direction.
        vec![Direction::Long, Direction::Short]
    } else {
        let mut v: Vec<Direction> = dirs.into_iter().collect();
        v.sort_by_key(|d| matches!(d, Direction::Short));
        v
    }
}

fn allowed_playbooks(bias_state: &BiasState, strategy_registry: &[StrategySpec]) -> Vec<String> {
    let active_ids: HashSet<&str> = bias_state.active.iter().map(|b| b.bias_id.as_str()).collect();
    strategy_registry
        .iter()
        .filter(|s| s.bias_dependencies.iter().all(|dep| active_ids.contains(dep.as_str())))
        .map(|s| s.id.clone())
        .collect()
}

fn required_confirmation(bias_state: &BiasState, registry: &[BiasSpec]) -> Vec<SignalId> {
    let polarities = active_polarities(bias_state, registry);
    let mut out = Vec::new();
    if polarities.contains(&BiasPolarity::Reversion) {
        out.push(SignalId::VwapZ);
    }
    if polarities.contains(&BiasPolarity::Trend) {
        out.push(SignalId::ImpulseStrength);
    }
    if polarities.contains(&BiasPolarity::Breakout) {
        out.push(SignalId::VolatilityExpansion);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use itx_bias::{BiasCategory, CapitalTier, Conflict, DetectorKind, DominanceEntry, Regime, RegimeTag, ScoringKind, TrapEntry};

    fn base_registry() -> Vec<BiasSpec> {
        vec![BiasSpec {
            id: "REV".into(),
            category: BiasCategory::Structural,
            polarity: BiasPolarity::Reversion,
            detectors: vec![DetectorKind::SignalAbove(SignalId::ImpulseStrength, 0.0)],
            strength_fn: ScoringKind::Mean,
            confidence_fn: ScoringKind::Mean,
            regime_tags: vec![RegimeTag::Range],
            conflicts_with: vec![],
            supports: vec![],
            capital_tier_min: CapitalTier::S,
        }]
    }

    fn passing_bias_state() -> BiasState {
        BiasState {
            active: vec![ActiveBias { bias_id: "REV".into(), strength: 0.6, confidence: 0.7, category: BiasCategory::Structural }],
            regime: Regime { vol_regime: VolRegime::Normal, trend_regime: TrendRegime::Ranging, liquidity_regime: LiquidityRegime::Normal },
            conflicts: vec![],
        }
    }

    fn passing_strategy_state() -> StrategyState {
        StrategyState {
            active: vec![],
            dominance: vec![DominanceEntry { strategy_id: "K1".into(), dominance_score: 0.6 }],
            traps: vec![],
        }
    }

    #[test]
    fn dead_market_denies_first() {
        let mut bias_state = passing_bias_state();
        bias_state.regime.vol_regime = VolRegime::Low;
        bias_state.regime.liquidity_regime = LiquidityRegime::Thin;
        let perm = evaluate_permission(&bias_state, &base_registry(), &passing_strategy_state(), &[], None);
        assert_eq!(perm.stand_down_reason, Some(GateReason::DeadMarket));
    }

    #[test]
    fn traps_dominant_denies_when_more_traps_than_dominant() {
        let bias_state = passing_bias_state();
        let strategy_state = StrategyState {
            active: vec![],
            dominance: vec![DominanceEntry { strategy_id: "K1".into(), dominance_score: 0.6 }],
            traps: vec![
                TrapEntry { strategy_id: "K2".into(), trap_score: 0.7 },
                TrapEntry { strategy_id: "K3".into(), trap_score: 0.8 },
            ],
        };
        let perm = evaluate_permission(&bias_state, &base_registry(), &strategy_state, &[], None);
        assert_eq!(perm.stand_down_reason, Some(GateReason::TrapsDominant));
    }

    #[test]
    fn full_pass_allows_trade_and_derives_directions() {
        let bias_state = passing_bias_state();
        let perm = evaluate_permission(
            &bias_state,
            &base_registry(),
            &passing_strategy_state(),
            &[],
            Some(Direction::Long),
        );
        assert!(perm.allow_trade);
        assert_eq!(perm.allowed_directions, vec![Direction::Short]);
        assert!(perm.max_risk_units >= 0.5 && perm.max_risk_units <= 1.0);
    }

    #[test]
    fn bias_conflict_severity_above_threshold_denies() {
        let mut bias_state = passing_bias_state();
        bias_state.conflicts.push(Conflict { a: "REV".into(), b: "TRD".into(), severity: 0.9 });
        let perm = evaluate_permission(&bias_state, &base_registry(), &passing_strategy_state(), &[], None);
        assert_eq!(perm.stand_down_reason, Some(GateReason::BiasConflict));
    }
}
