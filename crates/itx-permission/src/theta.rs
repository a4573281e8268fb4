use crate::types::{ThresholdModifierConfig, TimeContext};
use itx_bias::{BiasSpec, BiasState, BiasPolarity, VolRegime};

/// `theta_effective = clamp(theta_base + sum(modifiers), theta_min, theta_max)`.
/// Every modifier whose condition holds applies; they are additive and
/// independent (§4.7).
pub fn compute_theta_effective(
    theta_base: f64,
    time: &TimeContext,
    vol_regime: VolRegime,
    range_compression: f64,
    bias_state: &BiasState,
    registry: &[BiasSpec],
    cfg: &ThresholdModifierConfig,
) -> f64 {
    let mut theta = theta_base;

    if time.open_drive {
        theta += cfg.open_drive;
    }
    if time.lunch_chop {
        theta += cfg.lunch_chop;
    }
    if time.power_hour {
        theta += cfg.power_hour;
    }
    if time.monday {
        theta += cfg.monday;
    }
    if time.friday_late {
        theta += cfg.friday_late;
    }

    match vol_regime {
        VolRegime::High => theta += cfg.vol_regime_high,
        VolRegime::Low => theta += cfg.vol_regime_low,
        VolRegime::Normal => {}
    }

    if range_compression < 0.5 {
        theta += cfg.range_expansion;
    } else if range_compression > 1.5 {
        theta += cfg.range_tight;
    }

    let reversion_strength = strongest_active(bias_state, registry, BiasPolarity::Reversion);
    let trend_strength = strongest_active(bias_state, registry, BiasPolarity::Trend);
    if reversion_strength > 0.5 && trend_strength > 0.5 {
        theta += cfg.conflict_reversion_vs_trend;
    }

    let breakout_active = strongest_active(bias_state, registry, BiasPolarity::Breakout) > 0.0;
    if breakout_active && range_compression > 0.8 {
        theta += cfg.conflict_breakout_vs_compression;
    }

    theta.clamp(cfg.theta_min, cfg.theta_max)
}

fn strongest_active(bias_state: &BiasState, registry: &[BiasSpec], polarity: BiasPolarity) -> f64 {
    bias_state
        .active
        .iter()
        .filter(|b| registry.iter().any(|s| s.id == b.bias_id && s.polarity == polarity))
        .map(|b| b.strength)
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itx_bias::{BiasCategory, CapitalTier, DetectorKind, RegimeTag, ScoringKind, TrendRegime, LiquidityRegime, Regime};
    use itx_signals::SignalId;

    fn bias(id: &str, polarity: BiasPolarity) -> BiasSpec {
        BiasSpec {
            id: id.into(),
            category: BiasCategory::Technical,
            polarity,
            detectors: vec![DetectorKind::SignalAbove(SignalId::ImpulseStrength, 0.0)],
            strength_fn: ScoringKind::Mean,
            confidence_fn: ScoringKind::Mean,
            regime_tags: vec![RegimeTag::Trend],
            conflicts_with: vec![],
            supports: vec![],
            capital_tier_min: CapitalTier::S,
        }
    }

    #[test]
    fn no_modifiers_returns_base() {
        let cfg = ThresholdModifierConfig::default();
        let time = TimeContext::default();
        let bias_state = BiasState {
            active: vec![],
            regime: Regime { vol_regime: VolRegime::Normal, trend_regime: TrendRegime::Mixed, liquidity_regime: LiquidityRegime::Normal },
            conflicts: vec![],
        };
        let theta = compute_theta_effective(0.6, &time, VolRegime::Normal, 1.0, &bias_state, &[], &cfg);
        assert_eq!(theta, 0.6);
    }

    #[test]
    fn open_drive_and_high_vol_combine_additively() {
        let cfg = ThresholdModifierConfig::default();
        let time = TimeContext { open_drive: true, ..Default::default() };
        let bias_state = BiasState {
            active: vec![],
            regime: Regime { vol_regime: VolRegime::High, trend_regime: TrendRegime::Mixed, liquidity_regime: LiquidityRegime::Normal },
            conflicts: vec![],
        };
        let theta = compute_theta_effective(0.6, &time, VolRegime::High, 1.0, &bias_state, &[], &cfg);
        assert!((theta - (0.6 + 0.05 - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn clamps_to_configured_bounds() {
        let cfg = ThresholdModifierConfig::default();
        let time = TimeContext { open_drive: true, lunch_chop: true, monday: true, friday_late: true, ..Default::default() };
        let bias_state = BiasState {
            active: vec![],
            regime: Regime { vol_regime: VolRegime::Low, trend_regime: TrendRegime::Mixed, liquidity_regime: LiquidityRegime::Normal },
            conflicts: vec![],
        };
        let theta = compute_theta_effective(0.85, &time, VolRegime::Low, 2.0, &bias_state, &[], &cfg);
        assert_eq!(theta, cfg.theta_max);
    }

    #[test]
    fn reversion_vs_trend_conflict_applies_when_both_strong() {
        let cfg = ThresholdModifierConfig::default();
        let time = TimeContext::default();
        let registry = vec![bias("REV", BiasPolarity::Reversion), bias("TRD", BiasPolarity::Trend)];
        let bias_state = BiasState {
            active: vec![
                itx_bias::ActiveBias { bias_id: "REV".into(), strength: 0.8, confidence: 0.8, category: BiasCategory::Technical },
                itx_bias::ActiveBias { bias_id: "TRD".into(), strength: 0.8, confidence: 0.8, category: BiasCategory::Technical },
            ],
            regime: Regime { vol_regime: VolRegime::Normal, trend_regime: TrendRegime::Mixed, liquidity_regime: LiquidityRegime::Normal },
            conflicts: vec![],
        };
        let theta = compute_theta_effective(0.6, &time, VolRegime::Normal, 1.0, &bias_state, &registry, &cfg);
        assert!((theta - (0.6 + 0.08)).abs() < 1e-9);
    }
}
