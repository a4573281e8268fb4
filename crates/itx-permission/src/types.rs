use itx_schemas::Direction;
use itx_signals::SignalId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateReason {
    DeadMarket,
    LiquidityVacuum,
    MixedRegimeWeakBias,
    BiasQualityInsufficient,
    BiasConflict,
    NoDominantStrategy,
    TrapsDominant,
}

impl GateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GateReason::DeadMarket => "dead_market",
            GateReason::LiquidityVacuum => "liquidity_vacuum",
            GateReason::MixedRegimeWeakBias => "mixed_regime_weak_bias",
            GateReason::BiasQualityInsufficient => "bias_quality_insufficient",
            GateReason::BiasConflict => "bias_conflict",
            GateReason::NoDominantStrategy => "no_dominant_strategy",
            GateReason::TrapsDominant => "traps_dominant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub allow_trade: bool,
    pub allowed_directions: Vec<Direction>,
    pub allowed_playbooks: Vec<String>,
    pub max_risk_units: f64,
    pub required_confirmation: Vec<SignalId>,
    pub stand_down_reason: Option<GateReason>,
}

impl Permission {
    pub fn denied(reason: GateReason) -> Self {
        Self {
            allow_trade: false,
            allowed_directions: vec![],
            allowed_playbooks: vec![],
            max_risk_units: 0.0,
            required_confirmation: vec![],
            stand_down_reason: Some(reason),
        }
    }
}

/// Session/calendar facts the threshold-modifier table keys off. Computed
/// upstream (the Runner, via its `SessionClock`) and passed in so this crate
/// stays free of timezone logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeContext {
    pub open_drive: bool,
    pub lunch_chop: bool,
    pub power_hour: bool,
    pub monday: bool,
    pub friday_late: bool,
}

/// Values for the threshold-modifier table (§4.7). Defaults match the
/// resolved table; override per contract document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdModifierConfig {
    pub open_drive: f64,
    pub lunch_chop: f64,
    pub power_hour: f64,
    pub monday: f64,
    pub friday_late: f64,
    pub vol_regime_high: f64,
    pub vol_regime_low: f64,
    pub range_expansion: f64,
    pub range_tight: f64,
    pub conflict_reversion_vs_trend: f64,
    pub conflict_breakout_vs_compression: f64,
    pub theta_min: f64,
    pub theta_max: f64,
}

impl Default for ThresholdModifierConfig {
    fn default() -> Self {
        Self {
            open_drive: 0.05,
            lunch_chop: 0.10,
            power_hour: -0.05,
            monday: 0.03,
            friday_late: 0.05,
            vol_regime_high: -0.05,
            vol_regime_low: 0.05,
            range_expansion: -0.03,
            range_tight: 0.03,
            conflict_reversion_vs_trend: 0.08,
            conflict_breakout_vs_compression: 0.06,
            theta_min: 0.3,
            theta_max: 0.9,
        }
    }
}
