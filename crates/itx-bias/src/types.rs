use itx_signals::SignalId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiasCategory {
    Structural,
    Liquidity,
    Time,
    Volatility,
    Psychological,
    Institutional,
    Information,
    Technical,
    Meta,
    Existential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyClass {
    Trend,
    MeanReversion,
    Breakout,
    Range,
    Liquidity,
    Orderflow,
    Volatility,
    TimeBased,
    Event,
    Pattern,
    Statistical,
    Scalping,
    Position,
    Options,
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapitalTier {
    S,
    A,
    B,
}

/// Direction a bias argues for once active, used downstream by the
/// permission layer to derive `Permission.allowed_directions` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiasPolarity {
    /// Argues for the direction opposite the prevailing short-term move.
    Reversion,
    /// Argues for continuation of the prevailing move.
    Trend,
    Breakout,
    Neutral,
}

/// Regime tags a bias contributes toward `classify_regime`, replacing the
/// source's bias-id substring matching (`"TREND" in bias_id`) with a closed
/// set configured directly on the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeTag {
    VolatilityExpansion,
    LiquidityVacuum,
    DeadMarket,
    MarketSilence,
    Trend,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Posture {
    Align,
    Fade,
    StandDown,
}

/// A single detector: a named, parameterised test against the signal
/// vector. Replaces the source's dynamic `detector_id -> callable` lookup
/// with a closed, exhaustively-matched enum (§4.6 DESIGN NOTES).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectorKind {
    SignalAbove(SignalId, f64),
    SignalBelow(SignalId, f64),
    SignalAbsAbove(SignalId, f64),
    SignalInRange(SignalId, f64, f64),
}

/// How detector scores combine into a strength/confidence value. Replaces
/// the source's `strength_fn`/`confidence_fn` dotted-path lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScoringKind {
    Mean,
    Max,
    Min,
    /// Mean of detector scores, scaled by an auxiliary signal's value.
    MeanScaledBySignal(SignalId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasSpec {
    pub id: String,
    pub category: BiasCategory,
    pub polarity: BiasPolarity,
    pub detectors: Vec<DetectorKind>,
    pub strength_fn: ScoringKind,
    pub confidence_fn: ScoringKind,
    pub regime_tags: Vec<RegimeTag>,
    pub conflicts_with: Vec<String>,
    pub supports: Vec<String>,
    pub capital_tier_min: CapitalTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySpec {
    pub id: String,
    pub strategy_class: StrategyClass,
    pub bias_dependencies: Vec<String>,
    pub signature_detectors: Vec<DetectorKind>,
    pub failure_signatures: Vec<DetectorKind>,
    pub recommended_postures: Vec<Posture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBias {
    pub bias_id: String,
    pub strength: f64,
    pub confidence: f64,
    pub category: BiasCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolRegime {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendRegime {
    Trending,
    Ranging,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityRegime {
    Thin,
    Normal,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub vol_regime: VolRegime,
    pub trend_regime: TrendRegime,
    pub liquidity_regime: LiquidityRegime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub a: String,
    pub b: String,
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasState {
    pub active: Vec<ActiveBias>,
    pub regime: Regime,
    pub conflicts: Vec<Conflict>,
}

impl BiasState {
    pub fn is_active(&self, bias_id: &str) -> bool {
        self.active.iter().any(|b| b.bias_id == bias_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveStrategy {
    pub strategy_id: String,
    pub probability: f64,
    pub posture: Posture,
    pub strategy_class: StrategyClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominanceEntry {
    pub strategy_id: String,
    pub dominance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapEntry {
    pub strategy_id: String,
    pub trap_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub active: Vec<ActiveStrategy>,
    pub dominance: Vec<DominanceEntry>,
    pub traps: Vec<TrapEntry>,
}
