use itx_schemas::{Direction, EntryType};
use itx_signals::SignalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a template's trade direction is resolved at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DirectionRule {
    /// Always trades the same side (e.g. a dedicated long-only breakout template).
    Fixed(Direction),
    /// Long when the named signal is non-negative, short otherwise — used by
    /// templates whose side follows the market context (e.g. VWAP reversion
    /// trades back toward VWAP from whichever side price deviated to).
    SignalSign(SignalId),
}

/// Static registry definition of a tradeable strategy template (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub id: String,
    pub direction_rule: DirectionRule,
    pub entry_type: EntryType,
    /// Bias ids this template requires active; re-checked here even though
    /// the permission layer already filtered `allowed_playbooks` on the same
    /// condition, since the Selector is the authoritative eligibility check.
    pub bias_dependencies: Vec<String>,
    pub belief_ids: Vec<String>,
    pub confirmation_signal_ids: Vec<SignalId>,
    pub confirmation_thresholds: BTreeMap<SignalId, f64>,
}

impl StrategyTemplate {
    pub fn resolve_direction(&self, signals: &itx_signals::SignalVector) -> Direction {
        match self.direction_rule {
            DirectionRule::Fixed(d) => d,
            DirectionRule::SignalSign(id) => {
                if signals.get(id) >= 0.0 {
                    Direction::Long
                } else {
                    Direction::Short
                }
            }
        }
    }
}
