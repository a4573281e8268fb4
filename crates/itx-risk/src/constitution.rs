//! Constitutional Filter (§4.9): the last deterministic gate an order intent
//! passes through before it reaches the broker. Evaluated in declared order;
//! the first failing gate rejects with its reason and nothing downstream is
//! consulted.

use chrono::NaiveTime;
use itx_schemas::EntryType;
use serde::{Deserialize, Serialize};

/// 1e-6 fixed-point scale, matching `itx_schemas::Micros`.
const MICROS_SCALE: i64 = 1_000_000;

/// Thresholds the filter enforces. Defaults match the instrument's session
/// contract for the single micro E-mini contract this engine trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstitutionConfig {
    pub max_daily_loss_micros: i64,
    pub max_consecutive_losses: u32,
    pub max_trades_per_day: u32,
    pub max_position: i64,
    pub dvs_min_for_entry: f64,
    pub eqs_min_for_entry: f64,
    /// ET wall-clock time at or after which no new risk is accepted.
    pub flatten_deadline: NaiveTime,
    /// `[start, end)` ET wall-clock windows during which no new risk is accepted.
    pub no_trade_windows: Vec<(NaiveTime, NaiveTime)>,
}

impl Default for ConstitutionConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_micros: 30 * MICROS_SCALE,
            max_consecutive_losses: 2,
            max_trades_per_day: 2,
            max_position: 1,
            dvs_min_for_entry: 0.80,
            eqs_min_for_entry: 0.75,
            flatten_deadline: NaiveTime::from_hms_opt(15, 55, 0).unwrap(),
            no_trade_windows: vec![
                (
                    NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                    NaiveTime::from_hms_opt(9, 35, 0).unwrap(),
                ),
                (
                    NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
                    NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
                ),
                (
                    NaiveTime::from_hms_opt(15, 55, 0).unwrap(),
                    NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                ),
            ],
        }
    }
}

/// Running risk counters the filter is evaluated against. Owned and persisted
/// by the state store; this crate only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstitutionalState {
    pub daily_pnl_micros: i64,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub current_position: i64,
    pub current_dvs: f64,
    pub current_eqs: f64,
    pub kill_switch_active: bool,
}

impl Default for ConstitutionalState {
    fn default() -> Self {
        Self {
            daily_pnl_micros: 0,
            consecutive_losses: 0,
            trades_today: 0,
            current_position: 0,
            current_dvs: 1.0,
            current_eqs: 1.0,
            kill_switch_active: false,
        }
    }
}

/// The order intent the filter is evaluated against. `qty` is signed relative
/// to `current_position`'s sign convention (a short add is negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub qty: i64,
    pub entry_type: EntryType,
    pub has_stop: bool,
    pub has_target: bool,
}

/// Reject reasons, in the exact order their gates are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    DailyLossExceeded,
    ConsecutiveLossPause,
    MaxTradesReached,
    MaxPositionExceeded,
    PastFlattenDeadline,
    NoTradeWindow,
    DvsTooLow,
    EqsTooLow,
    KillSwitchActive,
    NoMarketEntries,
    BracketRequired,
}

impl RejectReason {
    pub fn as_code(self) -> &'static str {
        match self {
            RejectReason::DailyLossExceeded => "daily_loss_exceeded",
            RejectReason::ConsecutiveLossPause => "consecutive_loss_pause",
            RejectReason::MaxTradesReached => "max_trades_reached",
            RejectReason::MaxPositionExceeded => "max_position_exceeded",
            RejectReason::PastFlattenDeadline => "past_flatten_deadline",
            RejectReason::NoTradeWindow => "no_trade_window",
            RejectReason::DvsTooLow => "dvs_too_low",
            RejectReason::EqsTooLow => "eqs_too_low",
            RejectReason::KillSwitchActive => "kill_switch_active",
            RejectReason::NoMarketEntries => "no_market_entries",
            RejectReason::BracketRequired => "bracket_required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterDecision {
    Allow,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn as_code(self) -> &'static str {
        match self {
            FilterDecision::Allow => "passed_all_checks",
            FilterDecision::Reject(r) => r.as_code(),
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, FilterDecision::Allow)
    }
}

fn in_window(now_et: NaiveTime, windows: &[(NaiveTime, NaiveTime)]) -> bool {
    windows.iter().any(|&(start, end)| now_et >= start && now_et < end)
}

/// Evaluate an order intent against the constitution. `now_et` is the
/// instrument-local (America/New_York) wall-clock time of the decision,
/// computed upstream by [`crate::session::SessionClock`] so this function
/// stays pure and synchronous.
pub fn evaluate_order_intent(
    cfg: &ConstitutionConfig,
    state: &ConstitutionalState,
    intent: &OrderIntent,
    now_et: NaiveTime,
) -> FilterDecision {
    if state.daily_pnl_micros <= -cfg.max_daily_loss_micros {
        return FilterDecision::Reject(RejectReason::DailyLossExceeded);
    }
    if state.consecutive_losses >= cfg.max_consecutive_losses {
        return FilterDecision::Reject(RejectReason::ConsecutiveLossPause);
    }
    if state.trades_today >= cfg.max_trades_per_day {
        return FilterDecision::Reject(RejectReason::MaxTradesReached);
    }
    if state.current_position + intent.qty > cfg.max_position {
        return FilterDecision::Reject(RejectReason::MaxPositionExceeded);
    }
    if now_et >= cfg.flatten_deadline {
        return FilterDecision::Reject(RejectReason::PastFlattenDeadline);
    }
    if in_window(now_et, &cfg.no_trade_windows) {
        return FilterDecision::Reject(RejectReason::NoTradeWindow);
    }
    if state.current_dvs < cfg.dvs_min_for_entry {
        return FilterDecision::Reject(RejectReason::DvsTooLow);
    }
    if state.current_eqs < cfg.eqs_min_for_entry {
        return FilterDecision::Reject(RejectReason::EqsTooLow);
    }
    if state.kill_switch_active {
        return FilterDecision::Reject(RejectReason::KillSwitchActive);
    }
    // `EntryType` has no MARKET variant (see itx-schemas), so this gate can
    // never fire through this crate's own constructors. It stays in the
    // match below so the reject code still exists for intents arriving from
    // outside the type system's reach (e.g. a malformed replay).
    match intent.entry_type {
        EntryType::Limit | EntryType::StopLimit => {}
    }
    if !intent.has_stop || !intent.has_target {
        return FilterDecision::Reject(RejectReason::BracketRequired);
    }

    FilterDecision::Allow
}
