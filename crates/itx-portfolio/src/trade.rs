//! Trade Lifecycle Manager (§4.11): supervises the single currently open
//! trade from fill through exit. One instance is live at a time; a flat
//! account has none.

use itx_schemas::{Direction, Micros, TICK_SIZE, TICK_VALUE};
use itx_signals::{SignalId, SignalVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    EntryPending,
    Filled,
    Managing,
    ExitTriggered,
    Closing,
    Closed,
}

/// Why an in-progress trade's thesis broke. Template-specific: each variant
/// names the template whose invalidation rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TimeLimitExceeded,
    VwapReversalK1,
    RangeRecompressionK2,
    TrendReversalK4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickAction {
    Hold,
    Exit(ExitReason),
}

/// The thesis-invalidation rule a template carries, evaluated against the
/// current signal vector once a trade managed by it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationRule {
    /// K1: VWAP mean reversion. Long exits once price closes back above
    /// VWAP by more than the z threshold; short on the mirrored condition.
    VwapReversal,
    /// K2: breakout fade. Exits once the range re-compresses past the
    /// threshold, meaning the breakout never followed through.
    RangeRecompression,
    /// K4: trend continuation. Exits once HH/LL structure reverses against
    /// the trade's direction.
    TrendReversal,
    /// Templates with no thesis-invalidation rule of their own (stop/target
    /// handles the exit entirely).
    None,
}

const VWAP_Z_REVERSAL_THRESHOLD: f64 = 0.5;
const RANGE_RECOMPRESSION_THRESHOLD: f64 = 0.8;
const TREND_REVERSAL_THRESHOLD: f64 = 0.5;

/// A single open position under management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub entry_template: String,
    pub invalidation_rule: InvalidationRule,
    pub direction: Direction,
    pub qty: i64,
    pub entry_price: Micros,
    pub entry_time_utc: i64,
    pub max_time_minutes: i64,
    pub state: TradeState,
    pub filled_qty: i64,
    pub exit_price: Option<Micros>,
    pub realized_pnl: Option<Micros>,
}

impl Trade {
    pub fn new(
        trade_id: impl Into<String>,
        entry_template: impl Into<String>,
        invalidation_rule: InvalidationRule,
        direction: Direction,
        qty: i64,
        max_time_minutes: i64,
    ) -> Self {
        Self {
            trade_id: trade_id.into(),
            entry_template: entry_template.into(),
            invalidation_rule,
            direction,
            qty,
            entry_price: Micros::ZERO,
            entry_time_utc: 0,
            max_time_minutes,
            state: TradeState::EntryPending,
            filled_qty: 0,
            exit_price: None,
            realized_pnl: None,
        }
    }

    pub fn on_fill(&mut self, filled_qty: i64, filled_price: Micros, filled_time_utc: i64) {
        self.filled_qty = filled_qty;
        self.entry_price = filled_price;
        self.entry_time_utc = filled_time_utc;
        self.state = TradeState::Filled;
    }

    /// Evaluate exit conditions for one closed bar. Time limit is checked
    /// first: a trade that has both overstayed its limit and tripped its
    /// thesis rule on the same bar exits for the time-limit reason.
    pub fn tick(&mut self, now_utc: i64, signals: &SignalVector) -> TickAction {
        if !matches!(self.state, TradeState::Filled | TradeState::Managing) {
            return TickAction::Hold;
        }

        let minutes_in_trade = (now_utc - self.entry_time_utc) as f64 / 60.0;
        if minutes_in_trade > self.max_time_minutes as f64 {
            self.state = TradeState::ExitTriggered;
            return TickAction::Exit(ExitReason::TimeLimitExceeded);
        }

        if let Some(reason) = self.check_thesis_invalidation(signals) {
            self.state = TradeState::ExitTriggered;
            return TickAction::Exit(reason);
        }

        self.state = TradeState::Managing;
        TickAction::Hold
    }

    fn check_thesis_invalidation(&self, signals: &SignalVector) -> Option<ExitReason> {
        match self.invalidation_rule {
            InvalidationRule::VwapReversal => {
                let vwap_z = signals.get(SignalId::VwapZ);
                let reversed = match self.direction {
                    Direction::Long => vwap_z > VWAP_Z_REVERSAL_THRESHOLD,
                    Direction::Short => vwap_z < -VWAP_Z_REVERSAL_THRESHOLD,
                };
                reversed.then_some(ExitReason::VwapReversalK1)
            }
            InvalidationRule::RangeRecompression => {
                let compression = signals.get(SignalId::RangeCompression);
                (compression > RANGE_RECOMPRESSION_THRESHOLD).then_some(ExitReason::RangeRecompressionK2)
            }
            InvalidationRule::TrendReversal => {
                let trend = signals.get(SignalId::HhllTrendStrength);
                let reversed = match self.direction {
                    Direction::Long => trend < -TREND_REVERSAL_THRESHOLD,
                    Direction::Short => trend > TREND_REVERSAL_THRESHOLD,
                };
                reversed.then_some(ExitReason::TrendReversalK4)
            }
            InvalidationRule::None => None,
        }
    }

    /// Record the exit fill and compute realised PnL in tick terms:
    /// `ticks = (exit - entry) / tick_size` (negated for SHORT),
    /// `pnl = ticks * tick_value * filled_qty`.
    pub fn on_exit_filled(&mut self, exit_price: Micros, _exit_time_utc: i64) -> Micros {
        let raw_ticks = (exit_price.raw() - self.entry_price.raw()) as f64 / TICK_SIZE.raw() as f64;
        let signed_ticks = match self.direction {
            Direction::Long => raw_ticks,
            Direction::Short => -raw_ticks,
        };
        let pnl = Micros::new((signed_ticks * TICK_VALUE.raw() as f64 * self.filled_qty as f64).round() as i64);

        self.exit_price = Some(exit_price);
        self.realized_pnl = Some(pnl);
        self.state = TradeState::Closed;
        pnl
    }
}
