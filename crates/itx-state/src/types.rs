use chrono::{DateTime, Utc};
use itx_risk::SessionClock;
use itx_schemas::Micros;

/// Volatile risk counters plus the kill switch. Reset semantics are tied to
/// the exchange-local day boundary, not process restarts — see
/// [`StateStore::get_risk_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskState {
    pub kill_switch_active: bool,
    pub daily_pnl: Micros,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub last_entry_time: Option<DateTime<Utc>>,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            kill_switch_active: false,
            daily_pnl: Micros::ZERO,
            consecutive_losses: 0,
            trades_today: 0,
            last_entry_time: None,
        }
    }
}

/// In-memory risk/state store. Day-boundary rollover and the kill switch are
/// pure logic here; the caller (the Runner) owns reading the clock and
/// serialising this to the persistent journal on every decision/trade close.
#[derive(Debug, Clone)]
pub struct StateStore {
    risk_state: RiskState,
    current_day: Option<u32>,
    clock: SessionClock,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            risk_state: RiskState::default(),
            current_day: None,
            clock: SessionClock,
        }
    }

    /// Restore a store from a previously persisted state, skipping the
    /// rollover that would otherwise fire the first time `get_risk_state` is
    /// called after boot.
    pub fn from_persisted(risk_state: RiskState, current_day: Option<u32>) -> Self {
        Self {
            risk_state,
            current_day,
            clock: SessionClock,
        }
    }

    pub fn current_day(&self) -> Option<u32> {
        self.current_day
    }

    /// Returns the current risk state, rolling daily counters over to zero
    /// first if `now_utc`'s America/New_York calendar date differs from the
    /// stored `current_day`.
    pub fn get_risk_state(&mut self, now_utc: DateTime<Utc>) -> RiskState {
        let day = self.clock.day_id(now_utc);
        match self.current_day {
            None => self.current_day = Some(day),
            Some(stored) if stored != day => {
                self.current_day = Some(day);
                self.risk_state.trades_today = 0;
                self.risk_state.consecutive_losses = 0;
                self.risk_state.daily_pnl = Micros::ZERO;
            }
            Some(_) => {}
        }
        self.risk_state
    }

    pub fn record_entry(&mut self, entry_time_utc: DateTime<Utc>) {
        self.risk_state.trades_today += 1;
        self.risk_state.last_entry_time = Some(entry_time_utc);
    }

    pub fn record_exit(&mut self, pnl: Micros) {
        self.risk_state.daily_pnl += pnl;
        if pnl.is_negative() {
            self.risk_state.consecutive_losses += 1;
        } else {
            self.risk_state.consecutive_losses = 0;
        }
    }

    pub fn set_kill_switch(&mut self, active: bool) {
        self.risk_state.kill_switch_active = active;
    }

    /// Clears the per-trade entry marker and loss streak (used between
    /// sessions) but keeps `daily_pnl`/`trades_today`, which only reset at
    /// the day boundary.
    pub fn reset_session(&mut self) {
        self.risk_state.last_entry_time = None;
        self.risk_state.consecutive_losses = 0;
    }
}
