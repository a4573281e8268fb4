//! State Store: volatile risk counters plus kill switch, and the persistent
//! JSON journal that survives process restarts.
//!
//! Day-boundary rollover and the Constitutional Filter's no-trade-window
//! checks share one timezone source (`itx_risk::SessionClock`, America/New
//! York) rather than each parsing time independently.

mod persistence;
mod types;

pub use persistence::{load_journal, save_journal, PersistedRiskState, PersistedState};
pub use types::{RiskState, StateStore};
