//! itx-portfolio
//!
//! Fill-driven ledger and the Trade Lifecycle Manager for the single
//! instrument this engine trades:
//! - Fill-driven ledger is the source of truth
//! - FIFO lot accounting
//! - Realized vs unrealized PnL
//! - Equity + exposure metrics
//! - Trade Lifecycle Manager: fill -> manage -> exit for the one open trade
//! - Pure deterministic logic (no IO, no time, no broker wiring)

mod accounting;
mod metrics;
mod ordering;
mod types;

pub mod ledger;
pub mod trade;

pub use accounting::{apply_entry, apply_fill, recompute_from_ledger};
pub use ledger::{Ledger, LedgerError, LedgerSnapshot};
pub use trade::{ExitReason, InvalidationRule, TickAction, Trade, TradeState};

pub use metrics::{
    compute_equity_micros, compute_exposure_micros, compute_unrealized_pnl_micros,
    enforce_max_gross_exposure, EquityMetrics, ExposureBreach, ExposureMetrics,
};

// R3-2: canonical fill ordering policy
pub use ordering::{apply_fills_canonical, sort_fills_canonical, TaggedFill};

pub use types::{CashEntry, Fill, LedgerEntry, Lot, PortfolioState, PositionState, Side};

use std::collections::BTreeMap;

/// Price/cash scale: micros (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;

/// Canonical mark map type (symbol -> price_micros).
pub type MarkMap = BTreeMap<String, i64>;

/// Helper to build a MarkMap with minimal boilerplate.
pub fn marks<I, S>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<String>,
{
    let mut m = MarkMap::new();
    for (sym, px) in items {
        m.insert(sym.into(), px);
    }
    m
}
