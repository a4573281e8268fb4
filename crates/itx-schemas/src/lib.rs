//! Shared wire/domain primitives used across the engine.
//!
//! Kept deliberately leaf-level: this crate has no dependency on any other
//! workspace crate. Anything that would pull in a domain engine (signals,
//! beliefs, biases, orders) belongs one layer up.

mod fixedpoint;

pub use fixedpoint::Micros;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum price increment for the micro E-mini equity index contract this
/// engine trades, in index points.
pub const TICK_SIZE: Micros = Micros::new(250_000); // 0.25

/// Dollar value of one tick per contract.
pub const TICK_VALUE: Micros = Micros::new(1_250_000); // $1.25

/// Generic envelope every persisted event is wrapped in before hashing.
/// `T` is filled in by the crate that owns the concrete payload sum type
/// (see `itx-runtime::events::EventPayload`); this crate never names it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub stream_id: String,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub config_hash: String,
    pub payload: T,
}

/// Trade direction. No `Flat` variant: flatness is the absence of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Entry order type. MARKET is intentionally not a variant: the constitutional
/// filter's `no_market_entries` gate has nothing to check against if the type
/// system already forbids it, so the rejection reason exists for intents that
/// arrive from outside this crate's constructors (e.g. a malformed replay).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Limit,
    StopLimit,
}

/// Bracket child role. Exactly these two; a parent is never FILLED without
/// both present (see `itx-execution`'s P7 bracket invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ChildType {
    Stop,
    Target,
}

/// A closed one-minute OHLCV observation. Prices are tick-aligned `Micros`;
/// volume is a plain share/contract count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub end_ts: i64,
    pub open: Micros,
    pub high: Micros,
    pub low: Micros,
    pub close: Micros,
    pub volume: i64,
    pub bid: Option<Micros>,
    pub ask: Option<Micros>,
}

/// Why a bar was refused admission (§3 Data Model sanity rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarError {
    NonMonotonicTimestamp { prev_end_ts: i64, got_end_ts: i64 },
    NegativeVolume,
    HighBelowMax,
    LowAboveMin,
}

impl std::fmt::Display for BarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarError::NonMonotonicTimestamp {
                prev_end_ts,
                got_end_ts,
            } => write!(
                f,
                "bar end_ts {got_end_ts} is not after previous end_ts {prev_end_ts}"
            ),
            BarError::NegativeVolume => write!(f, "bar volume is negative"),
            BarError::HighBelowMax => write!(f, "bar high is below max(open, close)"),
            BarError::LowAboveMin => write!(f, "bar low is above min(open, close)"),
        }
    }
}

impl std::error::Error for BarError {}

impl Bar {
    /// Sanity-check this bar in isolation plus against the previous bar's
    /// `end_ts`, if any. `prev_end_ts = None` is only valid for the first bar
    /// of a stream.
    pub fn validate(&self, prev_end_ts: Option<i64>) -> Result<(), BarError> {
        if let Some(prev) = prev_end_ts {
            if self.end_ts <= prev {
                return Err(BarError::NonMonotonicTimestamp {
                    prev_end_ts: prev,
                    got_end_ts: self.end_ts,
                });
            }
        }
        if self.volume < 0 {
            return Err(BarError::NegativeVolume);
        }
        let hi_oc = self.open.raw().max(self.close.raw());
        let lo_oc = self.open.raw().min(self.close.raw());
        if self.high.raw() < hi_oc {
            return Err(BarError::HighBelowMax);
        }
        if self.low.raw() > lo_oc {
            return Err(BarError::LowAboveMin);
        }
        Ok(())
    }
}
