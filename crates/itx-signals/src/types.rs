use itx_schemas::Bar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every signal id the engine computes. Deliberately a closed enum rather
/// than a string key: a typo in a signal name becomes a compile error
/// instead of a silent 0.0 downstream in the belief engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalId {
    VwapDistancePct,
    VwapZ,
    Atr14,
    Atr14N,
    RangeCompression,
    ImpulseStrength,
    SweepThenReject,
    AbsorptionProxy,
    LateEntryFlag,
    RoundNumberProximity,
    VolatilityExpansion,
    DeltaDivergence,
    FomoIndex,
    PanicIndex,
    AuctionEfficiency,
    HerdingScore,
    HhllTrendStrength,
}

impl SignalId {
    pub const ALL: [SignalId; 17] = [
        SignalId::VwapDistancePct,
        SignalId::VwapZ,
        SignalId::Atr14,
        SignalId::Atr14N,
        SignalId::RangeCompression,
        SignalId::ImpulseStrength,
        SignalId::SweepThenReject,
        SignalId::AbsorptionProxy,
        SignalId::LateEntryFlag,
        SignalId::RoundNumberProximity,
        SignalId::VolatilityExpansion,
        SignalId::DeltaDivergence,
        SignalId::FomoIndex,
        SignalId::PanicIndex,
        SignalId::AuctionEfficiency,
        SignalId::HerdingScore,
        SignalId::HhllTrendStrength,
    ];
}

/// Output of the signal engine for one closed bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalVector {
    values: BTreeMap<SignalId, f64>,
    /// True until `min_lookback` bars have been observed; callers that gate
    /// on signal values should treat a warmup vector as uninformative.
    pub warmup: bool,
}

impl SignalVector {
    pub fn new(warmup: bool) -> Self {
        Self {
            values: BTreeMap::new(),
            warmup,
        }
    }

    pub fn set(&mut self, id: SignalId, value: f64) {
        self.values.insert(id, value);
    }

    /// Missing signals contribute 0, per the belief engine's normalisation
    /// rule (`SPEC_FULL.md` §4.5): "missing signals contribute 0".
    pub fn get(&self, id: SignalId) -> f64 {
        self.values.get(&id).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalId, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }
}

/// Bounded rolling window of recently closed bars, used as the only history
/// the signal engine is allowed to consult. Recomputes derived statistics
/// from the retained bars rather than maintaining incremental accumulators,
/// which keeps every stat trivially reproducible from the window alone.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    max_len: usize,
    bars: Vec<Bar>,
    /// Count of consecutive bars (most recent first) that closed in the same
    /// direction as the latest bar. Tracked incrementally on push because it
    /// depends on bars that may fall outside `max_len`.
    consecutive_same_direction: u32,
}

impl RollingWindow {
    pub fn new(max_len: usize) -> Self {
        assert!(max_len > 0);
        Self {
            max_len,
            bars: Vec::new(),
            consecutive_same_direction: 0,
        }
    }

    pub fn push(&mut self, bar: Bar) {
        let this_dir = (bar.close.raw() - bar.open.raw()).signum();
        if let Some(prev) = self.bars.last() {
            let prev_dir = (prev.close.raw() - prev.open.raw()).signum();
            if this_dir != 0 && this_dir == prev_dir {
                self.consecutive_same_direction += 1;
            } else {
                self.consecutive_same_direction = 0;
            }
        }
        self.bars.push(bar);
        if self.bars.len() > self.max_len {
            let start = self.bars.len() - self.max_len;
            self.bars.drain(0..start);
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn consecutive_same_direction(&self) -> u32 {
        self.consecutive_same_direction
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Session VWAP over every bar currently retained in the window
    /// (typical price weighted by volume).
    pub fn vwap(&self) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for b in &self.bars {
            let typical = (b.high.raw() + b.low.raw() + b.close.raw()) as f64 / 3.0 / 1_000_000.0;
            num += typical * b.volume as f64;
            den += b.volume as f64;
        }
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }

    /// Rolling standard deviation of closes (population, not sample).
    pub fn close_std(&self) -> f64 {
        if self.bars.len() < 2 {
            return 0.0;
        }
        let closes: Vec<f64> = self.bars.iter().map(|b| b.close.raw() as f64 / 1_000_000.0).collect();
        let mean = closes.iter().sum::<f64>() / closes.len() as f64;
        let var = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / closes.len() as f64;
        var.sqrt()
    }

    pub fn avg_range(&self) -> f64 {
        if self.bars.is_empty() {
            return 0.0;
        }
        self.bars
            .iter()
            .map(|b| (b.high.raw() - b.low.raw()) as f64 / 1_000_000.0)
            .sum::<f64>()
            / self.bars.len() as f64
    }

    pub fn avg_volume(&self) -> f64 {
        if self.bars.is_empty() {
            return 0.0;
        }
        self.bars.iter().map(|b| b.volume as f64).sum::<f64>() / self.bars.len() as f64
    }

    /// True range average over the last `n` bars (or fewer if the window is
    /// shorter), using the simple (non-Wilder-smoothed) mean.
    pub fn atr(&self, n: usize) -> f64 {
        let tail_start = self.bars.len().saturating_sub(n);
        let tail = &self.bars[tail_start..];
        if tail.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for (i, b) in tail.iter().enumerate() {
            let range = (b.high.raw() - b.low.raw()) as f64 / 1_000_000.0;
            let tr = if i == 0 {
                range
            } else {
                let prev_close = tail[i - 1].close.raw() as f64 / 1_000_000.0;
                let high = b.high.raw() as f64 / 1_000_000.0;
                let low = b.low.raw() as f64 / 1_000_000.0;
                range.max((high - prev_close).abs()).max((low - prev_close).abs())
            };
            sum += tr;
        }
        sum / tail.len() as f64
    }

    /// Trend structure over the window: `+1` for every consecutive pair that
    /// makes both a higher high and a higher low, `-1` for both lower,
    /// `0` otherwise, averaged and clamped to `[-1, 1]`.
    pub fn hhll_trend_strength(&self) -> f64 {
        if self.bars.len() < 2 {
            return 0.0;
        }
        let mut total = 0.0;
        for pair in self.bars.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            if cur.high.raw() > prev.high.raw() && cur.low.raw() > prev.low.raw() {
                total += 1.0;
            } else if cur.high.raw() < prev.high.raw() && cur.low.raw() < prev.low.raw() {
                total -= 1.0;
            }
        }
        (total / (self.bars.len() - 1) as f64).clamp(-1.0, 1.0)
    }

    /// Prior bar's high/low, used for sweep-then-reject detection.
    pub fn prior_high_low(&self) -> Option<(f64, f64)> {
        self.bars
            .last()
            .map(|b| (b.high.raw() as f64 / 1_000_000.0, b.low.raw() as f64 / 1_000_000.0))
    }
}
