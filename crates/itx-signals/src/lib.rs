mod functions;
pub mod quality;
mod types;

pub use types::{RollingWindow, SignalId, SignalVector};

use itx_schemas::Bar;

/// Bars required in `window` before signals stop reporting neutral warmup
/// values. Chosen to cover the longest lookback a single signal needs (ATR14).
pub const MIN_LOOKBACK: usize = 14;

fn m2f(v: itx_schemas::Micros) -> f64 {
    v.raw() as f64 / 1_000_000.0
}

/// Compute the full signal vector for a newly closed bar.
///
/// `window` must reflect history *up to but not including* `bar` — call
/// `window.push(bar)` after this returns, not before. Below `MIN_LOOKBACK`
/// bars of history, every signal is neutral (0.0, or 0.5 for
/// `auction_efficiency`) and `warmup` is `true`.
pub fn compute_signal_vector(bar: &Bar, window: &RollingWindow) -> SignalVector {
    if window.len() < MIN_LOOKBACK {
        let mut v = SignalVector::new(true);
        v.set(SignalId::AuctionEfficiency, 0.5);
        return v;
    }

    let mut v = SignalVector::new(false);

    let close = m2f(bar.close);
    let open = m2f(bar.open);
    let high = m2f(bar.high);
    let low = m2f(bar.low);
    let range = high - low;

    let atr14 = window.atr(14);
    let atr_long = window.atr(window.len());
    let avg_range = window.avg_range();
    let avg_volume = window.avg_volume();
    let vwap = window.vwap();
    let close_std = window.close_std();

    let vwap_distance_pct = if vwap != 0.0 { (close - vwap) / vwap } else { 0.0 };
    let vwap_z = if close_std != 0.0 {
        (close - vwap) / close_std
    } else {
        0.0
    };
    let atr_14_n = if atr_long != 0.0 { atr14 / atr_long } else { 0.0 };
    let range_compression = if avg_range != 0.0 { range / avg_range } else { 0.0 };

    let impulse = functions::impulse_strength(close, open, high, low, Some(atr14));
    let (prev_high, prev_low) = window.prior_high_low().unzip();
    let sweep = functions::sweep_then_reject(high, low, close, prev_high, prev_low, 2.0 / 4.0);
    let absorption = functions::absorption_proxy(bar.volume, range, avg_volume, avg_range);

    let prev_close = window.last().map(|b| m2f(b.close)).unwrap_or(close);
    let price_change = close - prev_close;
    let volume_change = window
        .last()
        .map(|b| bar.volume as f64 - b.volume as f64)
        .unwrap_or(0.0);

    let vol_expansion = functions::volatility_expansion(atr14, atr_long, 1.5);
    let divergence = functions::delta_divergence(price_change, volume_change, 0.3);

    // Late-entry / price-extension inputs come from an active trade's entry
    // and target levels in the source; outside a trade, the signal engine
    // has no entry/target to measure against, so it substitutes the
    // session's rolling range as the "expected move" — proximity to the
    // edge of recent range stands in for "late in the move".
    let price_extension = functions::late_entry_flag(close, vwap, vwap + avg_range.max(1e-9));
    let round_proximity = functions::round_number_proximity(close, None);
    let volume_surge = if avg_volume != 0.0 {
        (bar.volume as f64 / avg_volume - 1.0).max(0.0).min(1.0)
    } else {
        0.0
    };
    let fomo = functions::fomo_index(impulse.max(0.0), volume_surge, price_extension);
    let panic = functions::panic_index(vol_expansion, absorption, impulse);
    let auction_eff = functions::auction_efficiency(close, vwap, bar.volume, avg_volume);

    let volume_trend = if avg_volume != 0.0 {
        ((bar.volume as f64 - avg_volume) / avg_volume).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let impulse_consistency = impulse.abs();
    let herding = functions::herding_score(window.consecutive_same_direction(), volume_trend, impulse_consistency);

    v.set(SignalId::VwapDistancePct, vwap_distance_pct);
    v.set(SignalId::VwapZ, vwap_z);
    v.set(SignalId::Atr14, atr14);
    v.set(SignalId::Atr14N, atr_14_n);
    v.set(SignalId::RangeCompression, range_compression);
    v.set(SignalId::ImpulseStrength, impulse);
    v.set(SignalId::SweepThenReject, sweep);
    v.set(SignalId::AbsorptionProxy, absorption);
    v.set(SignalId::LateEntryFlag, price_extension);
    v.set(SignalId::RoundNumberProximity, round_proximity);
    v.set(SignalId::VolatilityExpansion, vol_expansion);
    v.set(SignalId::DeltaDivergence, divergence);
    v.set(SignalId::FomoIndex, fomo);
    v.set(SignalId::PanicIndex, panic);
    v.set(SignalId::AuctionEfficiency, auction_eff);
    v.set(SignalId::HerdingScore, herding);
    v.set(SignalId::HhllTrendStrength, window.hhll_trend_strength());

    v
}
