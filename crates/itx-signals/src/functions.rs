//! Pure signal-building-block functions. Each mirrors one function from the
//! original scoring engine's signal utilities, translated from decimal
//! arithmetic to plain `f64` (signal outputs are not money and do not need
//! tick-aligned precision) and from optional/defaulted parameters to
//! explicit `Option`/const arguments.

pub fn impulse_strength(close: f64, open: f64, high: f64, low: f64, atr: Option<f64>) -> f64 {
    let atr = match atr {
        Some(a) if a != 0.0 => a,
        _ => {
            let range = high - low;
            if range == 0.0 {
                return 0.0;
            }
            range
        }
    };
    let body = close - open;
    (body / atr).clamp(-1.0, 1.0)
}

pub fn sweep_then_reject(
    high: f64,
    low: f64,
    close: f64,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    threshold: f64,
) -> f64 {
    let (prev_high, prev_low) = match (prev_high, prev_low) {
        (Some(h), Some(l)) => (h, l),
        _ => return 0.0,
    };
    if high > prev_high && close < (prev_high - threshold) {
        return 1.0;
    }
    if low < prev_low && close > (prev_low + threshold) {
        return 1.0;
    }
    0.0
}

pub fn absorption_proxy(volume: i64, range_size: f64, avg_volume: f64, avg_range: f64) -> f64 {
    if avg_volume == 0.0 || avg_range == 0.0 {
        return 0.0;
    }
    let volume_ratio = volume as f64 / avg_volume;
    let range_ratio = range_size / avg_range;
    if volume_ratio > 1.5 && range_ratio < 0.5 {
        return ((volume_ratio - 1.0) * (1.0 - range_ratio)).min(1.0);
    }
    0.0
}

const DEFAULT_ROUND_LEVELS: [f64; 7] = [5800.0, 5850.0, 5900.0, 5950.0, 6000.0, 6050.0, 6100.0];

pub fn round_number_proximity(price: f64, round_levels: Option<&[f64]>) -> f64 {
    let levels = round_levels.unwrap_or(&DEFAULT_ROUND_LEVELS);
    let min_distance = levels
        .iter()
        .map(|lvl| (price - lvl).abs())
        .fold(f64::INFINITY, f64::min);
    let max_level = levels.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let threshold = 0.005 * max_level;
    if threshold > 0.0 && min_distance < threshold {
        1.0 - (min_distance / threshold)
    } else {
        0.0
    }
}

pub fn late_entry_flag(current_price: f64, entry_level: f64, target_level: f64) -> f64 {
    let total_move = (target_level - entry_level).abs();
    if total_move == 0.0 {
        return 0.0;
    }
    let completed_move = (current_price - entry_level).abs();
    let completion_ratio = completed_move / total_move;
    if completion_ratio > 0.7 {
        completion_ratio
    } else {
        0.0
    }
}

pub fn volatility_expansion(current_atr: f64, avg_atr: f64, threshold: f64) -> f64 {
    if avg_atr == 0.0 {
        return 0.0;
    }
    let ratio = current_atr / avg_atr;
    if ratio > threshold {
        ((ratio - threshold) / threshold).min(1.0)
    } else {
        0.0
    }
}

pub fn delta_divergence(price_change: f64, volume_change: f64, _threshold: f64) -> f64 {
    let price_dir = price_change.signum();
    let volume_dir = volume_change.signum();
    if price_dir * volume_dir < 0.0 {
        let divergence = price_change.abs() + volume_change.abs();
        (divergence / 2.0).min(1.0)
    } else {
        0.0
    }
}

pub fn fomo_index(impulse_strength: f64, volume_surge: f64, price_extension: f64) -> f64 {
    if impulse_strength > 0.6 && volume_surge > 0.6 && price_extension > 0.6 {
        (impulse_strength + volume_surge + price_extension) / 3.0
    } else {
        0.0
    }
}

pub fn panic_index(volatility_expansion: f64, absorption_score: f64, impulse_strength: f64) -> f64 {
    if volatility_expansion > 0.7 && absorption_score > 0.5 {
        (volatility_expansion + absorption_score + impulse_strength.abs()) / 3.0
    } else {
        0.0
    }
}

pub fn auction_efficiency(close: f64, vwap: f64, volume: i64, avg_volume: f64) -> f64 {
    if vwap == 0.0 || avg_volume == 0.0 {
        return 0.5;
    }
    let price_deviation = ((close - vwap) / vwap).abs();
    let volume_ratio = volume as f64 / avg_volume;
    if price_deviation < 0.01 && volume_ratio > 0.8 && volume_ratio < 1.2 {
        return 1.0;
    }
    let inefficiency = price_deviation + (volume_ratio - 1.0).abs();
    (1.0 - inefficiency).max(0.0)
}

pub fn herding_score(consecutive_bars_same_direction: u32, volume_trend: f64, impulse_consistency: f64) -> f64 {
    let direction_factor = (consecutive_bars_same_direction as f64 / 5.0).min(1.0);
    if volume_trend > 0.5 && impulse_consistency > 0.6 {
        (direction_factor + volume_trend + impulse_consistency) / 3.0
    } else {
        0.0
    }
}
