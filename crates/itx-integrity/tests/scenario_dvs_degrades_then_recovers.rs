//! Scenario: injected bar lag + a feed gap drive DVS below the entry
//! threshold, and it stays below until enough clean bars recover it back
//! above the line. Mirrors the Constitutional Filter's `dvs_too_low` gate,
//! scoped here to the scorer itself rather than the full NO_TRADE decision.

use itx_integrity::{compute_dvs, DataState, DvsCondition, DvsRule, Penalty};

const DVS_MIN_FOR_ENTRY: f64 = 0.80;

fn rules() -> Vec<DvsRule> {
    vec![
        DvsRule {
            id: "bar_lag".into(),
            condition: DvsCondition::BarLagSecondsGte(5.0),
            penalty: Penalty::Delta(-0.15),
        },
        DvsRule {
            id: "gap".into(),
            condition: DvsCondition::GapDetectedEq(true),
            penalty: Penalty::Delta(-0.15),
        },
    ]
}

#[test]
fn scenario_degraded_feed_drops_dvs_below_entry_threshold() {
    let degraded = DataState {
        bar_lag_seconds: 5.0,
        gap_detected: true,
        missing_fields: 0,
    };

    let dvs = compute_dvs(1.0, &degraded, &rules(), 0.0);

    assert!(
        dvs < DVS_MIN_FOR_ENTRY,
        "degraded bar must push DVS below {DVS_MIN_FOR_ENTRY}, got {dvs}"
    );
}

#[test]
fn scenario_dvs_stays_below_threshold_until_enough_clean_bars_recover_it() {
    let degraded = DataState {
        bar_lag_seconds: 5.0,
        gap_detected: true,
        missing_fields: 0,
    };
    let clean = DataState::default();
    let recovery_per_bar = 0.06;

    let mut dvs = compute_dvs(1.0, &degraded, &rules(), recovery_per_bar);
    assert!(dvs < DVS_MIN_FOR_ENTRY, "first degraded bar: {dvs}");

    // Clean bars afterward recover slowly; every bar below the threshold is
    // a NO_TRADE bar for the caller.
    let mut bars_below_threshold = 1;
    for _ in 0..10 {
        dvs = compute_dvs(dvs, &clean, &[], recovery_per_bar);
        if dvs < DVS_MIN_FOR_ENTRY {
            bars_below_threshold += 1;
        } else {
            break;
        }
    }

    assert!(
        dvs >= DVS_MIN_FOR_ENTRY,
        "DVS must eventually recover above {DVS_MIN_FOR_ENTRY}, stuck at {dvs}"
    );
    assert!(
        bars_below_threshold > 1,
        "recovery must take more than one clean bar given a -0.30 hit and +0.06/bar recovery"
    );
}
