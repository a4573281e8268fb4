//! Scenario: the bracket-required gate rejects intents missing protective
//! orders, regardless of which side of the bracket is missing.

use itx_risk::*;
use chrono::NaiveTime;
use itx_schemas::EntryType;

fn intent(has_stop: bool, has_target: bool) -> OrderIntent {
    OrderIntent {
        qty: 1,
        entry_type: EntryType::Limit,
        has_stop,
        has_target,
    }
}

#[test]
fn scenario_missing_stop_rejects() {
    let cfg = ConstitutionConfig::default();
    let st = ConstitutionalState::default();
    let d = evaluate_order_intent(&cfg, &st, &intent(false, true), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(d, FilterDecision::Reject(RejectReason::BracketRequired));
}

#[test]
fn scenario_missing_target_rejects() {
    let cfg = ConstitutionConfig::default();
    let st = ConstitutionalState::default();
    let d = evaluate_order_intent(&cfg, &st, &intent(true, false), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(d, FilterDecision::Reject(RejectReason::BracketRequired));
}

#[test]
fn scenario_full_bracket_passes() {
    let cfg = ConstitutionConfig::default();
    let st = ConstitutionalState::default();
    let d = evaluate_order_intent(&cfg, &st, &intent(true, true), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(d, FilterDecision::Allow);
}
