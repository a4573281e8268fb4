use itx_risk::*;
use chrono::NaiveTime;
use itx_schemas::EntryType;

fn bracketed(qty: i64) -> OrderIntent {
    OrderIntent {
        qty,
        entry_type: EntryType::Limit,
        has_stop: true,
        has_target: true,
    }
}

#[test]
fn scenario_at_or_past_flatten_deadline_rejects() {
    let cfg = ConstitutionConfig::default();
    let st = ConstitutionalState::default();

    let at_deadline = evaluate_order_intent(&cfg, &st, &bracketed(1), cfg.flatten_deadline);
    assert_eq!(at_deadline, FilterDecision::Reject(RejectReason::PastFlattenDeadline));

    let past_deadline = evaluate_order_intent(&cfg, &st, &bracketed(1), NaiveTime::from_hms_opt(16, 30, 0).unwrap());
    assert_eq!(past_deadline, FilterDecision::Reject(RejectReason::PastFlattenDeadline));
}

#[test]
fn scenario_just_before_flatten_deadline_passes() {
    let cfg = ConstitutionConfig::default();
    let st = ConstitutionalState::default();

    let before = evaluate_order_intent(&cfg, &st, &bracketed(1), NaiveTime::from_hms_opt(15, 54, 59).unwrap());
    assert_eq!(before, FilterDecision::Allow);
}
