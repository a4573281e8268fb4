use itx_promotion::{evaluate_promotion, PromotionDecision, PromotionThresholds};

#[test]
fn fails_when_below_thresholds() {
    // Flat equity => CAGR ~0, Sharpe ~0
    let equity_curve = vec![(0, 1_000_000), (86_400, 1_000_000)];

    let thr = PromotionThresholds {
        cagr_min: 0.05,
        mdd_max: 0.20,
        sharpe_min: 0.5,
        profit_factor_min: 1.2,
        profitable_months_min: 0.5,
    };

    let r = evaluate_promotion(&equity_curve, thr);
    assert_eq!(r.decision, PromotionDecision::Fail);
    assert!(!r.reasons.is_empty());
}
