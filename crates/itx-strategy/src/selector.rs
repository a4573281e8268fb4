use crate::template::StrategyTemplate;
use itx_belief::BeliefState;
use itx_permission::Permission;
use itx_schemas::{Direction, EntryType};
use itx_signals::SignalVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoTradeReason {
    PermissionDenied,
    NoEligibleTemplate,
    ScoreBelowThreshold,
    MissingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Trade {
        template_id: String,
        direction: Direction,
        entry_type: EntryType,
        score: f64,
    },
    NoTrade {
        reason: NoTradeReason,
    },
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        1.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn score_template(template: &StrategyTemplate, beliefs: &BeliefState, signals: &SignalVector) -> f64 {
    let belief_values: Vec<f64> = template.belief_ids.iter().map(|id| beliefs.belief(id)).collect();
    let signal_values: Vec<f64> = template.confirmation_signal_ids.iter().map(|id| signals.get(*id)).collect();
    0.5 * mean(&belief_values) + 0.5 * mean(&signal_values)
}

fn is_eligible(template: &StrategyTemplate, permission: &Permission, signals: &SignalVector, active_bias_ids: &HashSet<&str>) -> bool {
    if !permission.allowed_playbooks.iter().any(|id| id == &template.id) {
        return false;
    }
    if !template.bias_dependencies.iter().all(|dep| active_bias_ids.contains(dep.as_str())) {
        return false;
    }
    let direction = template.resolve_direction(signals);
    permission.allowed_directions.contains(&direction)
}

/// Score every eligible template, pick the highest (ties broken by lowest
/// template id), and decide TRADE/NO_TRADE against `theta_effective` and the
/// template's required confirmation thresholds (§4.8).
pub fn select(
    templates: &[StrategyTemplate],
    permission: &Permission,
    active_bias_ids: &HashSet<&str>,
    beliefs: &BeliefState,
    signals: &SignalVector,
    theta_effective: f64,
) -> Decision {
    if !permission.allow_trade {
        return Decision::NoTrade { reason: NoTradeReason::PermissionDenied };
    }

    let mut eligible: Vec<&StrategyTemplate> = templates
        .iter()
        .filter(|t| is_eligible(t, permission, signals, active_bias_ids))
        .collect();

    if eligible.is_empty() {
        return Decision::NoTrade { reason: NoTradeReason::NoEligibleTemplate };
    }

    eligible.sort_by(|a, b| a.id.cmp(&b.id));
    let scored: Vec<(&StrategyTemplate, f64)> = eligible.iter().map(|t| (*t, score_template(t, beliefs, signals))).collect();

    // `eligible` is sorted by ascending id, so folding with a strict `>`
    // keeps the first (lowest-id) template on any score tie.
    let mut best = scored[0];
    for &(t, s) in &scored[1..] {
        if s > best.1 {
            best = (t, s);
        }
    }
    let (best, score) = best;

    // Numeric ties at the decision boundary are NO_TRADE, so the pass
    // condition is strict inequality, not >=.
    if score <= theta_effective {
        return Decision::NoTrade { reason: NoTradeReason::ScoreBelowThreshold };
    }

    let confirmation_ok = best.confirmation_signal_ids.iter().all(|id| {
        let threshold = best.confirmation_thresholds.get(id).copied().unwrap_or(f64::NEG_INFINITY);
        signals.get(*id) > threshold
    });
    if !confirmation_ok {
        return Decision::NoTrade { reason: NoTradeReason::MissingConfirmation };
    }

    Decision::Trade {
        template_id: best.id.clone(),
        direction: best.resolve_direction(signals),
        entry_type: best.entry_type,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itx_belief::BeliefState;
    use itx_permission::{GateReason, Permission};
    use itx_schemas::{Direction, EntryType};
    use itx_signals::{SignalId, SignalVector};
    use std::collections::BTreeMap;

    fn allow_permission(playbooks: &[&str], directions: Vec<Direction>) -> Permission {
        Permission {
            allow_trade: true,
            allowed_directions: directions,
            allowed_playbooks: playbooks.iter().map(|s| s.to_string()).collect(),
            max_risk_units: 1.0,
            required_confirmation: vec![],
            stand_down_reason: None,
        }
    }

    fn template(id: &str) -> StrategyTemplate {
        StrategyTemplate {
            id: id.to_string(),
            direction_rule: crate::template::DirectionRule::Fixed(Direction::Long),
            entry_type: EntryType::Limit,
            bias_dependencies: vec![],
            belief_ids: vec![],
            confirmation_signal_ids: vec![],
            confirmation_thresholds: BTreeMap::new(),
        }
    }

    #[test]
    fn permission_denied_short_circuits() {
        let permission = Permission::denied(GateReason::DeadMarket);
        let decision = select(&[template("K1")], &permission, &HashSet::new(), &BeliefState::default(), &SignalVector::new(false), 0.6);
        assert_eq!(decision, Decision::NoTrade { reason: NoTradeReason::PermissionDenied });
    }

    #[test]
    fn no_eligible_template_when_not_in_allowed_playbooks() {
        let permission = allow_permission(&["K2"], vec![Direction::Long]);
        let decision = select(&[template("K1")], &permission, &HashSet::new(), &BeliefState::default(), &SignalVector::new(false), 0.6);
        assert_eq!(decision, Decision::NoTrade { reason: NoTradeReason::NoEligibleTemplate });
    }

    #[test]
    fn score_tie_at_theta_is_no_trade() {
        let permission = allow_permission(&["K1"], vec![Direction::Long]);
        let decision = select(&[template("K1")], &permission, &HashSet::new(), &BeliefState::default(), &SignalVector::new(false), 1.0);
        // empty belief_ids/confirmation_signal_ids both vacuously score 1.0
        assert_eq!(decision, Decision::NoTrade { reason: NoTradeReason::ScoreBelowThreshold });
    }

    #[test]
    fn passes_threshold_and_confirmation_emits_trade() {
        let permission = allow_permission(&["K1"], vec![Direction::Long]);
        let mut t = template("K1");
        t.confirmation_signal_ids = vec![SignalId::ImpulseStrength];
        t.confirmation_thresholds = BTreeMap::from([(SignalId::ImpulseStrength, 0.2)]);
        let mut signals = SignalVector::new(false);
        signals.set(SignalId::ImpulseStrength, 0.9);
        let decision = select(&[t], &permission, &HashSet::new(), &BeliefState::default(), &signals, 0.5);
        assert!(matches!(decision, Decision::Trade { .. }));
    }

    #[test]
    fn missing_confirmation_denies_trade() {
        let permission = allow_permission(&["K1"], vec![Direction::Long]);
        let mut t = template("K1");
        t.confirmation_signal_ids = vec![SignalId::ImpulseStrength];
        t.confirmation_thresholds = BTreeMap::from([(SignalId::ImpulseStrength, 0.95)]);
        let mut signals = SignalVector::new(false);
        signals.set(SignalId::ImpulseStrength, 0.5);
        let decision = select(&[t], &permission, &HashSet::new(), &BeliefState::default(), &signals, 0.5);
        assert_eq!(decision, Decision::NoTrade { reason: NoTradeReason::MissingConfirmation });
    }

    #[test]
    fn ties_break_on_lowest_template_id() {
        let permission = allow_permission(&["K1", "K2"], vec![Direction::Long]);
        let t1 = template("K2");
        let t2 = template("K1");
        let decision = select(&[t1, t2], &permission, &HashSet::new(), &BeliefState::default(), &SignalVector::new(false), 0.5);
        match decision {
            Decision::Trade { template_id, .. } => assert_eq!(template_id, "K1"),
            other => panic!("expected trade, got {:?}", other),
        }
    }
}
