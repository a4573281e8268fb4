//! Non-convergence escalation — tracks reconcile diffs across consecutive
//! passes rather than halting on the first one.
//!
//! A single dirty pass produces a diff the runtime should repair (re-place
//! the missing child/order by the same client id) and retry. Only if the
//! *same* parent is still diffing on the next pass does this become a
//! kill-switch + flatten-all condition.

use std::collections::BTreeSet;

use crate::{reconcile, BrokerSnapshot, LocalSnapshot, ReconcileDiff, ReconcileReport};

fn diff_key(diff: &ReconcileDiff) -> String {
    match diff {
        ReconcileDiff::UnknownOrder { order_id } => order_id.clone(),
        ReconcileDiff::PositionQtyMismatch { symbol, .. } => symbol.clone(),
        ReconcileDiff::OrderMismatch { order_id, .. } => order_id.clone(),
    }
}

/// What the caller should do after one reconcile pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Nothing to repair.
    Clean,
    /// A diff appeared that was not present on the previous pass (or this is
    /// the first dirty pass). The caller should emit `RECONCILE_DIFF` and
    /// attempt an idempotent repair.
    DiffDetected { report: ReconcileReport },
    /// The same order/symbol diffed on two consecutive passes despite a
    /// repair attempt in between. The caller MUST set the kill switch and
    /// schedule flatten-all.
    NonConvergent { report: ReconcileReport },
}

/// Stateful wrapper around [`reconcile`] that remembers which keys diffed on
/// the previous pass, so a second consecutive diff on the same key can be
/// distinguished from a fresh, first-time diff.
#[derive(Debug, Default)]
pub struct ReconcileSupervisor {
    last_diff_keys: Option<BTreeSet<String>>,
}

impl ReconcileSupervisor {
    pub fn new() -> Self {
        Self { last_diff_keys: None }
    }

    /// Run one reconcile pass and classify it against the previous pass's
    /// diff keys.
    pub fn tick(&mut self, local: &LocalSnapshot, broker: &BrokerSnapshot) -> SupervisorAction {
        let report = reconcile(local, broker);

        if report.is_clean() {
            self.last_diff_keys = None;
            return SupervisorAction::Clean;
        }

        let keys: BTreeSet<String> = report.diffs.iter().map(diff_key).collect();
        let repeats_prior_diff = self
            .last_diff_keys
            .as_ref()
            .is_some_and(|prev| !prev.is_disjoint(&keys));

        self.last_diff_keys = Some(keys);

        if repeats_prior_diff {
            SupervisorAction::NonConvergent { report }
        } else {
            SupervisorAction::DiffDetected { report }
        }
    }
}
