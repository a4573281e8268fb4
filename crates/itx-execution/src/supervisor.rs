//! Execution Supervisor — parent/bracket-child order state machine.
//!
//! One [`ParentOrder`] represents the single working entry order at a time,
//! together with its two bracket children (`STOP`, `TARGET`). Every broker
//! event is folded in idempotently, mirroring the OMS pattern: illegal
//! transitions return [`TransitionError`], which callers MUST treat as a
//! halt/alert signal, and duplicate `event_id`s are silently absorbed so
//! replaying the same event log converges to the same state.

use std::collections::HashMap;

use itx_schemas::{ChildType, Micros};
use serde::{Deserialize, Serialize};

/// Lifecycle of the parent (entry) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentState {
    Created,
    Submitting,
    Acked,
    Partial,
    Filled,
    Done,
    Rejected,
    Canceled,
    Error,
}

impl ParentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ParentState::Done | ParentState::Rejected | ParentState::Canceled | ParentState::Error
        )
    }
}

/// Lifecycle of a single bracket child (`STOP` or `TARGET`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildState {
    Created,
    Acked,
    Filled,
    Canceled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildOrder {
    pub role: ChildType,
    pub client_order_id: String,
    pub broker_order_id: Option<String>,
    pub state: ChildState,
}

impl ChildOrder {
    pub fn new(role: ChildType, client_order_id: impl Into<String>) -> Self {
        Self {
            role,
            client_order_id: client_order_id.into(),
            broker_order_id: None,
            state: ChildState::Created,
        }
    }
}

/// Broker events folded into a [`ParentOrder`]. `PartialFill`/`Fill` carry the
/// *cumulative* filled quantity to date, not a delta — the broker declares
/// "total filled so far", and the fold takes `max(filled_qty, qty)`.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Ack { broker_order_id: String },
    PartialFill { cumulative_qty: i64, price: Micros },
    Fill { cumulative_qty: i64, price: Micros },
    CancelAck,
    CancelReject,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ParentState,
    pub event: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal execution transition: {:?} + {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

/// Outcome of folding a `Fill` event: whether the bracket children were
/// present and acked at the moment the parent filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Ok,
    /// `FILL` arrived but one or both bracket children were missing or not
    /// yet acked. The parent has moved to `Error`; the caller MUST arm the
    /// kill switch.
    ChildMissing,
}

/// Derive the stable client order id for a new parent: the `intent_id` if
/// supplied, else a timestamp+sequence fallback. Resubmitting the same id is
/// a no-op at the broker.
pub fn derive_client_order_id(intent_id: Option<&str>, now_ms: i64, seq: u64) -> String {
    match intent_id {
        Some(id) => id.to_string(),
        None => format!("cli-{now_ms}-{seq}"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentOrder {
    pub client_order_id: String,
    pub broker_order_id: Option<String>,
    pub qty: i64,
    pub state: ParentState,
    pub filled_qty: i64,
    pub avg_fill_price: Option<Micros>,
    pub children: Vec<ChildOrder>,
    pub submitted_at_utc: i64,
    fill_value_sum: Micros,
    applied: std::collections::HashSet<String>,
}

impl ParentOrder {
    pub fn new(client_order_id: impl Into<String>, qty: i64, submitted_at_utc: i64) -> Self {
        debug_assert!(qty > 0, "ParentOrder.qty must be > 0");
        Self {
            client_order_id: client_order_id.into(),
            broker_order_id: None,
            qty,
            state: ParentState::Created,
            filled_qty: 0,
            avg_fill_price: None,
            children: Vec::new(),
            submitted_at_utc,
            fill_value_sum: Micros::ZERO,
            applied: std::collections::HashSet::new(),
        }
    }

    pub fn add_child(&mut self, role: ChildType, client_order_id: impl Into<String>) {
        self.children.push(ChildOrder::new(role, client_order_id));
    }

    pub fn child_mut(&mut self, role: ChildType) -> Option<&mut ChildOrder> {
        self.children.iter_mut().find(|c| c.role == role)
    }

    fn children_present_and_acked(&self) -> bool {
        let has_stop = self
            .children
            .iter()
            .any(|c| c.role == ChildType::Stop && matches!(c.state, ChildState::Acked | ChildState::Filled));
        let has_target = self
            .children
            .iter()
            .any(|c| c.role == ChildType::Target && matches!(c.state, ChildState::Acked | ChildState::Filled));
        has_stop && has_target
    }

    /// `CREATED -> SUBMITTING`, idempotent if already past `Created`.
    pub fn on_submit(&mut self) {
        if self.state == ParentState::Created {
            self.state = ParentState::Submitting;
        }
    }

    /// Fold one broker event. `event_id`, if supplied, dedups replays.
    pub fn apply(&mut self, event: &BrokerEvent, event_id: Option<&str>) -> Result<FoldOutcome, TransitionError> {
        if let Some(id) = event_id {
            if self.applied.contains(id) {
                return Ok(FoldOutcome::Ok);
            }
        }

        let outcome = self.do_transition(event)?;

        if let Some(id) = event_id {
            self.applied.insert(id.to_string());
        }

        Ok(outcome)
    }

    fn fold_fill(&mut self, cumulative_qty: i64, price: Micros) {
        let delta = (cumulative_qty - self.filled_qty).max(0);
        self.filled_qty = self.filled_qty.max(cumulative_qty);
        if let Some(micros) = price.checked_mul_qty(delta) {
            self.fill_value_sum = self.fill_value_sum.saturating_add(micros);
        }
        if self.filled_qty > 0 {
            self.avg_fill_price = Some(Micros::new(self.fill_value_sum.raw() / self.filled_qty));
        }
    }

    fn do_transition(&mut self, event: &BrokerEvent) -> Result<FoldOutcome, TransitionError> {
        use BrokerEvent::*;
        use ParentState::*;

        match (&self.state, event) {
            (Submitting, Ack { broker_order_id }) => {
                self.broker_order_id = Some(broker_order_id.clone());
                self.state = Acked;
                Ok(FoldOutcome::Ok)
            }

            (Acked | Partial, PartialFill { cumulative_qty, price }) => {
                self.fold_fill(*cumulative_qty, *price);
                self.state = Partial;
                Ok(FoldOutcome::Ok)
            }

            (Acked | Partial, Fill { cumulative_qty, price }) => {
                self.fold_fill(*cumulative_qty, *price);
                if self.children_present_and_acked() {
                    self.state = Filled;
                    Ok(FoldOutcome::Ok)
                } else {
                    self.state = Error;
                    Ok(FoldOutcome::ChildMissing)
                }
            }

            (Acked | Partial, CancelAck) => {
                self.state = Canceled;
                Ok(FoldOutcome::Ok)
            }

            (Acked | Partial, CancelReject) => {
                self.state = Error;
                Ok(FoldOutcome::Ok)
            }

            (Submitting, Reject) => {
                self.state = Rejected;
                Ok(FoldOutcome::Ok)
            }

            (state, ev) => Err(TransitionError {
                from: *state,
                event: format!("{ev:?}"),
            }),
        }
    }

    /// Mark the parent fully wound down (both children closed, trade recorded).
    pub fn mark_done(&mut self) {
        if self.state == ParentState::Filled {
            self.state = ParentState::Done;
        }
    }

    /// `true` if this is still a working, unfilled entry order older than
    /// `ttl_seconds` and should be auto-cancelled.
    pub fn is_ttl_expired(&self, now_utc: i64, ttl_seconds: i64) -> bool {
        matches!(self.state, ParentState::Submitting | ParentState::Acked)
            && self.filled_qty == 0
            && now_utc - self.submitted_at_utc > ttl_seconds
    }
}

/// Default TTL for a working entry order before auto-cancel.
pub const DEFAULT_TTL_SECONDS: i64 = 90;

/// One cancel attempt issued as part of a flatten-all sweep.
#[derive(Debug, Clone)]
pub struct FlattenAttempt {
    pub client_order_id: String,
    pub ok: bool,
}

/// Flatten-all: cancel every non-terminal working order (parent and
/// children). Callers still own closing any resulting position at market via
/// the broker adapter's flatten path; this function only decides which
/// orders need cancelling and records the outcome of each attempt.
pub fn plan_flatten_all(parents: &[ParentOrder]) -> Vec<String> {
    let mut targets = Vec::new();
    for p in parents {
        if p.state.is_terminal() {
            continue;
        }
        targets.push(p.client_order_id.clone());
        for c in &p.children {
            if !matches!(c.state, ChildState::Filled | ChildState::Canceled | ChildState::Rejected) {
                targets.push(c.client_order_id.clone());
            }
        }
    }
    targets
}

/// Record the outcomes of a flatten-all sweep for downstream `FLATTEN_ALL`
/// / `FLATTEN_ERROR` event emission.
pub fn record_flatten_outcomes(results: HashMap<String, bool>) -> Vec<FlattenAttempt> {
    let mut attempts: Vec<FlattenAttempt> = results
        .into_iter()
        .map(|(client_order_id, ok)| FlattenAttempt { client_order_id, ok })
        .collect();
    attempts.sort_by(|a, b| a.client_order_id.cmp(&b.client_order_id));
    attempts
}
