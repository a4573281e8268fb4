//! itx-execution
//!
//! Execution Supervisor: the parent/bracket-child order state machine that
//! turns one order intent into a working entry plus its `STOP`/`TARGET`
//! children, folds broker events in idempotently, and decides TTL
//! auto-cancels and flatten-all sweeps. Pure deterministic logic — no broker
//! wiring lives here; that's `itx-broker-paper`'s job.

pub mod supervisor;

pub use supervisor::{
    derive_client_order_id, plan_flatten_all, record_flatten_outcomes, BrokerEvent, ChildOrder,
    ChildState, FlattenAttempt, FoldOutcome, ParentOrder, ParentState, TransitionError,
    DEFAULT_TTL_SECONDS,
};
