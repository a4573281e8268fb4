mod artifact_gate;
mod evaluator;
mod types;

pub use artifact_gate::{lock_artifact_from_str, ArtifactLock, LockError};
pub use evaluator::{compare_candidates, compute_metrics, evaluate_promotion};
pub use types::{
    PromotionCandidate, PromotionDecision, PromotionMetrics, PromotionReport,
    PromotionThresholds, TieBreakOrder, TieBreakRules,
};
