mod gates;
mod theta;
mod types;

pub use gates::evaluate_permission;
pub use theta::compute_theta_effective;
pub use types::{GateReason, Permission, ThresholdModifierConfig, TimeContext};
