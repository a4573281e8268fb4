mod selector;
mod template;

pub use selector::{select, Decision, NoTradeReason};
pub use template::{DirectionRule, StrategyTemplate};
