// Rule Engine - prioritized, first-match-wins condition evaluation
//
// Used standalone for admission decisions ("may this task start now?") and
// as a guard source for the state machine.

pub mod engine;
pub mod rule;

pub use engine::{evaluate_rules, RuleSet};
pub use rule::{Condition, Rule, RuleEffect};
