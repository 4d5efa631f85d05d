use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A rule condition. Returning `Err` counts as "condition false".
pub type Condition<C> = Arc<dyn Fn(&C) -> anyhow::Result<bool> + Send + Sync>;

/// What a matched rule decides when used for admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleEffect {
    #[default]
    Allow,
    Deny,
}

pub struct Rule<C> {
    pub id: String,
    pub description: String,
    pub priority: i32,
    pub enabled: bool,
    pub effect: RuleEffect,
    condition: Condition<C>,
}

impl<C> Rule<C> {
    pub fn new<F>(id: impl Into<String>, priority: i32, condition: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        Self::fallible(id, priority, move |ctx: &C| Ok(condition(ctx)))
    }

    /// Rule whose condition may fail, e.g. while reading a metric that is
    /// not available yet.
    pub fn fallible<F>(id: impl Into<String>, priority: i32, condition: F) -> Self
    where
        F: Fn(&C) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: String::new(),
            priority,
            enabled: true,
            effect: RuleEffect::Allow,
            condition: Arc::new(condition),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_effect(mut self, effect: RuleEffect) -> Self {
        self.effect = effect;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Evaluate the condition. Errors are swallowed as `false` so rule
    /// evaluation stays total.
    pub fn matches(&self, context: &C) -> bool {
        match (self.condition)(context) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(rule_id = %self.id, error = %e, "Rule condition failed, treating as false");
                false
            }
        }
    }
}

impl<C> Clone for Rule<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            description: self.description.clone(),
            priority: self.priority,
            enabled: self.enabled,
            effect: self.effect,
            condition: Arc::clone(&self.condition),
        }
    }
}

impl<C> fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("effect", &self.effect)
            .finish()
    }
}
