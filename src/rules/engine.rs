use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

use super::rule::{Rule, RuleEffect};
use crate::state_machine::Guard;

/// Return the highest-priority enabled rule whose condition holds.
///
/// Ties on priority keep registration order. Disabled rules are never
/// evaluated.
pub fn evaluate_rules<'a, C>(rules: &'a [Rule<C>], context: &C) -> Option<&'a Rule<C>> {
    let mut candidates: Vec<&Rule<C>> = rules.iter().filter(|r| r.enabled).collect();
    // sort_by_key is stable, so equal priorities stay in registration order
    candidates.sort_by_key(|r| Reverse(r.priority));

    let matched = candidates.into_iter().find(|rule| rule.matches(context));
    debug!(matched_rule = ?matched.map(|r| r.id.as_str()), "Rules evaluated");
    matched
}

/// An ordered collection of rules with a default decision for when nothing
/// matches.
pub struct RuleSet<C> {
    rules: Vec<Rule<C>>,
    default_effect: RuleEffect,
}

impl<C> Default for RuleSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RuleSet<C> {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_effect: RuleEffect::Allow,
        }
    }

    pub fn with_default(mut self, effect: RuleEffect) -> Self {
        self.default_effect = effect;
        self
    }

    pub fn with_rule(mut self, rule: Rule<C>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: Rule<C>) {
        self.rules.push(rule);
    }

    /// Enable or disable a rule by id. Returns false if no such rule.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn rules(&self) -> &[Rule<C>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, context: &C) -> Option<&Rule<C>> {
        evaluate_rules(&self.rules, context)
    }

    /// Admission decision: the effect of the first matching rule, or the
    /// set's default when nothing matches.
    pub fn admits(&self, context: &C) -> bool {
        let effect = self
            .evaluate(context)
            .map_or(self.default_effect, |rule| rule.effect);
        effect == RuleEffect::Allow
    }
}

impl<C: 'static> RuleSet<C> {
    /// Turn the rule set into a state machine guard. `context` builds the
    /// rule context from the state and event being evaluated.
    pub fn into_guard<S, E, F>(self, context: F) -> Guard<S, E>
    where
        S: 'static,
        E: 'static,
        F: Fn(&S, &E) -> C + Send + Sync + 'static,
    {
        Arc::new(move |state: &S, event: &E| self.admits(&context(state, event)))
    }
}

impl<C> Clone for RuleSet<C> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            default_effect: self.default_effect,
        }
    }
}

impl<C> std::fmt::Debug for RuleSet<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules)
            .field("default_effect", &self.default_effect)
            .finish()
    }
}
