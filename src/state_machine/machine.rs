use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::transition::{TaggedEvent, Transition};
use crate::observability::engine_counters;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError<S, T> {
    #[error("no valid transition from {state:?} on {event:?}")]
    NoValidTransition { state: S, event: T },
    #[error("transition action failed in {state:?} on {event:?}: {reason}")]
    ActionFailed { state: S, event: T, reason: String },
}

impl<S, T> TransitionError<S, T> {
    pub fn state(&self) -> &S {
        match self {
            TransitionError::NoValidTransition { state, .. }
            | TransitionError::ActionFailed { state, .. } => state,
        }
    }

    pub fn event(&self) -> &T {
        match self {
            TransitionError::NoValidTransition { event, .. }
            | TransitionError::ActionFailed { event, .. } => event,
        }
    }
}

/// One applied transition. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<S, E> {
    pub event: E,
    pub from: S,
    pub to: S,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Name used in log fields
    pub name: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: "state_machine".to_string(),
        }
    }
}

/// Copy-on-write state machine over application-defined states and events.
#[derive(Clone)]
pub struct StateMachine<S, E: TaggedEvent> {
    current_state: S,
    transitions: Arc<[Transition<S, E>]>,
    history: Vec<HistoryEntry<S, E>>,
    config: Arc<MachineConfig>,
}

impl<S, E> StateMachine<S, E>
where
    S: Clone + PartialEq + fmt::Debug,
    E: TaggedEvent,
{
    pub fn create(initial_state: S, transitions: Vec<Transition<S, E>>) -> Self {
        Self::with_config(initial_state, transitions, MachineConfig::default())
    }

    pub fn with_config(
        initial_state: S,
        transitions: Vec<Transition<S, E>>,
        config: MachineConfig,
    ) -> Self {
        Self {
            current_state: initial_state,
            transitions: transitions.into(),
            history: Vec::new(),
            config: Arc::new(config),
        }
    }

    pub fn current_state(&self) -> &S {
        &self.current_state
    }

    pub fn history(&self) -> &[HistoryEntry<S, E>] {
        &self.history
    }

    pub fn transitions(&self) -> &[Transition<S, E>] {
        &self.transitions
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Apply `event` using the wall clock for the history timestamp.
    pub fn transition(&self, event: E) -> Result<Self, TransitionError<S, E::Tag>> {
        self.transition_at(event, Utc::now())
    }

    /// Apply `event`, stamping the history entry with `timestamp`.
    ///
    /// The first registered transition whose source state and event tag
    /// match, and whose guard passes, wins. On any failure `self` is left
    /// exactly as it was.
    pub fn transition_at(
        &self,
        event: E,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TransitionError<S, E::Tag>> {
        let tag = event.tag();
        let Some(transition) = self.find_transition(&event) else {
            engine_counters().record_transition_rejected();
            debug!(
                machine = %self.config.name,
                state = ?self.current_state,
                event = ?tag,
                "No valid transition"
            );
            return Err(TransitionError::NoValidTransition {
                state: self.current_state.clone(),
                event: tag,
            });
        };

        if let Err(reason) = transition.run_action(&self.current_state, &event) {
            engine_counters().record_transition_rejected();
            debug!(
                machine = %self.config.name,
                state = ?self.current_state,
                event = ?tag,
                reason = %reason,
                "Transition action failed"
            );
            return Err(TransitionError::ActionFailed {
                state: self.current_state.clone(),
                event: tag,
                reason,
            });
        }

        let to = transition.target().resolve(&self.current_state, &event);
        debug!(
            machine = %self.config.name,
            from = ?self.current_state,
            to = ?to,
            event = ?tag,
            "State transition"
        );
        engine_counters().record_transition_applied();

        let mut next = self.clone();
        next.history.push(HistoryEntry {
            event,
            from: self.current_state.clone(),
            to: to.clone(),
            timestamp,
        });
        next.current_state = to;
        Ok(next)
    }

    /// Whether `event` would be accepted right now (guards evaluated,
    /// actions not run).
    pub fn can_transition(&self, event: &E) -> bool {
        self.find_transition(event).is_some()
    }

    /// Event tags with at least one transition out of the current state.
    /// Guards are not evaluated.
    pub fn available_events(&self) -> Vec<E::Tag> {
        let mut seen = HashSet::new();
        self.transitions
            .iter()
            .filter(|t| *t.from_state() == self.current_state)
            .map(|t| t.event_tag())
            .filter(|tag| seen.insert(*tag))
            .collect()
    }

    /// A state is terminal iff no transition leaves it.
    pub fn is_terminal(&self, state: &S) -> bool {
        !self.transitions.iter().any(|t| t.from_state() == state)
    }

    pub fn is_in_terminal_state(&self) -> bool {
        self.is_terminal(&self.current_state)
    }

    fn find_transition(&self, event: &E) -> Option<&Transition<S, E>> {
        let tag = event.tag();
        self.transitions.iter().find(|t| {
            *t.from_state() == self.current_state
                && t.event_tag() == tag
                && t.guard_passes(&self.current_state, event)
        })
    }
}

impl<S: fmt::Debug, E: TaggedEvent> fmt::Debug for StateMachine<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.config.name)
            .field("current_state", &self.current_state)
            .field("transitions", &self.transitions.len())
            .field("history", &self.history)
            .finish()
    }
}
