// Transition definitions for the generic state machine

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Events expose a payload-free tag. Transitions are registered against the
/// tag, never against the full event, so two `Fail` events with different
/// error payloads always match the same transition.
pub trait TaggedEvent: Clone + fmt::Debug {
    type Tag: Copy + Eq + Hash + fmt::Debug;

    fn tag(&self) -> Self::Tag;
}

/// Predicate gating a transition. Evaluated against the current state and
/// the full event (payload included).
pub type Guard<S, E> = Arc<dyn Fn(&S, &E) -> bool + Send + Sync>;

/// Side effect run before the state changes. An `Err` aborts the transition.
pub type Action<S, E> = Arc<dyn Fn(&S, &E) -> Result<(), String> + Send + Sync>;

/// Where a transition lands.
pub enum Target<S, E> {
    State(S),
    Computed(Arc<dyn Fn(&S, &E) -> S + Send + Sync>),
}

impl<S: Clone, E> Target<S, E> {
    pub fn resolve(&self, state: &S, event: &E) -> S {
        match self {
            Target::State(to) => to.clone(),
            Target::Computed(f) => f(state, event),
        }
    }
}

impl<S: Clone, E> Clone for Target<S, E> {
    fn clone(&self) -> Self {
        match self {
            Target::State(s) => Target::State(s.clone()),
            Target::Computed(f) => Target::Computed(Arc::clone(f)),
        }
    }
}

impl<S: fmt::Debug, E> fmt::Debug for Target<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::State(s) => f.debug_tuple("State").field(s).finish(),
            Target::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

/// A single registered transition. Immutable once the machine is created.
pub struct Transition<S, E: TaggedEvent> {
    from: S,
    event: E::Tag,
    guard: Option<Guard<S, E>>,
    action: Option<Action<S, E>>,
    to: Target<S, E>,
}

impl<S: Clone, E: TaggedEvent> Transition<S, E> {
    pub fn new(from: S, event: E::Tag, to: S) -> Self {
        Self {
            from,
            event,
            guard: None,
            action: None,
            to: Target::State(to),
        }
    }

    /// Transition whose destination depends on the current state and event.
    pub fn computed<F>(from: S, event: E::Tag, to: F) -> Self
    where
        F: Fn(&S, &E) -> S + Send + Sync + 'static,
    {
        Self {
            from,
            event,
            guard: None,
            action: None,
            to: Target::Computed(Arc::new(to)),
        }
    }

    pub fn with_guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&S, &E) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn with_shared_guard(mut self, guard: Guard<S, E>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&S, &E) -> Result<(), String> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn from_state(&self) -> &S {
        &self.from
    }

    pub fn event_tag(&self) -> E::Tag {
        self.event
    }

    pub fn target(&self) -> &Target<S, E> {
        &self.to
    }

    pub(crate) fn guard_passes(&self, state: &S, event: &E) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard(state, event))
    }

    pub(crate) fn run_action(&self, state: &S, event: &E) -> Result<(), String> {
        match &self.action {
            Some(action) => action(state, event),
            None => Ok(()),
        }
    }
}

impl<S: Clone, E: TaggedEvent> Clone for Transition<S, E> {
    fn clone(&self) -> Self {
        Self {
            from: self.from.clone(),
            event: self.event,
            guard: self.guard.clone(),
            action: self.action.clone(),
            to: self.to.clone(),
        }
    }
}

impl<S: fmt::Debug, E: TaggedEvent> fmt::Debug for Transition<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("event", &self.event)
            .field("guard", &self.guard.is_some())
            .field("action", &self.action.is_some())
            .field("to", &self.to)
            .finish()
    }
}
