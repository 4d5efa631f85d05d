// Generic State Machine - (State, Event) -> State with guards and actions
//
// Machines are values: every successful transition returns a new machine and
// leaves the original untouched, so a failed transition never needs rollback.

pub mod machine;
pub mod transition;

#[cfg(test)]
mod tests;

pub use machine::{HistoryEntry, MachineConfig, StateMachine, TransitionError};
pub use transition::{Action, Guard, TaggedEvent, Target, Transition};
