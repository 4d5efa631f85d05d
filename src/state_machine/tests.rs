// Tests for the generic state machine

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Door {
    Open,
    Closed,
    Locked,
}

#[derive(Debug, Clone, PartialEq)]
enum DoorEvent {
    Close,
    Open,
    Lock { code: u32 },
    Unlock { code: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DoorEventTag {
    Close,
    Open,
    Lock,
    Unlock,
}

impl TaggedEvent for DoorEvent {
    type Tag = DoorEventTag;

    fn tag(&self) -> DoorEventTag {
        match self {
            DoorEvent::Close => DoorEventTag::Close,
            DoorEvent::Open => DoorEventTag::Open,
            DoorEvent::Lock { .. } => DoorEventTag::Lock,
            DoorEvent::Unlock { .. } => DoorEventTag::Unlock,
        }
    }
}

fn door_machine() -> StateMachine<Door, DoorEvent> {
    StateMachine::create(
        Door::Open,
        vec![
            Transition::new(Door::Open, DoorEventTag::Close, Door::Closed),
            Transition::new(Door::Closed, DoorEventTag::Open, Door::Open),
            Transition::new(Door::Closed, DoorEventTag::Lock, Door::Locked),
            Transition::new(Door::Locked, DoorEventTag::Unlock, Door::Closed)
                .with_guard(|_, event| matches!(event, DoorEvent::Unlock { code } if *code == 1234)),
        ],
    )
}

#[test]
fn test_transition_returns_new_machine() {
    let machine = door_machine();
    let closed = machine.transition(DoorEvent::Close).unwrap();

    assert_eq!(*closed.current_state(), Door::Closed);
    assert_eq!(*machine.current_state(), Door::Open);
    assert!(machine.history().is_empty());
    assert_eq!(closed.history().len(), 1);
    assert_eq!(closed.history()[0].from, Door::Open);
    assert_eq!(closed.history()[0].to, Door::Closed);
    assert_eq!(closed.history()[0].event, DoorEvent::Close);
}

#[test]
fn test_unmatched_event_leaves_machine_unchanged() {
    let machine = door_machine();
    let err = machine.transition(DoorEvent::Open).unwrap_err();

    assert!(matches!(
        err,
        TransitionError::NoValidTransition { state: Door::Open, event: DoorEventTag::Open }
    ));
    assert!(err.to_string().contains("no valid transition"));
    assert_eq!(*machine.current_state(), Door::Open);
    assert!(machine.history().is_empty());

    // Failing again is idempotent
    let again = machine.transition(DoorEvent::Open).unwrap_err();
    assert_eq!(err, again);
}

#[test]
fn test_matching_ignores_payload() {
    let locked = door_machine()
        .transition(DoorEvent::Close)
        .unwrap()
        .transition(DoorEvent::Lock { code: 1 })
        .unwrap();
    assert_eq!(*locked.current_state(), Door::Locked);

    let other = door_machine()
        .transition(DoorEvent::Close)
        .unwrap()
        .transition(DoorEvent::Lock { code: 99 })
        .unwrap();
    assert_eq!(*other.current_state(), Door::Locked);
}

#[test]
fn test_guard_sees_payload() {
    let locked = door_machine()
        .transition(DoorEvent::Close)
        .unwrap()
        .transition(DoorEvent::Lock { code: 1234 })
        .unwrap();

    assert!(locked.transition(DoorEvent::Unlock { code: 1 }).is_err());
    assert!(!locked.can_transition(&DoorEvent::Unlock { code: 1 }));
    assert!(locked.can_transition(&DoorEvent::Unlock { code: 1234 }));

    let unlocked = locked.transition(DoorEvent::Unlock { code: 1234 }).unwrap();
    assert_eq!(*unlocked.current_state(), Door::Closed);
}

#[test]
fn test_first_registered_match_wins() {
    let machine: StateMachine<Door, DoorEvent> = StateMachine::create(
        Door::Open,
        vec![
            Transition::new(Door::Open, DoorEventTag::Close, Door::Locked).with_guard(|_, _| false),
            Transition::new(Door::Open, DoorEventTag::Close, Door::Closed),
            Transition::new(Door::Open, DoorEventTag::Close, Door::Locked),
        ],
    );

    let next = machine.transition(DoorEvent::Close).unwrap();
    assert_eq!(*next.current_state(), Door::Closed);
}

#[test]
fn test_failing_action_aborts_transition() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in_action = Arc::clone(&calls);

    let machine: StateMachine<Door, DoorEvent> = StateMachine::create(
        Door::Open,
        vec![Transition::new(Door::Open, DoorEventTag::Close, Door::Closed).with_action(
            move |_, _| {
                calls_in_action.fetch_add(1, Ordering::SeqCst);
                Err("hinge jammed".to_string())
            },
        )],
    );

    let err = machine.transition(DoorEvent::Close).unwrap_err();
    assert!(matches!(err, TransitionError::ActionFailed { ref reason, .. } if reason == "hinge jammed"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*machine.current_state(), Door::Open);
    assert!(machine.history().is_empty());
}

#[test]
fn test_computed_target() {
    let machine: StateMachine<Door, DoorEvent> = StateMachine::create(
        Door::Closed,
        vec![Transition::computed(Door::Closed, DoorEventTag::Lock, |_, event| match event {
            DoorEvent::Lock { code } if *code > 0 => Door::Locked,
            _ => Door::Closed,
        })],
    );

    let locked = machine.transition(DoorEvent::Lock { code: 7 }).unwrap();
    assert_eq!(*locked.current_state(), Door::Locked);

    let still_closed = machine.transition(DoorEvent::Lock { code: 0 }).unwrap();
    assert_eq!(*still_closed.current_state(), Door::Closed);
    assert_eq!(still_closed.history().len(), 1);
}

#[test]
fn test_terminal_states() {
    let machine: StateMachine<Door, DoorEvent> = StateMachine::create(
        Door::Open,
        vec![Transition::new(Door::Open, DoorEventTag::Close, Door::Locked)],
    );

    assert!(!machine.is_terminal(&Door::Open));
    assert!(machine.is_terminal(&Door::Locked));
    assert!(machine.is_terminal(&Door::Closed));
    assert!(!machine.is_in_terminal_state());

    let locked = machine.transition(DoorEvent::Close).unwrap();
    assert!(locked.is_in_terminal_state());
    assert!(locked.available_events().is_empty());
}

#[test]
fn test_available_events_are_deduplicated() {
    let closed = door_machine().transition(DoorEvent::Close).unwrap();
    let events = closed.available_events();
    assert_eq!(events, vec![DoorEventTag::Open, DoorEventTag::Lock]);
}

#[test]
fn test_history_is_a_total_order() {
    let mut machine = door_machine();
    for event in [
        DoorEvent::Close,
        DoorEvent::Open,
        DoorEvent::Close,
        DoorEvent::Lock { code: 1234 },
        DoorEvent::Unlock { code: 1234 },
    ] {
        machine = machine.transition(event).unwrap();
    }

    let history = machine.history();
    assert_eq!(history.len(), 5);
    for pair in history.windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn test_named_machine() {
    let machine: StateMachine<Door, DoorEvent> = StateMachine::with_config(
        Door::Open,
        Vec::new(),
        MachineConfig {
            name: "front_door".to_string(),
        },
    );
    assert_eq!(machine.name(), "front_door");
    assert!(machine.is_in_terminal_state());
}
