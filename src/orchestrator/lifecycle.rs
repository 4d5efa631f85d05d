// Workflow lifecycle transitions

use super::types::{WorkflowEvent, WorkflowEventTag, WorkflowState};
use crate::state_machine::{MachineConfig, StateMachine, Transition};

pub type WorkflowMachine = StateMachine<WorkflowState, WorkflowEvent>;

pub fn lifecycle_transitions() -> Vec<Transition<WorkflowState, WorkflowEvent>> {
    use WorkflowEventTag as Ev;
    use WorkflowState::*;

    vec![
        Transition::new(Pending, Ev::Start, Running),
        Transition::new(Running, Ev::Pause, Paused),
        Transition::new(Paused, Ev::Resume, Running),
        Transition::new(Running, Ev::Complete, Completed),
        Transition::new(Running, Ev::Fail, Failed),
        Transition::new(Pending, Ev::Cancel, Cancelled),
        Transition::new(Running, Ev::Cancel, Cancelled),
        Transition::new(Paused, Ev::Cancel, Cancelled),
    ]
}

/// Fresh lifecycle machine in `Pending`.
pub fn workflow_machine(instance_id: &str) -> WorkflowMachine {
    StateMachine::with_config(
        WorkflowState::Pending,
        lifecycle_transitions(),
        MachineConfig {
            name: format!("workflow:{instance_id}"),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        let machine = workflow_machine("wf");
        for state in [
            WorkflowState::Completed,
            WorkflowState::Failed,
            WorkflowState::Cancelled,
        ] {
            assert!(machine.is_terminal(&state), "{state} should be terminal");
            assert!(state.is_terminal());
        }
        for state in [
            WorkflowState::Pending,
            WorkflowState::Running,
            WorkflowState::Paused,
        ] {
            assert!(!machine.is_terminal(&state), "{state} should not be terminal");
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_fail_matches_any_reason() {
        let machine = workflow_machine("wf")
            .transition(WorkflowEvent::Start)
            .unwrap();
        let failed = machine
            .transition(WorkflowEvent::Fail("disk full".to_string()))
            .unwrap();
        assert_eq!(*failed.current_state(), WorkflowState::Failed);
        assert_eq!(
            failed.history().last().map(|h| h.event.clone()),
            Some(WorkflowEvent::Fail("disk full".to_string()))
        );
    }

    #[test]
    fn test_running_events() {
        let machine = workflow_machine("wf")
            .transition(WorkflowEvent::Start)
            .unwrap();
        assert_eq!(
            machine.available_events(),
            vec![
                WorkflowEventTag::Pause,
                WorkflowEventTag::Complete,
                WorkflowEventTag::Fail,
                WorkflowEventTag::Cancel
            ]
        );
    }
}
