use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::{StateMachineError, StateMachineResult};
use super::events::CommandEvent;
use super::guards::TransitionGuard;
use super::states::WrapCommandStep;
use crate::models::{CommandType, WrapCommand};

/// A step change that was applied to a wrap command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTransition {
    pub from: WrapCommandStep,
    pub to: WrapCommandStep,
    pub event: CommandEvent,
}

/// Lifecycle state machine for wrap commands.
///
/// ```text
/// WAIT -> PROCEED -> COMPLETE
///                 -> RUNNING -> END            (goal reached / time limit)
/// WAIT | PROCEED | RUNNING -> CANCELING -> WAIT -> PROCEED -> END
///                                       -> END (nothing to restore)
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct WrapCommandStateMachine;

impl WrapCommandStateMachine {
    /// Determine the target step for an event without applying it
    pub fn determine_target_step(
        command: &WrapCommand,
        event: &CommandEvent,
    ) -> StateMachineResult<WrapCommandStep> {
        use CommandEvent::*;
        use WrapCommandStep::*;

        let target = match (command.step, event) {
            (Wait, Start) => Proceed,

            (Proceed, ElementsComplete) => match command.cmd_type {
                CommandType::Cancel => End,
                CommandType::Control if command.has_live_goal() => Running,
                _ => Complete,
            },

            (Running, GoalReached) => End,

            (step, Cancel) if step.can_cancel() => Canceling,
            (Canceling, RestoreDispatched) => Wait,
            (Canceling, NothingToRestore) => End,

            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to the command, validating it with the transition guard
    pub fn transition(
        command: &mut WrapCommand,
        event: CommandEvent,
    ) -> StateMachineResult<StepTransition> {
        let from = command.step;
        let to = Self::determine_target_step(command, &event)?;

        if event == CommandEvent::Cancel {
            // CANCEL flips the command type before the guard looks at it
            command.cmd_type = CommandType::Cancel;
        }
        if event == CommandEvent::ElementsComplete {
            TransitionGuard::all_elements_complete(command)?;
        }
        TransitionGuard::can_transition(from, to, &event, command)?;

        command.step = to;
        command.updated_at = Utc::now();

        debug!(
            wrap_cmd_id = %command.wrap_cmd_id,
            wrap_cmd_uuid = %command.wrap_cmd_uuid,
            from = %from,
            to = %to,
            event = event.event_type(),
            "Wrap command step transition"
        );

        Ok(StepTransition { from, to, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ControlValue, DeviceKind};
    use crate::models::{
        CommandFormat, ContainerCommand, ContainerSpec, ElementCommand, Goal, GoalInfo, GoalRange,
        WrapCommandSpec,
    };

    fn command(cmd_type: CommandType, goal: Option<GoalInfo>) -> WrapCommand {
        let spec = WrapCommandSpec {
            wrap_cmd_id: "V_1:true".into(),
            wrap_cmd_name: "V_1".into(),
            format: CommandFormat::Single,
            cmd_type,
            rank: 2,
            goal,
            src_place_id: None,
            dest_place_id: None,
            containers: vec![ContainerSpec::new(ControlValue::True, vec!["V_1".into()])],
        };
        let mut container = ContainerCommand::new(ControlValue::True, None);
        container
            .elements
            .push(ElementCommand::new("V_1", DeviceKind::Valve, ControlValue::True, None));
        WrapCommand::new(&spec, vec![container])
    }

    fn complete_all(command: &mut WrapCommand) {
        let ids: Vec<_> = command.elements().map(|e| e.element_id).collect();
        for id in ids {
            command.complete_element(id);
        }
    }

    #[test]
    fn test_control_without_goal_completes() {
        let mut wc = command(CommandType::Control, None);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        assert_eq!(wc.step, WrapCommandStep::Proceed);
        complete_all(&mut wc);
        let t = WrapCommandStateMachine::transition(&mut wc, CommandEvent::ElementsComplete).unwrap();
        assert_eq!(t.to, WrapCommandStep::Complete);
    }

    #[test]
    fn test_control_with_goal_runs() {
        let goal = GoalInfo::new(vec![Goal::new("WL_1", 10.0, GoalRange::Upper)]);
        let mut wc = command(CommandType::Control, Some(goal));
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        complete_all(&mut wc);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::ElementsComplete).unwrap();
        assert_eq!(wc.step, WrapCommandStep::Running);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::GoalReached).unwrap();
        assert_eq!(wc.step, WrapCommandStep::End);
    }

    #[test]
    fn test_measure_ignores_goal() {
        let goal = GoalInfo::new(vec![Goal::new("WL_1", 10.0, GoalRange::Upper)]);
        let mut wc = command(CommandType::Measure, Some(goal));
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        complete_all(&mut wc);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::ElementsComplete).unwrap();
        assert_eq!(wc.step, WrapCommandStep::Complete);
    }

    #[test]
    fn test_elements_complete_requires_all_elements() {
        let mut wc = command(CommandType::Control, None);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        let err = WrapCommandStateMachine::transition(&mut wc, CommandEvent::ElementsComplete)
            .unwrap_err();
        assert!(matches!(err, StateMachineError::GuardFailed { .. }));
        assert_eq!(wc.step, WrapCommandStep::Proceed);
    }

    #[test]
    fn test_cancel_flips_type_and_restores() {
        let mut wc = command(CommandType::Control, None);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Cancel).unwrap();
        assert_eq!(wc.cmd_type, CommandType::Cancel);
        assert_eq!(wc.step, WrapCommandStep::Canceling);

        WrapCommandStateMachine::transition(&mut wc, CommandEvent::RestoreDispatched).unwrap();
        assert_eq!(wc.step, WrapCommandStep::Wait);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        complete_all(&mut wc);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::ElementsComplete).unwrap();
        assert_eq!(wc.step, WrapCommandStep::End);
    }

    #[test]
    fn test_terminal_steps_reject_events() {
        let mut wc = command(CommandType::Control, None);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Cancel).unwrap();
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::NothingToRestore).unwrap();
        assert_eq!(wc.step, WrapCommandStep::End);

        let err = WrapCommandStateMachine::transition(&mut wc, CommandEvent::Cancel).unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
        let err = WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut wc = command(CommandType::Control, None);
        WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).unwrap();
        assert!(WrapCommandStateMachine::transition(&mut wc, CommandEvent::Start).is_err());
    }
}
