use super::errors::{business_rule_violation, GuardResult};
use super::events::CommandEvent;
use super::states::WrapCommandStep;
use crate::models::{CommandType, WrapCommand};

/// Guard conditions for wrap command transitions
#[derive(Debug)]
pub struct TransitionGuard;

impl TransitionGuard {
    /// Check that a computed transition is allowed for this command
    pub fn can_transition(
        from: WrapCommandStep,
        to: WrapCommandStep,
        event: &CommandEvent,
        command: &WrapCommand,
    ) -> GuardResult<()> {
        use CommandEvent::*;
        use WrapCommandStep::*;

        if from.is_terminal() {
            return Err(business_rule_violation(format!(
                "Cannot transition from terminal step {from}"
            )));
        }

        let valid = match (from, to, event) {
            (Wait, Proceed, Start) => true,

            (Proceed, Complete, ElementsComplete) => {
                matches!(
                    command.cmd_type,
                    CommandType::Control | CommandType::Measure | CommandType::Restore
                ) && !command.has_live_goal()
            }
            (Proceed, Running, ElementsComplete) => command.has_live_goal(),
            (Proceed, End, ElementsComplete) => command.cmd_type == CommandType::Cancel,

            (Running, End, GoalReached) => true,

            (from, Canceling, Cancel) => from.can_cancel(),
            (Canceling, Wait, RestoreDispatched) => command.cmd_type == CommandType::Cancel,
            (Canceling, End, NothingToRestore) => command.cmd_type == CommandType::Cancel,

            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(business_rule_violation(format!(
                "Invalid transition from {from} to {to} with event {event:?} for {} command",
                command.cmd_type
            )))
        }
    }

    /// Elements must all report complete before the aggregate can complete
    pub fn all_elements_complete(command: &WrapCommand) -> GuardResult<()> {
        if command.is_complete() {
            Ok(())
        } else {
            Err(business_rule_violation(format!(
                "Wrap command {} still has {} pending elements",
                command.wrap_cmd_id,
                command.pending_elements().count()
            )))
        }
    }
}
