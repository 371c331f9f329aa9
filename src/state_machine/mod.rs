// Wrap command lifecycle state machine.
//
// Transitions are computed from a (step, event) table and validated by a
// guard before being applied, so every step change in the engine goes
// through one place and is logged the same way.

pub mod errors;
pub mod events;
pub mod guards;
pub mod states;
pub mod wrap_command_state_machine;

// Re-export main types for convenient access
pub use errors::{GuardError, StateMachineError, StateMachineResult};
pub use events::CommandEvent;
pub use guards::TransitionGuard;
pub use states::WrapCommandStep;
pub use wrap_command_state_machine::{StepTransition, WrapCommandStateMachine};
