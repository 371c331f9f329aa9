use thiserror::Error;

/// Error types for wrap command lifecycle transitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
}

/// Specific error type for guard condition failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },
}

impl From<GuardError> for StateMachineError {
    fn from(err: GuardError) -> Self {
        Self::GuardFailed {
            reason: err.to_string(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

/// Helper function to create business rule violations
pub fn business_rule_violation(rule: impl Into<String>) -> GuardError {
    GuardError::BusinessRuleViolation { rule: rule.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_error_converts() {
        let err: StateMachineError = business_rule_violation("terminal").into();
        match err {
            StateMachineError::GuardFailed { reason } => {
                assert!(reason.contains("Business rule violation: terminal"));
            }
            other => panic!("Expected GuardFailed, got {other:?}"),
        }
    }
}
