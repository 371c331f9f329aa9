use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle step of a wrap command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WrapCommandStep {
    /// Created, elements not yet acknowledged by any device
    #[default]
    Wait,
    /// First device acknowledgement of start received
    Proceed,
    /// Every element done, waiting on an unsatisfied goal
    Running,
    /// Every element done, nothing left to wait for
    Complete,
    /// Cancellation requested, restore elements being prepared
    Canceling,
    /// Cancelled or goal reached
    End,
}

impl WrapCommandStep {
    /// Check if this is a terminal step (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::End)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Wait | Self::Proceed | Self::Running)
    }
}

impl fmt::Display for WrapCommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wait => write!(f, "WAIT"),
            Self::Proceed => write!(f, "PROCEED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Canceling => write!(f, "CANCELING"),
            Self::End => write!(f, "END"),
        }
    }
}

impl std::str::FromStr for WrapCommandStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAIT" => Ok(Self::Wait),
            "PROCEED" => Ok(Self::Proceed),
            "RUNNING" => Ok(Self::Running),
            "COMPLETE" => Ok(Self::Complete),
            "CANCELING" => Ok(Self::Canceling),
            "END" => Ok(Self::End),
            _ => Err(format!("Invalid wrap command step: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_steps() {
        assert!(WrapCommandStep::Complete.is_terminal());
        assert!(WrapCommandStep::End.is_terminal());
        assert!(!WrapCommandStep::Running.is_terminal());
        assert!(!WrapCommandStep::Canceling.is_terminal());
    }

    #[test]
    fn test_cancellable_steps() {
        assert!(WrapCommandStep::Wait.can_cancel());
        assert!(WrapCommandStep::Running.can_cancel());
        assert!(!WrapCommandStep::Canceling.can_cancel());
        assert!(!WrapCommandStep::End.can_cancel());
    }

    #[test]
    fn test_step_string_conversion() {
        assert_eq!(WrapCommandStep::Proceed.to_string(), "PROCEED");
        assert_eq!(
            "CANCELING".parse::<WrapCommandStep>().unwrap(),
            WrapCommandStep::Canceling
        );
        assert!("proceed".parse::<WrapCommandStep>().is_err());
    }

    #[test]
    fn test_step_serde() {
        let json = serde_json::to_string(&WrapCommandStep::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let parsed: WrapCommandStep = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, WrapCommandStep::Running);
    }
}
