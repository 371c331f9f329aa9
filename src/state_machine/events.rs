use serde::{Deserialize, Serialize};

/// Events that can trigger wrap command step transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandEvent {
    /// First device acknowledgement of start
    Start,
    /// Every element under every container reports complete
    ElementsComplete,
    /// The attached goal was satisfied or its time limit expired
    GoalReached,
    /// Cancellation requested
    Cancel,
    /// Restore elements were dispatched as a fresh element set
    RestoreDispatched,
    /// Cancellation needs no physical restore
    NothingToRestore,
}

impl CommandEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ElementsComplete => "elements_complete",
            Self::GoalReached => "goal_reached",
            Self::Cancel => "cancel",
            Self::RestoreDispatched => "restore_dispatched",
            Self::NothingToRestore => "nothing_to_restore",
        }
    }
}
