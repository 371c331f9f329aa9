//! Error types for the brine control engine.
//!
//! The taxonomy follows the engine's propagation policy: validation and
//! conflict errors are returned synchronously from the API entry points,
//! everything else surfaces through the event feed or the log and never
//! crosses the event-processing boundary.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::state_machine::StateMachineError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed request: missing field, bad value, wrong type for the format
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown place, node, logger, preset or command
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A command with the same logical id and type is still active
    #[error("Command id exists: {wrap_cmd_id}")]
    DuplicateCommand { wrap_cmd_id: String },

    /// The same wrap command uuid is already registered for an actuator tuple
    #[error("WCU already exists: {wrap_cmd_uuid} on node {node_id}")]
    DuplicateWcu { wrap_cmd_uuid: Uuid, node_id: String },

    /// The actuator is already claimed for a different control value
    #[error("Conflict of control type on node {node_id}: requested {requested}, held {held}")]
    OverlapConflict {
        node_id: String,
        requested: String,
        held: String,
    },

    /// Flow source is below its minimum or destination is above its maximum
    #[error("Physical consistency error for place {place_id}: {reason}")]
    PhysicalConsistency { place_id: String, reason: String },

    /// An ack references a command or element that is no longer tracked
    #[error("Stale ack for element {element_id}")]
    StaleAck { element_id: Uuid },

    /// Device layer failure (disconnect, timeout, rejected command)
    #[error("Device error: {0}")]
    Device(String),

    #[error("State machine error: {0}")]
    StateMachine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The processor's command channel has been closed
    #[error("Engine channel closed: {0}")]
    ChannelClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Errors the API layer returns to the caller before a command enters the hierarchy
    pub fn is_synchronous_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::DuplicateCommand { .. }
                | Self::DuplicateWcu { .. }
                | Self::OverlapConflict { .. }
                | Self::PhysicalConsistency { .. }
        )
    }

    /// Conflict errors: the caller should retry with a different request or wait
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCommand { .. } | Self::DuplicateWcu { .. } | Self::OverlapConflict { .. }
        )
    }
}

impl From<StateMachineError> for EngineError {
    fn from(err: StateMachineError) -> Self {
        EngineError::StateMachine(err.to_string())
    }
}

impl From<ConfigurationError> for EngineError {
    fn from(err: ConfigurationError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Validation(format!("JSON serialization error: {err}"))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
