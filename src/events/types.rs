use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{events, ControlMode, NodeStatus};
use crate::models::{CommandType, NodeId};
use crate::state_machine::WrapCommandStep;

/// Closed set of lifecycle events pushed to the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    WrapCommandStepChanged {
        wrap_cmd_uuid: Uuid,
        wrap_cmd_id: String,
        cmd_type: CommandType,
        from: WrapCommandStep,
        to: WrapCommandStep,
    },
    CommandCompleted {
        wrap_cmd_uuid: Uuid,
        wrap_cmd_id: String,
        cmd_type: CommandType,
        final_step: WrapCommandStep,
    },
    CommandRejected {
        wrap_cmd_id: String,
        reason: String,
    },
    NodeStatusChanged {
        node_id: NodeId,
        from: Option<NodeStatus>,
        to: NodeStatus,
    },
    DeviceError {
        node_id: Option<NodeId>,
        element_id: Option<Uuid>,
        message: String,
    },
    ControlModeChanged {
        from: ControlMode,
        to: ControlMode,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WrapCommandStepChanged { .. } => events::WRAP_COMMAND_STEP_CHANGED,
            Self::CommandCompleted { .. } => events::COMMAND_COMPLETED,
            Self::CommandRejected { .. } => events::COMMAND_REJECTED,
            Self::NodeStatusChanged { .. } => events::NODE_STATUS_CHANGED,
            Self::DeviceError { .. } => events::DEVICE_ERROR,
            Self::ControlModeChanged { .. } => events::CONTROL_MODE_CHANGED,
        }
    }

    pub fn wrap_cmd_uuid(&self) -> Option<Uuid> {
        match self {
            Self::WrapCommandStepChanged { wrap_cmd_uuid, .. }
            | Self::CommandCompleted { wrap_cmd_uuid, .. } => Some(*wrap_cmd_uuid),
            _ => None,
        }
    }
}
