//! # Device Layer Boundary
//!
//! Outbound element commands go through [`DeviceLink::dispatch_element`],
//! which is fire-and-forget: the result is observed later as an
//! [`ElementAck`], a [`NodeUpdate`] or a [`DeviceErrorReport`] fed back into
//! the engine's single dispatch context.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::constants::ControlValue;
use crate::error::{EngineError, EngineResult};
use crate::models::{NodeId, NodeValue, SetPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceAction {
    /// Drive the device to the element's control value
    Execute,
    /// Pull a not-yet-complete element from the device queue
    Cancel,
}

/// One element command as handed to the device layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub action: DeviceAction,
    pub element_id: Uuid,
    pub wrap_cmd_uuid: Uuid,
    pub node_id: NodeId,
    pub control_value: ControlValue,
    pub set_value: Option<SetPoint>,
    pub rank: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckKind {
    Start,
    Terminate,
    Delete,
}

impl AckKind {
    /// TERMINATE and DELETE both end the element
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate | Self::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAck {
    pub element_id: Uuid,
    pub kind: AckKind,
}

impl ElementAck {
    pub fn start(element_id: Uuid) -> Self {
        Self {
            element_id,
            kind: AckKind::Start,
        }
    }

    pub fn terminate(element_id: Uuid) -> Self {
        Self {
            element_id,
            kind: AckKind::Terminate,
        }
    }

    pub fn delete(element_id: Uuid) -> Self {
        Self {
            element_id,
            kind: AckKind::Delete,
        }
    }
}

/// Data update for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: NodeId,
    pub value: Option<NodeValue>,
    pub timestamp: DateTime<Utc>,
}

impl NodeUpdate {
    pub fn new(node_id: impl Into<NodeId>, value: impl Into<NodeValue>) -> Self {
        Self {
            node_id: node_id.into(),
            value: Some(value.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Disconnect, timeout or rejection reported by the device layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceErrorReport {
    pub node_id: Option<NodeId>,
    pub element_id: Option<Uuid>,
    pub message: String,
}

/// Outbound side of the device layer
pub trait DeviceLink: Send + Sync + std::fmt::Debug {
    fn dispatch_element(&self, command: DeviceCommand) -> EngineResult<()>;
}

/// Forwards commands to a device session task over a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelDeviceLink {
    sender: mpsc::Sender<DeviceCommand>,
}

impl ChannelDeviceLink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<DeviceCommand>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

impl DeviceLink for ChannelDeviceLink {
    fn dispatch_element(&self, command: DeviceCommand) -> EngineResult<()> {
        self.sender.try_send(command).map_err(|e| {
            warn!(error = %e, "Device channel rejected element command");
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    EngineError::Device("device queue is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    EngineError::ChannelClosed("device link".to_string())
                }
            }
        })
    }
}

/// Keeps every dispatched command in memory
#[derive(Debug, Default)]
pub struct RecordingDeviceLink {
    sent: Mutex<Vec<DeviceCommand>>,
}

impl RecordingDeviceLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DeviceCommand> {
        self.sent.lock().clone()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<DeviceCommand> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn executed_for(&self, wrap_cmd_uuid: Uuid) -> Vec<DeviceCommand> {
        self.sent
            .lock()
            .iter()
            .filter(|c| c.wrap_cmd_uuid == wrap_cmd_uuid && c.action == DeviceAction::Execute)
            .cloned()
            .collect()
    }
}

impl DeviceLink for RecordingDeviceLink {
    fn dispatch_element(&self, command: DeviceCommand) -> EngineResult<()> {
        self.sent.lock().push(command);
        Ok(())
    }
}
