//! Command requests and the wrap/container/element command hierarchy.
//!
//! A [`CommandRequest`] is what the API layer submits. The command manager
//! refines it into a [`WrapCommandSpec`] (a flat list of containers), and the
//! hierarchy turns that into a live [`WrapCommand`] owning its
//! [`ContainerCommand`]s, which own their [`ElementCommand`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::constants::{ControlValue, DeviceKind};
use crate::models::goal::GoalInfo;
use crate::models::place::{NodeId, PlaceId};
use crate::state_machine::WrapCommandStep;

/// Numeric set-point carried by SET control values, hashable by bit pattern
#[derive(Debug, Clone, Copy, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetPoint(pub f64);

impl SetPoint {
    fn normalized_bits(&self) -> u64 {
        if self.0 == 0.0 {
            0.0f64.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for SetPoint {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_bits() == other.normalized_bits()
    }
}

impl Eq for SetPoint {}

impl Hash for SetPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_bits().hash(state);
    }
}

impl fmt::Display for SetPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of a logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandFormat {
    Single,
    Set,
    Flow,
    Scenario,
}

/// Intent of a logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Control,
    Cancel,
    Measure,
    Restore,
}

impl fmt::Display for CommandFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "SINGLE"),
            Self::Set => write!(f, "SET"),
            Self::Flow => write!(f, "FLOW"),
            Self::Scenario => write!(f, "SCENARIO"),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "CONTROL"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::Measure => write!(f, "MEASURE"),
            Self::Restore => write!(f, "RESTORE"),
        }
    }
}

/// What a request addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum CommandTarget {
    Single {
        node_id: NodeId,
        control_value: ControlValue,
        #[serde(default)]
        set_value: Option<SetPoint>,
    },
    Set {
        preset_id: String,
    },
    Flow {
        src_place_id: PlaceId,
        dest_place_id: PlaceId,
    },
    Scenario {
        preset_id: String,
    },
    /// Measurement sweep over data loggers, every logger when empty
    Measure {
        #[serde(default)]
        logger_ids: Vec<String>,
    },
}

impl CommandTarget {
    pub fn format(&self) -> CommandFormat {
        match self {
            Self::Single { .. } => CommandFormat::Single,
            Self::Set { .. } => CommandFormat::Set,
            Self::Flow { .. } => CommandFormat::Flow,
            Self::Scenario { .. } => CommandFormat::Scenario,
            Self::Measure { logger_ids } if logger_ids.len() == 1 => CommandFormat::Single,
            Self::Measure { .. } => CommandFormat::Set,
        }
    }
}

/// A logical request as submitted by the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub target: CommandTarget,
    pub cmd_type: CommandType,
    /// Logical id; derived from the target when absent
    #[serde(default)]
    pub wrap_cmd_id: Option<String>,
    #[serde(default)]
    pub wrap_cmd_name: Option<String>,
    #[serde(default)]
    pub rank: Option<u8>,
    #[serde(default)]
    pub goal: Option<GoalInfo>,
}

impl CommandRequest {
    pub fn control(target: CommandTarget) -> Self {
        Self {
            target,
            cmd_type: CommandType::Control,
            wrap_cmd_id: None,
            wrap_cmd_name: None,
            rank: None,
            goal: None,
        }
    }

    pub fn single(node_id: impl Into<NodeId>, control_value: ControlValue) -> Self {
        Self::control(CommandTarget::Single {
            node_id: node_id.into(),
            control_value,
            set_value: None,
        })
    }

    pub fn flow(src_place_id: impl Into<PlaceId>, dest_place_id: impl Into<PlaceId>) -> Self {
        Self::control(CommandTarget::Flow {
            src_place_id: src_place_id.into(),
            dest_place_id: dest_place_id.into(),
        })
    }

    pub fn measure(wrap_cmd_id: impl Into<String>, logger_ids: Vec<String>) -> Self {
        Self {
            target: CommandTarget::Measure { logger_ids },
            cmd_type: CommandType::Measure,
            wrap_cmd_id: Some(wrap_cmd_id.into()),
            wrap_cmd_name: None,
            rank: None,
            goal: None,
        }
    }

    pub fn with_type(mut self, cmd_type: CommandType) -> Self {
        self.cmd_type = cmd_type;
        self
    }

    pub fn with_id(mut self, wrap_cmd_id: impl Into<String>) -> Self {
        self.wrap_cmd_id = Some(wrap_cmd_id.into());
        self
    }

    pub fn with_rank(mut self, rank: u8) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_goal(mut self, goal: GoalInfo) -> Self {
        self.goal = Some(goal);
        self
    }
}

/// A group of targets sharing one control value (and set value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub control_value: ControlValue,
    #[serde(default)]
    pub set_value: Option<SetPoint>,
    pub node_ids: Vec<NodeId>,
}

impl ContainerSpec {
    pub fn new(control_value: ControlValue, node_ids: Vec<NodeId>) -> Self {
        Self {
            control_value,
            set_value: None,
            node_ids,
        }
    }
}

/// A refined request: everything needed to build the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapCommandSpec {
    pub wrap_cmd_id: String,
    pub wrap_cmd_name: String,
    pub format: CommandFormat,
    pub cmd_type: CommandType,
    pub rank: u8,
    pub goal: Option<GoalInfo>,
    pub src_place_id: Option<PlaceId>,
    pub dest_place_id: Option<PlaceId>,
    pub containers: Vec<ContainerSpec>,
}

impl WrapCommandSpec {
    /// Every (node, control value, set value) tuple the containers touch
    pub fn tuples(&self) -> impl Iterator<Item = (&NodeId, ControlValue, Option<SetPoint>)> {
        self.containers.iter().flat_map(|container| {
            container
                .node_ids
                .iter()
                .map(move |node_id| (node_id, container.control_value, container.set_value))
        })
    }

    pub fn element_count(&self) -> usize {
        self.containers.iter().map(|c| c.node_ids.len()).sum()
    }
}

/// Atomic command addressed to exactly one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCommand {
    pub element_id: Uuid,
    pub node_id: NodeId,
    pub device_kind: DeviceKind,
    pub control_value: ControlValue,
    pub set_value: Option<SetPoint>,
    /// Deemed unnecessary by the strategy; never dispatched, counts as complete
    pub ignored: bool,
    pub is_complete: bool,
    /// Last device error reported for this element, it stays pending until a terminal ack
    pub error: Option<String>,
}

impl ElementCommand {
    pub fn new(
        node_id: impl Into<NodeId>,
        device_kind: DeviceKind,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
    ) -> Self {
        Self {
            element_id: Uuid::new_v4(),
            node_id: node_id.into(),
            device_kind,
            control_value,
            set_value,
            ignored: false,
            is_complete: false,
            error: None,
        }
    }

    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self.is_complete = true;
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.ignored && !self.is_complete
    }
}

/// Elements sharing one control value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerCommand {
    pub control_value: ControlValue,
    pub set_value: Option<SetPoint>,
    pub elements: Vec<ElementCommand>,
}

impl ContainerCommand {
    pub fn new(control_value: ControlValue, set_value: Option<SetPoint>) -> Self {
        Self {
            control_value,
            set_value,
            elements: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.elements.iter().all(|e| e.is_complete)
    }
}

/// Result of marking one element complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCompletion {
    /// Element was newly completed
    Completed { all_complete: bool },
    /// Element had already completed, nothing changed
    AlreadyComplete,
    /// No such element under this wrap command
    Unknown,
}

/// One logical request in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapCommand {
    /// Unique token (the WCU) recorded against actuator tuples
    pub wrap_cmd_uuid: Uuid,
    pub wrap_cmd_id: String,
    pub wrap_cmd_name: String,
    pub format: CommandFormat,
    pub cmd_type: CommandType,
    pub rank: u8,
    pub step: WrapCommandStep,
    pub goal: Option<GoalInfo>,
    pub src_place_id: Option<PlaceId>,
    pub dest_place_id: Option<PlaceId>,
    pub containers: Vec<ContainerCommand>,
    /// Tuples this command depends on while CONTROL, retained after cancellation
    pub control_tuples: Vec<(NodeId, ControlValue, Option<SetPoint>)>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WrapCommand {
    pub fn new(spec: &WrapCommandSpec, containers: Vec<ContainerCommand>) -> Self {
        let control_tuples = if spec.cmd_type == CommandType::Control {
            spec.tuples()
                .map(|(node_id, cv, sv)| (node_id.clone(), cv, sv))
                .collect()
        } else {
            Vec::new()
        };
        let now = Utc::now();

        Self {
            wrap_cmd_uuid: Uuid::new_v4(),
            wrap_cmd_id: spec.wrap_cmd_id.clone(),
            wrap_cmd_name: spec.wrap_cmd_name.clone(),
            format: spec.format,
            cmd_type: spec.cmd_type,
            rank: spec.rank,
            step: WrapCommandStep::Wait,
            goal: spec.goal.clone(),
            src_place_id: spec.src_place_id.clone(),
            dest_place_id: spec.dest_place_id.clone(),
            containers,
            control_tuples,
            created_at: now,
            updated_at: now,
        }
    }

    /// Complete iff every element under every container reports complete
    pub fn is_complete(&self) -> bool {
        self.containers.iter().all(ContainerCommand::is_complete)
    }

    pub fn has_live_goal(&self) -> bool {
        self.cmd_type == CommandType::Control
            && self.goal.as_ref().map(GoalInfo::is_live).unwrap_or(false)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementCommand> {
        self.containers.iter().flat_map(|c| c.elements.iter())
    }

    pub fn pending_elements(&self) -> impl Iterator<Item = &ElementCommand> {
        self.elements().filter(|e| e.is_pending())
    }

    pub fn element(&self, element_id: Uuid) -> Option<&ElementCommand> {
        self.elements().find(|e| e.element_id == element_id)
    }

    pub fn element_mut(&mut self, element_id: Uuid) -> Option<&mut ElementCommand> {
        self.containers
            .iter_mut()
            .flat_map(|c| c.elements.iter_mut())
            .find(|e| e.element_id == element_id)
    }

    pub fn complete_element(&mut self, element_id: Uuid) -> ElementCompletion {
        let outcome = match self.element_mut(element_id) {
            None => return ElementCompletion::Unknown,
            Some(element) if element.is_complete => return ElementCompletion::AlreadyComplete,
            Some(element) => {
                element.is_complete = true;
                element.error = None;
                ElementCompletion::Completed { all_complete: false }
            }
        };
        self.updated_at = Utc::now();
        match outcome {
            ElementCompletion::Completed { .. } => ElementCompletion::Completed {
                all_complete: self.is_complete(),
            },
            other => other,
        }
    }

    /// Replace the element set, used when a cancellation dispatches restore elements
    pub fn replace_containers(&mut self, containers: Vec<ContainerCommand>) -> Vec<ContainerCommand> {
        self.updated_at = Utc::now();
        std::mem::replace(&mut self.containers, containers)
    }
}
