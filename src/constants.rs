//! # System Constants
//!
//! Discrete vocabularies shared by every layer of the engine: node statuses,
//! device control values, device kinds, operating modes and the names of the
//! lifecycle events published on the event feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle event names, stable for UI/telemetry consumers
pub mod events {
    pub const WRAP_COMMAND_STEP_CHANGED: &str = "wrap_command.step_changed";
    pub const COMMAND_COMPLETED: &str = "wrap_command.completed";
    pub const COMMAND_REJECTED: &str = "wrap_command.rejected";
    pub const NODE_STATUS_CHANGED: &str = "node.status_changed";
    pub const DEVICE_ERROR: &str = "device.error";
    pub const CONTROL_MODE_CHANGED: &str = "engine.control_mode_changed";
}

/// Discrete classification of a place node against its thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    MaxOver,
    UpperLimitOver,
    Normal,
    LowerLimitUnder,
    MinUnder,
    Unknown,
    Error,
}

impl NodeStatus {
    /// A place in this status can accept more brine
    pub fn can_receive(&self) -> bool {
        !matches!(
            self,
            Self::MaxOver | Self::UpperLimitOver | Self::Unknown | Self::Error
        )
    }

    /// A place in this status can give brine away
    pub fn can_supply(&self) -> bool {
        !matches!(
            self,
            Self::MinUnder | Self::LowerLimitUnder | Self::Unknown | Self::Error
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxOver => write!(f, "MAX_OVER"),
            Self::UpperLimitOver => write!(f, "UPPER_LIMIT_OVER"),
            Self::Normal => write!(f, "NORMAL"),
            Self::LowerLimitUnder => write!(f, "LOWER_LIMIT_UNDER"),
            Self::MinUnder => write!(f, "MIN_UNDER"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Target state requested from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlValue {
    /// Close / stop / de-energize
    False,
    /// Open / run / energize
    True,
    /// Read the current value from a data logger
    Measure,
    /// Drive to a numeric set-point
    Set,
}

impl ControlValue {
    /// The value that undoes this one, if any
    pub fn inverse(&self) -> Option<Self> {
        match self {
            Self::True => Some(Self::False),
            Self::False => Some(Self::True),
            Self::Measure | Self::Set => None,
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::False => write!(f, "false"),
            Self::True => write!(f, "true"),
            Self::Measure => write!(f, "measure"),
            Self::Set => write!(f, "set"),
        }
    }
}

impl std::str::FromStr for ControlValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "false" | "0" => Ok(Self::False),
            "true" | "1" => Ok(Self::True),
            "measure" | "2" => Ok(Self::Measure),
            "set" | "3" => Ok(Self::Set),
            _ => Err(format!("Invalid control value: {s}")),
        }
    }
}

/// Physical kind of a node's device, drives command ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Valve,
    Gate,
    Pump,
    #[default]
    Sensor,
}

impl DeviceKind {
    pub fn is_actuator(&self) -> bool {
        !matches!(self, Self::Sensor)
    }

    /// Sort key when energizing: valves and gates open before pumps start
    pub fn activation_order(&self) -> u8 {
        match self {
            Self::Valve | Self::Gate => 0,
            Self::Pump => 1,
            Self::Sensor => 2,
        }
    }

    /// Sort key when de-energizing: pumps stop before valves and gates close
    pub fn deactivation_order(&self) -> u8 {
        match self {
            Self::Pump => 0,
            Self::Valve | Self::Gate => 1,
            Self::Sensor => 2,
        }
    }
}

/// Operating mode of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Operator-driven, no overlap bookkeeping, no autonomous reactions
    #[default]
    Manual,
    /// Operator-driven with overlap-aware conflict resolution
    Overlap,
    /// Overlap-aware with autonomous reactions to node status changes
    Automatic,
}

impl ControlMode {
    pub fn uses_overlap(&self) -> bool {
        !matches!(self, Self::Manual)
    }

    pub fn reacts_to_status(&self) -> bool {
        matches!(self, Self::Automatic)
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Overlap => write!(f, "overlap"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

impl std::str::FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "overlap" => Ok(Self::Overlap),
            "automatic" => Ok(Self::Automatic),
            _ => Err(format!("Invalid control mode: {s}")),
        }
    }
}

/// Default priority rank for commands without an explicit rank
pub const DEFAULT_RANK: u8 = 2;

/// Logical id used for the scheduled measurement sweep
pub const INQUIRY_ALL_ID: &str = "inquiryAll";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_flow_eligibility() {
        assert!(NodeStatus::Normal.can_receive());
        assert!(NodeStatus::LowerLimitUnder.can_receive());
        assert!(!NodeStatus::UpperLimitOver.can_receive());
        assert!(!NodeStatus::MaxOver.can_receive());
        assert!(NodeStatus::UpperLimitOver.can_supply());
        assert!(!NodeStatus::MinUnder.can_supply());
        assert!(!NodeStatus::Unknown.can_supply());
    }

    #[test]
    fn test_control_value_parsing_and_inverse() {
        assert_eq!("TRUE".parse::<ControlValue>().unwrap(), ControlValue::True);
        assert_eq!("0".parse::<ControlValue>().unwrap(), ControlValue::False);
        assert!("open".parse::<ControlValue>().is_err());
        assert_eq!(ControlValue::True.inverse(), Some(ControlValue::False));
        assert_eq!(ControlValue::Set.inverse(), None);
    }

    #[test]
    fn test_device_ordering_is_mirrored() {
        assert!(DeviceKind::Valve.activation_order() < DeviceKind::Pump.activation_order());
        assert!(DeviceKind::Pump.deactivation_order() < DeviceKind::Valve.deactivation_order());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&NodeStatus::UpperLimitOver).unwrap();
        assert_eq!(json, "\"UPPER_LIMIT_OVER\"");
        assert_eq!(NodeStatus::MinUnder.to_string(), "MIN_UNDER");
    }
}
