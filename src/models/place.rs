//! Place and place-node data.
//!
//! A [`PlaceStorage`] is a physical location (reservoir, evaporation pond,
//! brine warehouse). It references its [`PlaceNode`]s by id only; the nodes
//! themselves live in the place graph's arena.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::PlaceKind;
use crate::constants::{ControlValue, DeviceKind};
use crate::models::command::SetPoint;

pub type NodeId = String;
pub type PlaceId = String;

/// Live value reported by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    Number(f64),
    Text(String),
}

const TRUE_WORDS: &[&str] = &["1", "on", "open", "opening", "true", "run", "running"];
const FALSE_WORDS: &[&str] = &["0", "off", "close", "closed", "closing", "false", "stop"];

impl NodeValue {
    /// Numeric view of the value; numeric strings parse
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Whether a device reporting this value already holds `control_value`
    pub fn satisfies_control(&self, control_value: ControlValue, set_value: Option<SetPoint>) -> bool {
        match control_value {
            ControlValue::True => self.matches_words(TRUE_WORDS),
            ControlValue::False => self.matches_words(FALSE_WORDS),
            ControlValue::Set => match (self.as_number(), set_value) {
                (Some(current), Some(target)) => (current - target.0).abs() < f64::EPSILON,
                _ => false,
            },
            ControlValue::Measure => false,
        }
    }

    fn matches_words(&self, words: &[&str]) -> bool {
        let text = self.as_text().trim().to_ascii_lowercase();
        words.iter().any(|w| *w == text)
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Configured thresholds, every bound optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub max: Option<f64>,
    pub upper_limit: Option<f64>,
    pub set: Option<f64>,
    pub lower_limit: Option<f64>,
    pub min: Option<f64>,
}

impl Thresholds {
    /// Bounds must be ordered max >= upper_limit >= lower_limit >= min where present
    pub fn is_ordered(&self) -> bool {
        let bounds: Vec<f64> = [self.max, self.upper_limit, self.lower_limit, self.min]
            .into_iter()
            .flatten()
            .collect();
        bounds.windows(2).all(|w| w[0] >= w[1])
    }
}

/// One sensor or actuator reading location within a place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceNode {
    pub node_id: NodeId,
    pub node_def_id: String,
    pub place_id: PlaceId,
    pub device_kind: DeviceKind,
    pub value: Option<NodeValue>,
    pub write_date: Option<DateTime<Utc>>,
    /// Error condition last reported by the device layer
    pub device_error: Option<String>,
    pub thresholds: Thresholds,
    /// Places that can supply this node when it runs low, best first
    pub call_places: Vec<PlaceId>,
    /// Places that can receive from this node when it runs high, best first
    pub put_places: Vec<PlaceId>,
}

impl PlaceNode {
    pub fn apply_update(&mut self, value: Option<NodeValue>, timestamp: DateTime<Utc>) {
        self.value = value;
        self.write_date = Some(timestamp);
        self.device_error = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.device_error = Some(message.into());
    }

    pub fn is_actuator(&self) -> bool {
        self.device_kind.is_actuator()
    }
}

/// A physical location owning a set of nodes keyed by node definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceStorage {
    pub place_id: PlaceId,
    pub name: String,
    pub kind: PlaceKind,
    pub area_m2: Option<f64>,
    /// node_def_id -> node_id, at most one node per definition
    pub nodes: BTreeMap<String, NodeId>,
    /// Actuators that move brine out of this place
    pub drain_actuators: Vec<NodeId>,
    /// Actuators that move brine into this place
    pub fill_actuators: Vec<NodeId>,
}

impl PlaceStorage {
    pub fn node_id_for(&self, node_def_id: &str) -> Option<&NodeId> {
        self.nodes.get(node_def_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_strings_parse() {
        assert_eq!(NodeValue::from("12.5").as_number(), Some(12.5));
        assert_eq!(NodeValue::from("OPEN").as_number(), None);
        assert_eq!(NodeValue::Number(3.0).as_number(), Some(3.0));
    }

    #[test]
    fn test_binary_control_matching() {
        assert!(NodeValue::from("OPEN").satisfies_control(ControlValue::True, None));
        assert!(NodeValue::Number(1.0).satisfies_control(ControlValue::True, None));
        assert!(NodeValue::from("closed").satisfies_control(ControlValue::False, None));
        assert!(!NodeValue::from("closed").satisfies_control(ControlValue::True, None));
        assert!(!NodeValue::from("1").satisfies_control(ControlValue::Measure, None));
    }

    #[test]
    fn test_set_point_matching() {
        let value = NodeValue::Number(42.0);
        assert!(value.satisfies_control(ControlValue::Set, Some(SetPoint(42.0))));
        assert!(!value.satisfies_control(ControlValue::Set, Some(SetPoint(40.0))));
        assert!(!value.satisfies_control(ControlValue::Set, None));
    }

    #[test]
    fn test_threshold_ordering() {
        let ordered = Thresholds {
            max: Some(10.0),
            upper_limit: Some(8.0),
            set: Some(5.0),
            lower_limit: Some(2.0),
            min: Some(1.0),
        };
        assert!(ordered.is_ordered());

        let inverted = Thresholds {
            max: Some(1.0),
            min: Some(5.0),
            ..Default::default()
        };
        assert!(!inverted.is_ordered());
        assert!(Thresholds::default().is_ordered());
    }

    #[test]
    fn test_update_clears_device_error() {
        let mut node = PlaceNode {
            node_id: "WL_1".into(),
            node_def_id: "waterLevel".into(),
            place_id: "R1".into(),
            device_kind: DeviceKind::Sensor,
            value: None,
            write_date: None,
            device_error: None,
            thresholds: Thresholds::default(),
            call_places: vec![],
            put_places: vec![],
        };
        node.mark_error("timeout");
        assert!(node.device_error.is_some());
        node.apply_update(Some(NodeValue::Number(4.0)), Utc::now());
        assert!(node.device_error.is_none());
        assert!(node.write_date.is_some());
    }
}
