//! Topology snapshot: places, nodes, data loggers, flow routes and presets.
//!
//! Loaded once at startup; the place graph is built from it and never
//! changes membership afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use crate::constants::DeviceKind;
use crate::models::{ContainerSpec, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    #[default]
    Reservoir,
    EvaporationPond,
    BrineWarehouse,
    Sea,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub node_def_id: String,
    #[serde(default)]
    pub device_kind: DeviceKind,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub call_places: Vec<String>,
    #[serde(default)]
    pub put_places: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: PlaceKind,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub drain_actuators: Vec<String>,
    #[serde(default)]
    pub fill_actuators: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLoggerConfig {
    pub id: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

/// Explicit actuator list for moving brine from `src` to `dest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRouteConfig {
    pub src: String,
    pub dest: String,
    /// Actuators driven TRUE, in any order
    #[serde(default)]
    pub open: Vec<String>,
    /// Actuators driven FALSE so the route does not leak elsewhere
    #[serde(default)]
    pub close: Vec<String>,
}

/// Named container list used by SET and SCENARIO requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub places: Vec<PlaceConfig>,
    pub data_loggers: Vec<DataLoggerConfig>,
    pub flow_routes: Vec<FlowRouteConfig>,
    pub set_commands: Vec<PresetConfig>,
    pub scenarios: Vec<PresetConfig>,
}

impl TopologyConfig {
    pub fn from_toml_str(source: &str, origin: &str) -> ConfigResult<Self> {
        let topology: TopologyConfig =
            toml::from_str(source).map_err(|e| ConfigurationError::invalid_toml(origin, e))?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;
        debug!(path = %path.display(), "Parsing topology snapshot");
        Self::from_toml_str(&source, &path.display().to_string())
    }

    /// Cross-reference checks; topology is immutable after this passes
    pub fn validate(&self) -> ConfigResult<()> {
        let mut place_ids = HashSet::new();
        let mut node_kinds: HashMap<&str, DeviceKind> = HashMap::new();

        for place in &self.places {
            if !place_ids.insert(place.id.as_str()) {
                return Err(ConfigurationError::duplicate("place", &place.id));
            }
            let mut defs = HashSet::new();
            for node in &place.nodes {
                if !defs.insert(node.node_def_id.as_str()) {
                    return Err(ConfigurationError::duplicate(
                        "node definition",
                        format!("{}/{}", place.id, node.node_def_id),
                    ));
                }
                if node_kinds.insert(node.node_id.as_str(), node.device_kind).is_some() {
                    return Err(ConfigurationError::duplicate("node", &node.node_id));
                }
                if !node.thresholds.is_ordered() {
                    return Err(ConfigurationError::invalid_value(
                        "thresholds",
                        format!("{:?}", node.thresholds),
                        format!("bounds of node {} are not ordered max >= min", node.node_id),
                    ));
                }
            }
        }

        for place in &self.places {
            for node in &place.nodes {
                for rank_place in node.call_places.iter().chain(&node.put_places) {
                    if !place_ids.contains(rank_place.as_str()) {
                        return Err(ConfigurationError::unknown_reference(
                            "place",
                            rank_place,
                            format!("rank list of node {}", node.node_id),
                        ));
                    }
                }
            }
            for actuator in place.drain_actuators.iter().chain(&place.fill_actuators) {
                Self::require_actuator(&node_kinds, actuator, &format!("place {}", place.id))?;
            }
        }

        for logger in &self.data_loggers {
            for node_id in &logger.node_ids {
                if !node_kinds.contains_key(node_id.as_str()) {
                    return Err(ConfigurationError::unknown_reference(
                        "node",
                        node_id,
                        format!("data logger {}", logger.id),
                    ));
                }
            }
        }

        for route in &self.flow_routes {
            let origin = format!("flow route {}_TO_{}", route.src, route.dest);
            for place_id in [&route.src, &route.dest] {
                if !place_ids.contains(place_id.as_str()) {
                    return Err(ConfigurationError::unknown_reference(
                        "place", place_id, &origin,
                    ));
                }
            }
            for actuator in route.open.iter().chain(&route.close) {
                Self::require_actuator(&node_kinds, actuator, &origin)?;
            }
        }

        for preset in self.set_commands.iter().chain(&self.scenarios) {
            for container in &preset.containers {
                for node_id in &container.node_ids {
                    if !node_kinds.contains_key(node_id.as_str()) {
                        return Err(ConfigurationError::unknown_reference(
                            "node",
                            node_id,
                            format!("preset {}", preset.id),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn require_actuator(
        node_kinds: &HashMap<&str, DeviceKind>,
        node_id: &str,
        origin: &str,
    ) -> ConfigResult<()> {
        match node_kinds.get(node_id) {
            None => Err(ConfigurationError::unknown_reference("node", node_id, origin)),
            Some(kind) if !kind.is_actuator() => Err(ConfigurationError::invalid_value(
                "device_kind",
                "sensor",
                format!("node {node_id} used as actuator by {origin}"),
            )),
            Some(_) => Ok(()),
        }
    }
}
