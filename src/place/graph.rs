//! Place graph arena.
//!
//! Nodes live in one table keyed by node id. Places, loggers, rank lists and
//! threshold goals only ever hold ids and look nodes up through the graph, so
//! a data update touches exactly one record.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::config::{ConfigResult, FlowRouteConfig, PresetConfig, TopologyConfig};
use crate::constants::NodeStatus;
use crate::models::{NodeId, NodeValue, PlaceId, PlaceNode, PlaceStorage};
use crate::place::status;

/// Immutable-topology, mutable-value view of the field
#[derive(Debug, Clone, Default)]
pub struct PlaceGraph {
    places: BTreeMap<PlaceId, PlaceStorage>,
    nodes: HashMap<NodeId, PlaceNode>,
    loggers: BTreeMap<String, Vec<NodeId>>,
    flow_routes: HashMap<(PlaceId, PlaceId), FlowRouteConfig>,
    set_commands: HashMap<String, PresetConfig>,
    scenarios: HashMap<String, PresetConfig>,
    /// Last evaluated status per node, used to detect status changes
    statuses: HashMap<NodeId, NodeStatus>,
}

impl PlaceGraph {
    /// One-time load from a topology snapshot
    pub fn from_topology(topology: &TopologyConfig) -> ConfigResult<Self> {
        topology.validate()?;

        let mut graph = Self::default();
        for place in &topology.places {
            let mut storage = PlaceStorage {
                place_id: place.id.clone(),
                name: place.name.clone().unwrap_or_else(|| place.id.clone()),
                kind: place.kind,
                area_m2: place.area_m2,
                nodes: BTreeMap::new(),
                drain_actuators: place.drain_actuators.clone(),
                fill_actuators: place.fill_actuators.clone(),
            };
            for node in &place.nodes {
                storage
                    .nodes
                    .insert(node.node_def_id.clone(), node.node_id.clone());
                graph.nodes.insert(
                    node.node_id.clone(),
                    PlaceNode {
                        node_id: node.node_id.clone(),
                        node_def_id: node.node_def_id.clone(),
                        place_id: place.id.clone(),
                        device_kind: node.device_kind,
                        value: None,
                        write_date: None,
                        device_error: None,
                        thresholds: node.thresholds.clone(),
                        call_places: node.call_places.clone(),
                        put_places: node.put_places.clone(),
                    },
                );
            }
            graph.places.insert(place.id.clone(), storage);
        }

        for logger in &topology.data_loggers {
            graph
                .loggers
                .insert(logger.id.clone(), logger.node_ids.clone());
        }
        for route in &topology.flow_routes {
            graph
                .flow_routes
                .insert((route.src.clone(), route.dest.clone()), route.clone());
        }
        for preset in &topology.set_commands {
            graph.set_commands.insert(preset.id.clone(), preset.clone());
        }
        for preset in &topology.scenarios {
            graph.scenarios.insert(preset.id.clone(), preset.clone());
        }

        info!(
            places = graph.places.len(),
            nodes = graph.nodes.len(),
            loggers = graph.loggers.len(),
            "Place graph loaded"
        );
        Ok(graph)
    }

    pub fn find_place(&self, place_id: &str) -> Option<&PlaceStorage> {
        self.places.get(place_id)
    }

    pub fn places(&self) -> impl Iterator<Item = &PlaceStorage> {
        self.places.values()
    }

    /// Node of `place` bound to `node_def_id`
    pub fn get_place_node(&self, place_id: &str, node_def_id: &str) -> Option<&PlaceNode> {
        self.find_place(place_id)
            .and_then(|place| place.node_id_for(node_def_id))
            .and_then(|node_id| self.nodes.get(node_id))
    }

    pub fn node(&self, node_id: &str) -> Option<&PlaceNode> {
        self.nodes.get(node_id)
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PlaceNode> {
        self.nodes.values()
    }

    /// Places able to supply `node_id`, best first
    pub fn get_call_rank_list(&self, node_id: &str) -> &[PlaceId] {
        self.nodes
            .get(node_id)
            .map(|node| node.call_places.as_slice())
            .unwrap_or(&[])
    }

    /// Places able to receive from `node_id`, best first
    pub fn get_put_rank_list(&self, node_id: &str) -> &[PlaceId] {
        self.nodes
            .get(node_id)
            .map(|node| node.put_places.as_slice())
            .unwrap_or(&[])
    }

    pub fn square_meters(&self, place_id: &str) -> Option<f64> {
        self.find_place(place_id).and_then(|place| place.area_m2)
    }

    pub fn logger_nodes(&self, logger_id: &str) -> Option<&[NodeId]> {
        self.loggers.get(logger_id).map(Vec::as_slice)
    }

    pub fn logger_ids(&self) -> impl Iterator<Item = &String> {
        self.loggers.keys()
    }

    pub fn flow_route(&self, src: &str, dest: &str) -> Option<&FlowRouteConfig> {
        self.flow_routes.get(&(src.to_string(), dest.to_string()))
    }

    pub fn set_command(&self, preset_id: &str) -> Option<&PresetConfig> {
        self.set_commands.get(preset_id)
    }

    pub fn scenario(&self, preset_id: &str) -> Option<&PresetConfig> {
        self.scenarios.get(preset_id)
    }

    /// Current status of a node, `None` for unknown ids
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.get(node_id).map(status::evaluate)
    }

    /// Status of `place`'s node bound to `node_def_id`
    pub fn place_status(&self, place_id: &str, node_def_id: &str) -> Option<NodeStatus> {
        self.get_place_node(place_id, node_def_id)
            .map(status::evaluate)
    }

    /// Store a data update; returns the status transition when the status changed
    pub fn apply_update(
        &mut self,
        node_id: &str,
        value: Option<NodeValue>,
        timestamp: DateTime<Utc>,
    ) -> Option<StatusChange> {
        let node = self.nodes.get_mut(node_id)?;
        node.apply_update(value, timestamp);
        let current = status::evaluate(node);
        self.record_status(node_id, current)
    }

    /// Flag a device error on the node; returns the status transition when the status changed
    pub fn mark_error(&mut self, node_id: &str, message: &str) -> Option<StatusChange> {
        let node = self.nodes.get_mut(node_id)?;
        node.mark_error(message);
        let current = status::evaluate(node);
        self.record_status(node_id, current)
    }

    /// Re-evaluate a node without changing its value
    pub fn refresh_status(&mut self, node_id: &str) -> Option<StatusChange> {
        let current = status::evaluate(self.nodes.get(node_id)?);
        self.record_status(node_id, current)
    }

    fn record_status(&mut self, node_id: &str, current: NodeStatus) -> Option<StatusChange> {
        let previous = self.statuses.insert(node_id.to_string(), current);
        if previous == Some(current) {
            return None;
        }
        debug!(node_id = %node_id, from = ?previous, to = %current, "Node status changed");
        Some(StatusChange {
            node_id: node_id.to_string(),
            from: previous,
            to: current,
        })
    }
}

/// A node's derived status moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub node_id: NodeId,
    pub from: Option<NodeStatus>,
    pub to: NodeStatus,
}
