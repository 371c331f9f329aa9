//! # Control Algorithm
//!
//! Autonomous reactions to node status changes. The algorithm never touches
//! engine state: it reads the place graph and the active commands and returns
//! [`AlgorithmAction`]s that the command manager executes through its public
//! entry points.
//!
//! Only water-level nodes drive flows. Eligible places are picked from the
//! node's rank lists in order; the first eligible place wins.

use tracing::{debug, info, warn};

use crate::config::AlgorithmConfig;
use crate::constants::{ControlMode, NodeStatus};
use crate::models::{
    CommandFormat, CommandType, Goal, GoalInfo, GoalRange, PlaceId, PlaceNode, WrapCommand,
};
use crate::place::PlaceGraph;

#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmAction {
    CancelCommand {
        wrap_cmd_id: String,
    },
    ExecuteFlow {
        src_place_id: PlaceId,
        dest_place_id: PlaceId,
        goal: Option<GoalInfo>,
    },
}

#[derive(Debug, Clone)]
pub struct ControlAlgorithm {
    mode: ControlMode,
    settings: AlgorithmConfig,
}

impl ControlAlgorithm {
    pub fn new(mode: ControlMode, settings: AlgorithmConfig) -> Self {
        Self { mode, settings }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Switch mode, returning the previous one
    pub fn set_mode(&mut self, mode: ControlMode) -> ControlMode {
        std::mem::replace(&mut self.mode, mode)
    }

    /// Dispatch a node's new status to the matching handler
    pub fn on_node_update<'a>(
        &self,
        node: &PlaceNode,
        status: NodeStatus,
        graph: &PlaceGraph,
        active: impl Iterator<Item = &'a WrapCommand>,
    ) -> Vec<AlgorithmAction> {
        if !self.mode.reacts_to_status() {
            return Vec::new();
        }
        if node.node_def_id != self.settings.water_level_node_def {
            if node.node_def_id == self.settings.salinity_node_def {
                debug!(node_id = %node.node_id, status = %status, "Salinity status observed");
            }
            return Vec::new();
        }
        let flows: Vec<&WrapCommand> = active
            .filter(|c| c.format == CommandFormat::Flow && c.cmd_type == CommandType::Control)
            .collect();

        match status {
            NodeStatus::MaxOver => self.handle_max_over(node, graph, &flows),
            NodeStatus::UpperLimitOver => self.handle_upper_limit_over(node, &flows),
            NodeStatus::Normal => self.handle_normal(node),
            NodeStatus::LowerLimitUnder => self.handle_lower_limit_under(node, &flows),
            NodeStatus::MinUnder => self.handle_min_under(node, graph, &flows),
            NodeStatus::Unknown => self.handle_unknown(node),
            NodeStatus::Error => self.handle_error(node),
        }
    }

    /// Stop filling the place and drain it to the best receptive place
    fn handle_max_over(
        &self,
        node: &PlaceNode,
        graph: &PlaceGraph,
        flows: &[&WrapCommand],
    ) -> Vec<AlgorithmAction> {
        let mut actions = cancel_inbound(&node.place_id, flows);
        let already_draining = flows
            .iter()
            .any(|c| c.src_place_id.as_deref() == Some(node.place_id.as_str()));
        if already_draining {
            return actions;
        }

        let target = node.thresholds.set.or(node.thresholds.upper_limit);
        let dest = graph.get_put_rank_list(&node.node_id).iter().find(|place_id| {
            graph
                .place_status(place_id, &self.settings.water_level_node_def)
                .is_some_and(|s| s.can_receive())
        });
        match dest {
            Some(dest) => {
                info!(src = %node.place_id, dest = %dest, "Draining place over its maximum");
                actions.push(AlgorithmAction::ExecuteFlow {
                    src_place_id: node.place_id.clone(),
                    dest_place_id: dest.clone(),
                    goal: target.map(|value| {
                        GoalInfo::new(vec![Goal::new(
                            node.node_id.clone(),
                            value,
                            GoalRange::Lower,
                        )])
                    }),
                });
            }
            None => warn!(place_id = %node.place_id, "No receptive place to drain into"),
        }
        actions
    }

    fn handle_upper_limit_over(&self, node: &PlaceNode, flows: &[&WrapCommand]) -> Vec<AlgorithmAction> {
        cancel_inbound(&node.place_id, flows)
    }

    fn handle_normal(&self, node: &PlaceNode) -> Vec<AlgorithmAction> {
        debug!(node_id = %node.node_id, "Water level normal");
        Vec::new()
    }

    fn handle_lower_limit_under(
        &self,
        node: &PlaceNode,
        flows: &[&WrapCommand],
    ) -> Vec<AlgorithmAction> {
        cancel_outbound(&node.place_id, flows)
    }

    /// Stop draining the place and call supply from the best able place
    fn handle_min_under(
        &self,
        node: &PlaceNode,
        graph: &PlaceGraph,
        flows: &[&WrapCommand],
    ) -> Vec<AlgorithmAction> {
        let mut actions = cancel_outbound(&node.place_id, flows);
        let already_filling = flows
            .iter()
            .any(|c| c.dest_place_id.as_deref() == Some(node.place_id.as_str()));
        if already_filling {
            return actions;
        }

        let target = node.thresholds.set.or(node.thresholds.lower_limit);
        let src = graph.get_call_rank_list(&node.node_id).iter().find(|place_id| {
            graph
                .place_status(place_id, &self.settings.water_level_node_def)
                .is_some_and(|s| s.can_supply())
        });
        match src {
            Some(src) => {
                info!(src = %src, dest = %node.place_id, "Supplying place under its minimum");
                actions.push(AlgorithmAction::ExecuteFlow {
                    src_place_id: src.clone(),
                    dest_place_id: node.place_id.clone(),
                    goal: target.map(|value| {
                        GoalInfo::new(vec![Goal::new(
                            node.node_id.clone(),
                            value,
                            GoalRange::Upper,
                        )])
                    }),
                });
            }
            None => warn!(place_id = %node.place_id, "No place able to supply"),
        }
        actions
    }

    fn handle_unknown(&self, node: &PlaceNode) -> Vec<AlgorithmAction> {
        debug!(node_id = %node.node_id, "Water level unknown, no reaction");
        Vec::new()
    }

    fn handle_error(&self, node: &PlaceNode) -> Vec<AlgorithmAction> {
        warn!(node_id = %node.node_id, error = ?node.device_error, "Water level node in error");
        Vec::new()
    }
}

fn cancel_inbound(place_id: &str, flows: &[&WrapCommand]) -> Vec<AlgorithmAction> {
    flows
        .iter()
        .filter(|c| c.dest_place_id.as_deref() == Some(place_id))
        .map(|c| AlgorithmAction::CancelCommand {
            wrap_cmd_id: c.wrap_cmd_id.clone(),
        })
        .collect()
}

fn cancel_outbound(place_id: &str, flows: &[&WrapCommand]) -> Vec<AlgorithmAction> {
    flows
        .iter()
        .filter(|c| c.src_place_id.as_deref() == Some(place_id))
        .map(|c| AlgorithmAction::CancelCommand {
            wrap_cmd_id: c.wrap_cmd_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::constants::ControlValue;
    use crate::models::{ContainerSpec, NodeValue, WrapCommandSpec};
    use chrono::Utc;

    const TOPOLOGY: &str = r#"
        [[places]]
        id = "R1"
        [[places.nodes]]
        node_id = "WL_R1"
        node_def_id = "waterLevel"
        thresholds = { max = 10.0, upper_limit = 8.0, set = 5.0, lower_limit = 2.0, min = 1.0 }
        call_places = ["R2", "R3"]
        put_places = ["R2", "R3"]

        [[places]]
        id = "R2"
        [[places.nodes]]
        node_id = "WL_R2"
        node_def_id = "waterLevel"
        thresholds = { max = 10.0, upper_limit = 8.0, lower_limit = 2.0, min = 1.0 }

        [[places]]
        id = "R3"
        [[places.nodes]]
        node_id = "WL_R3"
        node_def_id = "waterLevel"
        thresholds = { max = 10.0, upper_limit = 8.0, lower_limit = 2.0, min = 1.0 }
    "#;

    fn graph(r2: f64, r3: f64) -> PlaceGraph {
        let mut graph =
            PlaceGraph::from_topology(&TopologyConfig::from_toml_str(TOPOLOGY, "test").unwrap())
                .unwrap();
        graph.apply_update("WL_R2", Some(NodeValue::Number(r2)), Utc::now());
        graph.apply_update("WL_R3", Some(NodeValue::Number(r3)), Utc::now());
        graph
    }

    fn flow(src: &str, dest: &str) -> WrapCommand {
        let spec = WrapCommandSpec {
            wrap_cmd_id: format!("{src}_TO_{dest}"),
            wrap_cmd_name: format!("{src}_TO_{dest}"),
            format: CommandFormat::Flow,
            cmd_type: CommandType::Control,
            rank: 2,
            goal: None,
            src_place_id: Some(src.into()),
            dest_place_id: Some(dest.into()),
            containers: vec![ContainerSpec::new(ControlValue::True, vec![])],
        };
        WrapCommand::new(&spec, Vec::new())
    }

    fn algorithm(mode: ControlMode) -> ControlAlgorithm {
        ControlAlgorithm::new(mode, AlgorithmConfig::default())
    }

    fn node<'a>(graph: &'a PlaceGraph, id: &str) -> &'a PlaceNode {
        graph.node(id).unwrap()
    }

    #[test]
    fn test_manual_mode_never_reacts() {
        let graph = graph(5.0, 5.0);
        let actions = algorithm(ControlMode::Manual).on_node_update(
            node(&graph, "WL_R1"),
            NodeStatus::MaxOver,
            &graph,
            std::iter::empty(),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_max_over_cancels_inbound_and_drains_to_first_eligible() {
        // R2 is itself over its upper limit, so R3 is picked
        let graph = graph(9.0, 5.0);
        let inbound = flow("R2", "R1");
        let actions = algorithm(ControlMode::Automatic).on_node_update(
            node(&graph, "WL_R1"),
            NodeStatus::MaxOver,
            &graph,
            [&inbound].into_iter(),
        );
        assert_eq!(
            actions[0],
            AlgorithmAction::CancelCommand {
                wrap_cmd_id: "R2_TO_R1".into()
            }
        );
        match &actions[1] {
            AlgorithmAction::ExecuteFlow {
                src_place_id,
                dest_place_id,
                goal,
            } => {
                assert_eq!(src_place_id, "R1");
                assert_eq!(dest_place_id, "R3");
                let goal = &goal.as_ref().unwrap().goals[0];
                assert_eq!(goal.goal_range, GoalRange::Lower);
                assert_eq!(goal.goal_value, NodeValue::Number(5.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_min_under_cancels_outbound_and_calls_supply() {
        let graph = graph(5.0, 5.0);
        let outbound = flow("R1", "R3");
        let actions = algorithm(ControlMode::Automatic).on_node_update(
            node(&graph, "WL_R1"),
            NodeStatus::MinUnder,
            &graph,
            [&outbound].into_iter(),
        );
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[1],
            AlgorithmAction::ExecuteFlow { src_place_id, dest_place_id, .. }
                if src_place_id == "R2" && dest_place_id == "R1"
        ));
    }

    #[test]
    fn test_no_eligible_place_only_cancels() {
        let graph = graph(0.5, 1.5);
        let actions = algorithm(ControlMode::Automatic).on_node_update(
            node(&graph, "WL_R1"),
            NodeStatus::MinUnder,
            &graph,
            std::iter::empty(),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_limits_only_cancel() {
        let graph = graph(5.0, 5.0);
        let inbound = flow("R2", "R1");
        let outbound = flow("R1", "R3");
        let algorithm = algorithm(ControlMode::Automatic);

        let upper = algorithm.on_node_update(
            node(&graph, "WL_R1"),
            NodeStatus::UpperLimitOver,
            &graph,
            [&inbound, &outbound].into_iter(),
        );
        assert_eq!(
            upper,
            vec![AlgorithmAction::CancelCommand {
                wrap_cmd_id: "R2_TO_R1".into()
            }]
        );

        let lower = algorithm.on_node_update(
            node(&graph, "WL_R1"),
            NodeStatus::LowerLimitUnder,
            &graph,
            [&inbound, &outbound].into_iter(),
        );
        assert_eq!(
            lower,
            vec![AlgorithmAction::CancelCommand {
                wrap_cmd_id: "R1_TO_R3".into()
            }]
        );
    }

    #[test]
    fn test_non_level_nodes_ignored() {
        let graph = graph(5.0, 5.0);
        let mut level = node(&graph, "WL_R1").clone();
        level.node_def_id = "salinity".into();
        let actions = algorithm(ControlMode::Automatic).on_node_update(
            &level,
            NodeStatus::MaxOver,
            &graph,
            std::iter::empty(),
        );
        assert!(actions.is_empty());
    }
}
