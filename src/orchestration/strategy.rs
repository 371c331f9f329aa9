//! # Command Strategy
//!
//! Turns a refined [`WrapCommandSpec`] into containers of element commands,
//! marking the elements that need not reach a device as ignored, and computes
//! the turn-off elements a cancellation should dispatch.

use std::cmp::Reverse;
use tracing::debug;

use crate::constants::{ControlMode, ControlValue};
use crate::models::{
    CommandType, ContainerCommand, ContainerSpec, ElementCommand, NodeId, WrapCommand,
    WrapCommandSpec,
};
use crate::orchestration::overlap::OverlapTracker;
use crate::place::PlaceGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandStrategy {
    /// Skip an element only while an identical one is in flight
    #[default]
    Manual,
    /// Also skip elements whose device already holds the target state, unless
    /// another state is in flight, and only turn off actuators no other live
    /// command depends on
    OverlapAware,
}

impl CommandStrategy {
    pub fn for_mode(mode: ControlMode) -> Self {
        if mode.uses_overlap() {
            Self::OverlapAware
        } else {
            Self::Manual
        }
    }

    /// Build the container/element hierarchy for a spec
    pub fn compute_real_command(
        &self,
        spec: &WrapCommandSpec,
        graph: &PlaceGraph,
        overlap: &OverlapTracker,
    ) -> Vec<ContainerCommand> {
        self.build_containers(&spec.containers, spec.cmd_type, graph, overlap)
    }

    pub fn build_containers(
        &self,
        containers: &[ContainerSpec],
        cmd_type: CommandType,
        graph: &PlaceGraph,
        overlap: &OverlapTracker,
    ) -> Vec<ContainerCommand> {
        containers
            .iter()
            .map(|container| self.build_container(container, cmd_type, graph, overlap))
            .collect()
    }

    fn build_container(
        &self,
        container: &ContainerSpec,
        cmd_type: CommandType,
        graph: &PlaceGraph,
        overlap: &OverlapTracker,
    ) -> ContainerCommand {
        let mut command = ContainerCommand::new(container.control_value, container.set_value);
        for node_id in &container.node_ids {
            let device_kind = graph
                .node(node_id)
                .map(|node| node.device_kind)
                .unwrap_or_default();
            let element = ElementCommand::new(
                node_id.clone(),
                device_kind,
                container.control_value,
                container.set_value,
            );
            if self.is_unnecessary(&element, cmd_type, graph, overlap) {
                debug!(
                    node_id = %node_id,
                    control_value = %container.control_value,
                    strategy = ?self,
                    "Element ignored"
                );
                command.elements.push(element.ignore());
            } else {
                command.elements.push(element);
            }
        }
        sort_for_safety(&mut command.elements, container.control_value);
        command
    }

    fn is_unnecessary(
        &self,
        element: &ElementCommand,
        cmd_type: CommandType,
        graph: &PlaceGraph,
        overlap: &OverlapTracker,
    ) -> bool {
        if element.control_value == ControlValue::Measure || cmd_type == CommandType::Measure {
            return false;
        }
        let in_flight = overlap
            .reserved_element(&element.node_id, element.control_value, element.set_value)
            .is_some();

        match self {
            Self::Manual => in_flight,
            Self::OverlapAware => {
                // the live value is about to change while another state is in flight
                let contested = overlap.is_contested(
                    &element.node_id,
                    element.control_value,
                    element.set_value,
                );
                in_flight
                    || (!contested
                        && graph
                            .node(&element.node_id)
                            .and_then(|node| node.value.as_ref())
                            .is_some_and(|value| {
                                value.satisfies_control(element.control_value, element.set_value)
                            }))
            }
        }
    }

    /// Turn-off containers for a cancelled CONTROL command, empty when nothing needs undoing
    pub fn restore_containers(
        &self,
        command: &WrapCommand,
        overlap: &OverlapTracker,
    ) -> Vec<ContainerSpec> {
        let node_ids: Vec<NodeId> = command
            .control_tuples
            .iter()
            .filter(|(_, cv, _)| *cv == ControlValue::True)
            .filter(|(node_id, cv, sv)| match self {
                Self::Manual => true,
                Self::OverlapAware => overlap.would_empty_after_removal(
                    node_id,
                    *cv,
                    *sv,
                    command.wrap_cmd_uuid,
                ),
            })
            .map(|(node_id, _, _)| node_id.clone())
            .collect();

        if node_ids.is_empty() {
            Vec::new()
        } else {
            vec![ContainerSpec::new(ControlValue::False, node_ids)]
        }
    }
}

/// Valves and gates open before pumps start; pumps stop before valves close
pub fn sort_for_safety(elements: &mut [ElementCommand], control_value: ControlValue) {
    match control_value {
        ControlValue::False => elements.sort_by_key(|e| e.device_kind.deactivation_order()),
        ControlValue::True | ControlValue::Set => {
            elements.sort_by_key(|e| e.device_kind.activation_order())
        }
        ControlValue::Measure => {}
    }
}

/// Order used when dispatching a whole command: turn-off containers first
pub fn container_dispatch_order(containers: &[ContainerCommand]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..containers.len()).collect();
    order.sort_by_key(|i| Reverse(containers[*i].control_value == ControlValue::False));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::models::{CommandFormat, NodeValue};
    use chrono::Utc;
    use uuid::Uuid;

    const TOPOLOGY: &str = r#"
        [[places]]
        id = "R1"

        [[places.nodes]]
        node_id = "P_1"
        node_def_id = "pump"
        device_kind = "pump"

        [[places.nodes]]
        node_id = "V_1"
        node_def_id = "valve"
        device_kind = "valve"

        [[places.nodes]]
        node_id = "G_1"
        node_def_id = "gate"
        device_kind = "gate"
    "#;

    fn graph() -> PlaceGraph {
        PlaceGraph::from_topology(&TopologyConfig::from_toml_str(TOPOLOGY, "test").unwrap())
            .unwrap()
    }

    fn spec(cv: ControlValue) -> WrapCommandSpec {
        WrapCommandSpec {
            wrap_cmd_id: "test".into(),
            wrap_cmd_name: "test".into(),
            format: CommandFormat::Set,
            cmd_type: CommandType::Control,
            rank: 2,
            goal: None,
            src_place_id: None,
            dest_place_id: None,
            containers: vec![ContainerSpec::new(
                cv,
                vec!["P_1".into(), "V_1".into(), "G_1".into()],
            )],
        }
    }

    fn order(containers: &[ContainerCommand]) -> Vec<&str> {
        containers[0]
            .elements
            .iter()
            .map(|e| e.node_id.as_str())
            .collect()
    }

    #[test]
    fn test_activation_and_deactivation_order() {
        let graph = graph();
        let overlap = OverlapTracker::new();
        let strategy = CommandStrategy::Manual;

        let on = strategy.compute_real_command(&spec(ControlValue::True), &graph, &overlap);
        assert_eq!(order(&on), ["V_1", "G_1", "P_1"]);

        let off = strategy.compute_real_command(&spec(ControlValue::False), &graph, &overlap);
        assert_eq!(order(&off), ["P_1", "V_1", "G_1"]);
    }

    #[test]
    fn test_manual_ignores_only_in_flight() {
        let mut graph = graph();
        graph.apply_update("V_1", Some(NodeValue::from("OPEN")), Utc::now());
        let mut overlap = OverlapTracker::new();
        overlap.reserve_element("P_1", ControlValue::True, None, Uuid::new_v4());

        let built =
            CommandStrategy::Manual.compute_real_command(&spec(ControlValue::True), &graph, &overlap);
        let ignored: Vec<_> = built[0]
            .elements
            .iter()
            .filter(|e| e.ignored)
            .map(|e| e.node_id.as_str())
            .collect();
        assert_eq!(ignored, ["P_1"]);
    }

    #[test]
    fn test_overlap_aware_ignores_satisfied_devices() {
        let mut graph = graph();
        graph.apply_update("V_1", Some(NodeValue::from("OPEN")), Utc::now());
        graph.apply_update("G_1", Some(NodeValue::from("CLOSED")), Utc::now());
        let overlap = OverlapTracker::new();

        let built = CommandStrategy::OverlapAware.compute_real_command(
            &spec(ControlValue::True),
            &graph,
            &overlap,
        );
        let pending: Vec<_> = built[0]
            .elements
            .iter()
            .filter(|e| e.is_pending())
            .map(|e| e.node_id.as_str())
            .collect();
        assert_eq!(pending, ["G_1", "P_1"]);
    }

    #[test]
    fn test_overlap_aware_sends_when_opposite_state_in_flight() {
        let mut graph = graph();
        graph.apply_update("V_1", Some(NodeValue::from("OPEN")), Utc::now());
        let mut overlap = OverlapTracker::new();
        overlap.reserve_element("V_1", ControlValue::False, None, Uuid::new_v4());

        let built = CommandStrategy::OverlapAware.compute_real_command(
            &spec(ControlValue::True),
            &graph,
            &overlap,
        );
        let valve = built[0]
            .elements
            .iter()
            .find(|e| e.node_id == "V_1")
            .unwrap();
        assert!(!valve.ignored);
    }

    #[test]
    fn test_restore_containers_respect_other_dependents() {
        let graph = graph();
        let mut overlap = OverlapTracker::new();
        let spec = spec(ControlValue::True);
        let containers = CommandStrategy::Manual.compute_real_command(&spec, &graph, &overlap);
        let command = WrapCommand::new(&spec, containers);

        overlap.register(command.wrap_cmd_uuid, spec.tuples());
        let other = Uuid::new_v4();
        let v1 = "V_1".to_string();
        overlap.register(other, [(&v1, ControlValue::True, None)]);

        let manual = CommandStrategy::Manual.restore_containers(&command, &overlap);
        assert_eq!(manual[0].node_ids.len(), 3);
        assert_eq!(manual[0].control_value, ControlValue::False);

        let aware = CommandStrategy::OverlapAware.restore_containers(&command, &overlap);
        assert_eq!(aware[0].node_ids, ["P_1", "G_1"]);
    }

    #[test]
    fn test_turn_off_containers_dispatch_first() {
        let containers = vec![
            ContainerCommand::new(ControlValue::True, None),
            ContainerCommand::new(ControlValue::False, None),
        ];
        assert_eq!(container_dispatch_order(&containers), [1, 0]);
    }

    #[test]
    fn test_strategy_for_mode() {
        assert_eq!(CommandStrategy::for_mode(ControlMode::Manual), CommandStrategy::Manual);
        assert_eq!(
            CommandStrategy::for_mode(ControlMode::Automatic),
            CommandStrategy::OverlapAware
        );
    }
}
