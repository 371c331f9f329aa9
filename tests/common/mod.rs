//! Shared fixtures for integration tests: a small field topology and a
//! command manager wired to in-memory device, timer and reading doubles.
#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;
use uuid::Uuid;

use brinectl_core::config::{EngineConfig, TopologyConfig};
use brinectl_core::constants::ControlMode;
use brinectl_core::device::{DeviceAction, DeviceCommand, ElementAck, NodeUpdate, RecordingDeviceLink};
use brinectl_core::events::PublishedEvent;
use brinectl_core::orchestration::{CommandManager, ManualTimerScheduler};
use brinectl_core::persistence::InMemoryReadingSink;
use brinectl_core::place::PlaceGraph;
use brinectl_core::system_context::EngineContext;
use tokio::sync::broadcast;

/// Two reservoirs feeding two ponds, a sea intake, loggers and presets
pub const FIELD_TOPOLOGY: &str = r#"
    [[places]]
    id = "SEA"
    kind = "sea"
    drain_actuators = ["PU_SEA"]

    [[places.nodes]]
    node_id = "PU_SEA"
    node_def_id = "pump"
    device_kind = "pump"

    [[places]]
    id = "R1"
    area_m2 = 1200.0
    drain_actuators = ["V_R1_OUT", "PU_R1"]
    fill_actuators = ["V_R1_IN"]

    [[places.nodes]]
    node_id = "WL_R1"
    node_def_id = "waterLevel"
    thresholds = { max = 180.0, upper_limit = 150.0, set = 120.0, lower_limit = 40.0, min = 20.0 }
    call_places = ["R2"]
    put_places = ["P1", "P2"]

    [[places.nodes]]
    node_id = "SAL_R1"
    node_def_id = "salinity"
    thresholds = { max = 25.0, upper_limit = 22.0, lower_limit = 3.0, min = 2.0 }

    [[places.nodes]]
    node_id = "V_R1_IN"
    node_def_id = "inletValve"
    device_kind = "valve"

    [[places.nodes]]
    node_id = "V_R1_OUT"
    node_def_id = "outletValve"
    device_kind = "valve"

    [[places.nodes]]
    node_id = "PU_R1"
    node_def_id = "pump"
    device_kind = "pump"

    [[places]]
    id = "R2"
    drain_actuators = ["V_R2_OUT"]

    [[places.nodes]]
    node_id = "WL_R2"
    node_def_id = "waterLevel"
    thresholds = { max = 180.0, upper_limit = 150.0, set = 120.0, lower_limit = 40.0, min = 20.0 }

    [[places.nodes]]
    node_id = "V_R2_OUT"
    node_def_id = "outletValve"
    device_kind = "valve"

    [[places]]
    id = "P1"
    kind = "evaporation_pond"
    fill_actuators = ["G_P1"]

    [[places.nodes]]
    node_id = "WL_P1"
    node_def_id = "waterLevel"
    thresholds = { max = 30.0, upper_limit = 25.0, set = 15.0, lower_limit = 5.0, min = 2.0 }

    [[places.nodes]]
    node_id = "G_P1"
    node_def_id = "gate"
    device_kind = "gate"

    [[places]]
    id = "P2"
    kind = "evaporation_pond"
    fill_actuators = ["G_P2"]

    [[places.nodes]]
    node_id = "WL_P2"
    node_def_id = "waterLevel"
    thresholds = { max = 30.0, upper_limit = 25.0, set = 15.0, lower_limit = 5.0, min = 2.0 }

    [[places.nodes]]
    node_id = "G_P2"
    node_def_id = "gate"
    device_kind = "gate"

    [[data_loggers]]
    id = "DL_R1"
    node_ids = ["WL_R1", "SAL_R1"]

    [[data_loggers]]
    id = "DL_PONDS"
    node_ids = ["WL_P1", "WL_P2", "WL_R1"]

    [[flow_routes]]
    src = "SEA"
    dest = "R1"
    open = ["V_R1_IN", "PU_SEA"]
    close = ["V_R1_OUT"]

    [[set_commands]]
    id = "ALL_GATES_OPEN"

    [[set_commands.containers]]
    control_value = "true"
    node_ids = ["G_P1", "G_P2"]

    [[scenarios]]
    id = "SHUTDOWN"

    [[scenarios.containers]]
    control_value = "false"
    node_ids = ["PU_SEA", "PU_R1", "V_R1_IN", "V_R1_OUT"]
"#;

pub fn field_graph() -> PlaceGraph {
    let topology = TopologyConfig::from_toml_str(FIELD_TOPOLOGY, "field").unwrap();
    PlaceGraph::from_topology(&topology).unwrap()
}

/// Manager plus handles on every test double
pub struct Harness {
    pub manager: CommandManager,
    pub link: Arc<RecordingDeviceLink>,
    pub timers: Arc<ManualTimerScheduler>,
    pub sink: Arc<InMemoryReadingSink>,
    pub events: broadcast::Receiver<PublishedEvent>,
}

impl Harness {
    pub fn new(mode: ControlMode) -> Self {
        Self::with_config(mode, |_| {})
    }

    pub fn with_config(mode: ControlMode, tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let mut config = EngineConfig::default();
        config.engine.control_mode = mode;
        tweak(&mut config);

        let link = Arc::new(RecordingDeviceLink::new());
        let timers = Arc::new(ManualTimerScheduler::new());
        let sink = Arc::new(InMemoryReadingSink::new());
        let ctx = EngineContext::new(config, link.clone(), sink.clone()).unwrap();
        let events = ctx.event_publisher.subscribe();
        let manager = CommandManager::new(ctx, field_graph(), timers.clone());

        Self {
            manager,
            link,
            timers,
            sink,
            events,
        }
    }

    /// Everything sent to the device layer since the last call
    pub fn take_sent(&self) -> Vec<DeviceCommand> {
        self.link.drain()
    }

    /// Acknowledge every element of `commands` with START then TERMINATE
    pub fn complete(&mut self, commands: &[DeviceCommand]) {
        for command in commands.iter().filter(|c| c.action == DeviceAction::Execute) {
            self.manager.on_element_ack(ElementAck::start(command.element_id));
        }
        for command in commands.iter().filter(|c| c.action == DeviceAction::Execute) {
            self.manager
                .on_element_ack(ElementAck::terminate(command.element_id));
        }
    }

    /// Complete whatever is outstanding on the device link
    pub fn complete_outstanding(&mut self) -> Vec<DeviceCommand> {
        let sent = self.take_sent();
        self.complete(&sent);
        sent
    }

    pub fn update(&mut self, node_id: &str, value: f64) {
        self.manager.on_node_update(NodeUpdate::new(node_id, value));
    }

    /// Drain the event feed, returning event names in publish order
    pub fn event_names(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            names.push(event.event.name());
        }
        names
    }

    pub fn is_active(&self, wrap_cmd_uuid: Uuid) -> bool {
        self.manager.hierarchy().get(wrap_cmd_uuid).is_some()
    }
}

/// Node ids of execute commands with the given control value
pub fn nodes_driven(
    commands: &[DeviceCommand],
    control_value: brinectl_core::constants::ControlValue,
) -> Vec<String> {
    let mut nodes: Vec<String> = commands
        .iter()
        .filter(|c| c.action == DeviceAction::Execute && c.control_value == control_value)
        .map(|c| c.node_id.clone())
        .collect();
    nodes.sort();
    nodes
}
