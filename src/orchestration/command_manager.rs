//! # Command Manager
//!
//! Facade owning every piece of mutable engine state: the place graph's
//! values, the active-command registry, the overlap tables, threshold
//! tracking and the reading buffer. It is driven from one dispatch context
//! (see [`crate::orchestration::processor`]); nothing else mutates its state.
//!
//! Validation and conflict errors are returned to the caller. Everything
//! raised while reacting to device events is logged and published, never
//! propagated back to the device layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::constants::{ControlMode, ControlValue, NodeStatus, INQUIRY_ALL_ID};
use crate::device::{DeviceErrorReport, ElementAck, NodeUpdate};
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::logging::{log_command_operation, log_error, log_node_operation};
use crate::models::{
    CommandRequest, CommandTarget, CommandType, ContainerSpec, GoalInfo, NodeId, NodeValue,
    WrapCommand, WrapCommandSpec,
};
use crate::orchestration::algorithm::{AlgorithmAction, ControlAlgorithm};
use crate::orchestration::hierarchy::{AckOutcome, CommandHierarchy, Settlement};
use crate::orchestration::overlap::OverlapTracker;
use crate::orchestration::strategy::CommandStrategy;
use crate::orchestration::threshold::{ThresholdOutcome, ThresholdTracker, TimerScheduler, TimerToken};
use crate::persistence::{NodeReading, ReadingBuffer};
use crate::place::{PlaceGraph, StatusChange};
use crate::state_machine::WrapCommandStep;
use crate::system_context::EngineContext;

/// What the caller gets back for an accepted command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapCommandHandle {
    pub wrap_cmd_uuid: Uuid,
    pub wrap_cmd_id: String,
    pub cmd_type: CommandType,
    /// Step right after submission; already terminal when nothing had to be sent
    pub step: WrapCommandStep,
}

impl WrapCommandHandle {
    fn of(command: &WrapCommand) -> Self {
        Self {
            wrap_cmd_uuid: command.wrap_cmd_uuid,
            wrap_cmd_id: command.wrap_cmd_id.clone(),
            cmd_type: command.cmd_type,
            step: command.step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusView {
    pub node_id: NodeId,
    pub value: Option<NodeValue>,
    pub status: NodeStatus,
    pub write_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub goals_reached: u64,
    pub stale_acks: u64,
    pub node_updates: u64,
    pub active_commands: usize,
    pub tracked_goals: usize,
}

#[derive(Debug)]
pub struct CommandManager {
    ctx: EngineContext,
    graph: PlaceGraph,
    overlap: OverlapTracker,
    hierarchy: CommandHierarchy,
    threshold: ThresholdTracker,
    strategy: CommandStrategy,
    algorithm: ControlAlgorithm,
    readings: ReadingBuffer,
    stats: EngineStats,
}

impl CommandManager {
    pub fn new(ctx: EngineContext, graph: PlaceGraph, scheduler: Arc<dyn TimerScheduler>) -> Self {
        let mode = ctx.config.engine.control_mode;
        let readings = ReadingBuffer::new(
            Arc::clone(&ctx.reading_sink),
            ctx.config.persistence.batch_size,
        );
        let algorithm = ControlAlgorithm::new(mode, ctx.config.algorithm.clone());

        info!(engine_id = %ctx.engine_id, control_mode = %mode, "Command manager created");
        Self {
            graph,
            overlap: OverlapTracker::new(),
            hierarchy: CommandHierarchy::new(),
            threshold: ThresholdTracker::new(scheduler),
            strategy: CommandStrategy::for_mode(mode),
            algorithm,
            readings,
            stats: EngineStats::default(),
            ctx,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn graph(&self) -> &PlaceGraph {
        &self.graph
    }

    pub fn overlap(&self) -> &OverlapTracker {
        &self.overlap
    }

    pub fn hierarchy(&self) -> &CommandHierarchy {
        &self.hierarchy
    }

    pub fn threshold(&self) -> &ThresholdTracker {
        &self.threshold
    }

    pub fn control_mode(&self) -> ControlMode {
        self.algorithm.mode()
    }

    pub fn strategy(&self) -> CommandStrategy {
        self.strategy
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_commands: self.hierarchy.len(),
            tracked_goals: self.threshold.len(),
            ..self.stats.clone()
        }
    }

    // ---------------------------------------------------------------------
    // Control-plane API
    // ---------------------------------------------------------------------

    /// Validate, refine and dispatch a request
    pub fn submit_command(&mut self, request: CommandRequest) -> EngineResult<WrapCommandHandle> {
        let requested_id = request.wrap_cmd_id.clone();
        let result = self.try_submit(request);
        match &result {
            Ok(handle) => {
                self.stats.submitted += 1;
                log_command_operation(
                    "submit",
                    &handle.wrap_cmd_id,
                    Some(handle.wrap_cmd_uuid),
                    &handle.step.to_string(),
                    None,
                );
            }
            Err(e) => {
                self.stats.rejected += 1;
                let wrap_cmd_id = requested_id.unwrap_or_default();
                warn!(wrap_cmd_id = %wrap_cmd_id, error = %e, "Command rejected");
                self.ctx.event_publisher.publish(EngineEvent::CommandRejected {
                    wrap_cmd_id,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    fn try_submit(&mut self, request: CommandRequest) -> EngineResult<WrapCommandHandle> {
        let spec = self.refine(&request)?;

        if spec.cmd_type == CommandType::Cancel {
            if let Some(active) = self.hierarchy.find_cancellable(&spec.wrap_cmd_id) {
                let wrap_cmd_uuid = active.wrap_cmd_uuid;
                let wrap_cmd_id = active.wrap_cmd_id.clone();
                self.cancel_active(wrap_cmd_uuid)?;
                return Ok(self
                    .hierarchy
                    .get(wrap_cmd_uuid)
                    .map(WrapCommandHandle::of)
                    .unwrap_or(WrapCommandHandle {
                        wrap_cmd_uuid,
                        wrap_cmd_id,
                        cmd_type: CommandType::Cancel,
                        step: WrapCommandStep::End,
                    }));
            }
            let turn_off = turn_off_spec(spec)?;
            return self.launch(turn_off);
        }

        self.launch(spec)
    }

    /// Duplicate and conflict checks, hierarchy creation, overlap registration, dispatch
    fn launch(&mut self, spec: WrapCommandSpec) -> EngineResult<WrapCommandHandle> {
        if self
            .hierarchy
            .find_active(&spec.wrap_cmd_id, spec.cmd_type)
            .is_some()
        {
            return Err(EngineError::DuplicateCommand {
                wrap_cmd_id: spec.wrap_cmd_id,
            });
        }

        let containers = self
            .strategy
            .compute_real_command(&spec, &self.graph, &self.overlap);
        let command = WrapCommand::new(&spec, containers);
        let wrap_cmd_uuid = command.wrap_cmd_uuid;

        let tracks_overlap =
            spec.cmd_type == CommandType::Control && self.control_mode().uses_overlap();
        if tracks_overlap {
            self.overlap.check_conflicts(wrap_cmd_uuid, spec.tuples())?;
        }

        let mut handle = WrapCommandHandle::of(&command);
        self.hierarchy.insert(command);
        if tracks_overlap {
            self.overlap.register(wrap_cmd_uuid, spec.tuples());
        }

        match self.hierarchy.dispatch(wrap_cmd_uuid, &self.ctx, &mut self.overlap) {
            Ok(Some(settlement)) => {
                handle.step = settlement_step(&settlement);
                self.handle_settlement(settlement);
            }
            Ok(None) => {}
            Err(e) => {
                log_error("command_manager", "dispatch", &e.to_string(), Some(&spec.wrap_cmd_id));
                return Err(e);
            }
        }
        if let Some(command) = self.hierarchy.get(wrap_cmd_uuid) {
            handle.step = command.step;
        }
        Ok(handle)
    }

    /// Cancel the active command with this logical id
    pub fn cancel_command(&mut self, wrap_cmd_id: &str) -> EngineResult<()> {
        let wrap_cmd_uuid = self
            .hierarchy
            .find_cancellable(wrap_cmd_id)
            .map(|c| c.wrap_cmd_uuid)
            .ok_or_else(|| EngineError::not_found("active command", wrap_cmd_id))?;
        self.cancel_active(wrap_cmd_uuid)
    }

    fn cancel_active(&mut self, wrap_cmd_uuid: Uuid) -> EngineResult<()> {
        let command = self
            .hierarchy
            .get(wrap_cmd_uuid)
            .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))?;
        // computed while the command's own dependencies are still registered
        let restore_specs = self.strategy.restore_containers(command, &self.overlap);
        let restore = self.strategy.build_containers(
            &restore_specs,
            CommandType::Cancel,
            &self.graph,
            &self.overlap,
        );
        log_command_operation(
            "cancel",
            &command.wrap_cmd_id,
            Some(wrap_cmd_uuid),
            &command.step.to_string(),
            Some(&format!("{} restore containers", restore.len())),
        );

        self.threshold.detach(wrap_cmd_uuid);
        if let Some(settlement) =
            self.hierarchy
                .cancel(wrap_cmd_uuid, restore, &self.ctx, &mut self.overlap)?
        {
            self.handle_settlement(settlement);
        }
        Ok(())
    }

    pub fn query_node_status(&self, node_id: &str) -> EngineResult<NodeStatusView> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| EngineError::not_found("node", node_id))?;
        Ok(NodeStatusView {
            node_id: node.node_id.clone(),
            value: node.value.clone(),
            status: crate::place::evaluate(node),
            write_date: node.write_date,
        })
    }

    /// Move brine between two places, refusing physically inconsistent flows
    pub fn execute_flow(
        &mut self,
        src_place_id: &str,
        dest_place_id: &str,
        goal: Option<GoalInfo>,
    ) -> EngineResult<WrapCommandHandle> {
        let level_def = self.ctx.config.algorithm.water_level_node_def.clone();
        for place_id in [src_place_id, dest_place_id] {
            if self.graph.find_place(place_id).is_none() {
                return Err(EngineError::not_found("place", place_id));
            }
        }
        if self.graph.place_status(src_place_id, &level_def) == Some(NodeStatus::MinUnder) {
            return Err(EngineError::PhysicalConsistency {
                place_id: src_place_id.to_string(),
                reason: "source is below its minimum level".to_string(),
            });
        }
        if self.graph.place_status(dest_place_id, &level_def) == Some(NodeStatus::MaxOver) {
            return Err(EngineError::PhysicalConsistency {
                place_id: dest_place_id.to_string(),
                reason: "destination is above its maximum level".to_string(),
            });
        }

        let mut request = CommandRequest::flow(src_place_id, dest_place_id);
        request.goal = goal;
        self.submit_command(request)
    }

    /// Re-evaluate the given node definitions of a place, every definition when empty
    pub fn reload_place_status(
        &mut self,
        place_id: &str,
        node_def_ids: &[String],
    ) -> EngineResult<Vec<NodeStatusView>> {
        let place = self
            .graph
            .find_place(place_id)
            .ok_or_else(|| EngineError::not_found("place", place_id))?;
        let node_ids: Vec<NodeId> = if node_def_ids.is_empty() {
            place.nodes.values().cloned().collect()
        } else {
            node_def_ids
                .iter()
                .filter_map(|def| place.node_id_for(def).cloned())
                .collect()
        };

        let mut views = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(change) = self.graph.refresh_status(&node_id) {
                self.on_status_change(change);
            }
            views.push(self.query_node_status(&node_id)?);
        }
        Ok(views)
    }

    /// Swap strategy and overlap bookkeeping for a new mode
    pub fn set_control_mode(&mut self, mode: ControlMode) {
        let previous = self.algorithm.set_mode(mode);
        if previous == mode {
            return;
        }
        self.strategy = CommandStrategy::for_mode(mode);

        if !mode.uses_overlap() {
            self.overlap.clear_wcus();
        } else if !previous.uses_overlap() {
            let live: Vec<(Uuid, Vec<_>)> = self
                .hierarchy
                .active()
                .filter(|c| c.cmd_type == CommandType::Control)
                .map(|c| (c.wrap_cmd_uuid, c.control_tuples.clone()))
                .collect();
            for (wrap_cmd_uuid, tuples) in &live {
                self.overlap.register(
                    *wrap_cmd_uuid,
                    tuples.iter().map(|(node_id, cv, sv)| (node_id, *cv, *sv)),
                );
            }
        }

        info!(from = %previous, to = %mode, strategy = ?self.strategy, "Control mode changed");
        self.ctx
            .event_publisher
            .publish(EngineEvent::ControlModeChanged { from: previous, to: mode });
    }

    // ---------------------------------------------------------------------
    // Device-layer events
    // ---------------------------------------------------------------------

    pub fn on_element_ack(&mut self, ack: ElementAck) {
        match self.hierarchy.on_element_ack(ack, &self.ctx, &mut self.overlap) {
            Ok(AckOutcome::Stale) => self.stats.stale_acks += 1,
            Ok(AckOutcome::Settled(settlement)) => self.handle_settlement(settlement),
            Ok(AckOutcome::Ignored) | Ok(AckOutcome::Progressed) => {}
            Err(e) => log_error(
                "command_manager",
                "element_ack",
                &e.to_string(),
                Some(&ack.element_id.to_string()),
            ),
        }
    }

    pub fn on_node_update(&mut self, update: NodeUpdate) {
        self.stats.node_updates += 1;
        let NodeUpdate {
            node_id,
            value,
            timestamp,
        } = update;
        if !self.graph.contains_node(&node_id) {
            warn!(node_id = %node_id, "Update for unknown node dropped");
            return;
        }

        let change = self.graph.apply_update(&node_id, value.clone(), timestamp);
        if let Some(node) = self.graph.node(&node_id) {
            self.readings.record(NodeReading {
                node_id: node_id.clone(),
                place_id: node.place_id.clone(),
                value: value.clone(),
                status: crate::place::evaluate(node),
                write_date: timestamp,
            });
        }

        for wrap_cmd_uuid in self.threshold.on_node_update(&node_id, value.as_ref()) {
            self.finish_goal(wrap_cmd_uuid, ThresholdOutcome::GoalSatisfied);
        }

        if let Some(change) = change {
            self.on_status_change(change);
        }
    }

    pub fn on_device_error(&mut self, report: DeviceErrorReport) {
        let element_node = report
            .element_id
            .and_then(|element_id| self.hierarchy.on_device_error(element_id, &report.message));
        let node_id = report.node_id.clone().or(element_node);

        error!(
            node_id = ?node_id,
            element_id = ?report.element_id,
            message = %report.message,
            "Device error reported"
        );
        self.ctx.event_publisher.publish(EngineEvent::DeviceError {
            node_id: node_id.clone(),
            element_id: report.element_id,
            message: report.message.clone(),
        });

        if let Some(node_id) = node_id {
            if let Some(change) = self.graph.mark_error(&node_id, &report.message) {
                self.on_status_change(change);
            }
        }
    }

    pub fn on_timer_expired(&mut self, token: TimerToken) {
        if let Some(wrap_cmd_uuid) = self.threshold.on_timer_expired(token) {
            self.finish_goal(wrap_cmd_uuid, ThresholdOutcome::TimeLimitReached);
        }
    }

    /// Hand every buffered reading to the sink
    pub fn flush_readings(&mut self) {
        self.readings.flush();
    }

    // ---------------------------------------------------------------------
    // Internal reactions
    // ---------------------------------------------------------------------

    fn handle_settlement(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Running(wrap_cmd_uuid) => {
                let outcome = match self.hierarchy.get(wrap_cmd_uuid) {
                    Some(command) => self.threshold.attach(command, &self.graph),
                    None => return,
                };
                if let Some(outcome) = outcome {
                    self.finish_goal(wrap_cmd_uuid, outcome);
                }
            }
            Settlement::Finished(command) => {
                if command.cmd_type == CommandType::Cancel {
                    self.stats.cancelled += 1;
                } else {
                    self.stats.completed += 1;
                }
                debug!(
                    wrap_cmd_id = %command.wrap_cmd_id,
                    final_step = %command.step,
                    "Command settled"
                );
            }
        }
    }

    /// RUNNING -> END, then optionally turn the flow off with a fresh CANCEL command
    fn finish_goal(&mut self, wrap_cmd_uuid: Uuid, outcome: ThresholdOutcome) {
        let command = match self
            .hierarchy
            .goal_reached(wrap_cmd_uuid, &self.ctx, &mut self.overlap)
        {
            Ok(command) => command,
            Err(e) => {
                log_error("command_manager", "goal_reached", &e.to_string(), None);
                return;
            }
        };
        self.stats.goals_reached += 1;
        log_command_operation(
            "goal_reached",
            &command.wrap_cmd_id,
            Some(wrap_cmd_uuid),
            &command.step.to_string(),
            Some(&format!("{outcome:?}")),
        );

        if !self.ctx.config.engine.cancel_on_goal_complete {
            return;
        }
        let containers = self.strategy.restore_containers(&command, &self.overlap);
        if containers.is_empty() {
            return;
        }
        let follow_up = WrapCommandSpec {
            wrap_cmd_id: command.wrap_cmd_id.clone(),
            wrap_cmd_name: command.wrap_cmd_name.clone(),
            format: command.format,
            cmd_type: CommandType::Cancel,
            rank: command.rank,
            goal: None,
            src_place_id: command.src_place_id.clone(),
            dest_place_id: command.dest_place_id.clone(),
            containers,
        };
        if let Err(e) = self.launch(follow_up) {
            log_error(
                "command_manager",
                "goal_follow_up",
                &e.to_string(),
                Some(&command.wrap_cmd_id),
            );
        }
    }

    fn on_status_change(&mut self, change: StatusChange) {
        log_node_operation(
            "status_changed",
            &change.node_id,
            &change.to.to_string(),
            change.from.map(|s| s.to_string()).as_deref(),
        );
        self.ctx.event_publisher.publish(EngineEvent::NodeStatusChanged {
            node_id: change.node_id.clone(),
            from: change.from,
            to: change.to,
        });

        let actions = match self.graph.node(&change.node_id) {
            Some(node) => self.algorithm.on_node_update(
                node,
                change.to,
                &self.graph,
                self.hierarchy.active(),
            ),
            None => return,
        };
        for action in actions {
            let result = match &action {
                AlgorithmAction::CancelCommand { wrap_cmd_id } => self.cancel_command(wrap_cmd_id),
                AlgorithmAction::ExecuteFlow {
                    src_place_id,
                    dest_place_id,
                    goal,
                } => self
                    .execute_flow(src_place_id, dest_place_id, goal.clone())
                    .map(|_| ()),
            };
            if let Err(e) = result {
                warn!(action = ?action, error = %e, "Algorithm action failed");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Request refinement
    // ---------------------------------------------------------------------

    fn refine(&self, request: &CommandRequest) -> EngineResult<WrapCommandSpec> {
        let rank = request
            .rank
            .unwrap_or(self.ctx.config.engine.default_rank);
        let mut src_place_id = None;
        let mut dest_place_id = None;

        let (derived_id, derived_name, mut containers) = match &request.target {
            CommandTarget::Single {
                node_id,
                control_value,
                set_value,
            } => {
                let node = self
                    .graph
                    .node(node_id)
                    .ok_or_else(|| EngineError::not_found("node", node_id))?;
                if *control_value == ControlValue::Set && set_value.is_none() {
                    return Err(EngineError::validation(format!(
                        "SET on node {node_id} requires a set value"
                    )));
                }
                if *control_value != ControlValue::Measure && !node.is_actuator() {
                    return Err(EngineError::validation(format!(
                        "node {node_id} is not an actuator"
                    )));
                }
                (
                    format!("{node_id}:{control_value}"),
                    node_id.clone(),
                    vec![ContainerSpec {
                        control_value: *control_value,
                        set_value: *set_value,
                        node_ids: vec![node_id.clone()],
                    }],
                )
            }
            CommandTarget::Set { preset_id } => {
                let preset = self
                    .graph
                    .set_command(preset_id)
                    .ok_or_else(|| EngineError::not_found("set command", preset_id))?;
                (
                    preset.id.clone(),
                    preset.name.clone().unwrap_or_else(|| preset.id.clone()),
                    preset.containers.clone(),
                )
            }
            CommandTarget::Scenario { preset_id } => {
                let preset = self
                    .graph
                    .scenario(preset_id)
                    .ok_or_else(|| EngineError::not_found("scenario", preset_id))?;
                (
                    preset.id.clone(),
                    preset.name.clone().unwrap_or_else(|| preset.id.clone()),
                    preset.containers.clone(),
                )
            }
            CommandTarget::Flow {
                src_place_id: src,
                dest_place_id: dest,
            } => {
                let containers = self.flow_containers(src, dest)?;
                src_place_id = Some(src.clone());
                dest_place_id = Some(dest.clone());
                let id = format!("{src}_TO_{dest}");
                (id.clone(), id, containers)
            }
            CommandTarget::Measure { logger_ids } => {
                if request.cmd_type != CommandType::Measure {
                    return Err(EngineError::validation(
                        "measurement targets require a MEASURE command",
                    ));
                }
                let node_ids = self.logger_node_ids(logger_ids)?;
                (
                    INQUIRY_ALL_ID.to_string(),
                    INQUIRY_ALL_ID.to_string(),
                    vec![ContainerSpec::new(ControlValue::Measure, node_ids)],
                )
            }
        };

        if request.cmd_type == CommandType::Restore {
            containers = invert_binary(containers);
        }
        containers.retain(|c| !c.node_ids.is_empty());
        if containers.is_empty() {
            return Err(EngineError::validation(format!(
                "request {derived_id} addresses no devices"
            )));
        }

        let wrap_cmd_id = request.wrap_cmd_id.clone().unwrap_or(derived_id);
        Ok(WrapCommandSpec {
            wrap_cmd_name: request.wrap_cmd_name.clone().unwrap_or(derived_name),
            wrap_cmd_id,
            format: request.target.format(),
            cmd_type: request.cmd_type,
            rank,
            goal: match request.cmd_type {
                CommandType::Control => request.goal.clone(),
                _ => None,
            },
            src_place_id,
            dest_place_id,
            containers,
        })
    }

    fn flow_containers(&self, src: &str, dest: &str) -> EngineResult<Vec<ContainerSpec>> {
        if src == dest {
            return Err(EngineError::validation(format!(
                "flow source and destination are both {src}"
            )));
        }
        let src_place = self
            .graph
            .find_place(src)
            .ok_or_else(|| EngineError::not_found("place", src))?;
        let dest_place = self
            .graph
            .find_place(dest)
            .ok_or_else(|| EngineError::not_found("place", dest))?;

        if let Some(route) = self.graph.flow_route(src, dest) {
            return Ok(vec![
                ContainerSpec::new(ControlValue::True, route.open.clone()),
                ContainerSpec::new(ControlValue::False, route.close.clone()),
            ]);
        }

        let mut open: Vec<NodeId> = src_place.drain_actuators.clone();
        for node_id in &dest_place.fill_actuators {
            if !open.contains(node_id) {
                open.push(node_id.clone());
            }
        }
        if open.is_empty() {
            return Err(EngineError::validation(format!(
                "no actuators move brine from {src} to {dest}"
            )));
        }
        Ok(vec![ContainerSpec::new(ControlValue::True, open)])
    }

    fn logger_node_ids(&self, logger_ids: &[String]) -> EngineResult<Vec<NodeId>> {
        let ids: Vec<String> = if logger_ids.is_empty() {
            self.graph.logger_ids().cloned().collect()
        } else {
            logger_ids.to_vec()
        };
        let mut node_ids: Vec<NodeId> = Vec::new();
        for logger_id in &ids {
            let nodes = self
                .graph
                .logger_nodes(logger_id)
                .ok_or_else(|| EngineError::not_found("data logger", logger_id))?;
            for node_id in nodes {
                if !node_ids.contains(node_id) {
                    node_ids.push(node_id.clone());
                }
            }
        }
        Ok(node_ids)
    }
}

fn settlement_step(settlement: &Settlement) -> WrapCommandStep {
    match settlement {
        Settlement::Running(_) => WrapCommandStep::Running,
        Settlement::Finished(command) => command.step,
    }
}

/// TRUE <-> FALSE, dropping containers with no inverse
fn invert_binary(containers: Vec<ContainerSpec>) -> Vec<ContainerSpec> {
    containers
        .into_iter()
        .filter_map(|c| {
            c.control_value.inverse().map(|inverse| ContainerSpec {
                control_value: inverse,
                set_value: None,
                node_ids: c.node_ids,
            })
        })
        .collect()
}

/// A CANCEL request for a target with nothing active: turn its TRUE actuators off
fn turn_off_spec(mut spec: WrapCommandSpec) -> EngineResult<WrapCommandSpec> {
    let node_ids: Vec<NodeId> = spec
        .containers
        .iter()
        .filter(|c| c.control_value == ControlValue::True)
        .flat_map(|c| c.node_ids.iter().cloned())
        .collect();
    if node_ids.is_empty() {
        return Err(EngineError::not_found("active command", spec.wrap_cmd_id));
    }
    spec.containers = vec![ContainerSpec::new(ControlValue::False, node_ids)];
    spec.goal = None;
    Ok(spec)
}
