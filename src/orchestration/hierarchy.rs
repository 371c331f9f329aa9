//! # Command Hierarchy
//!
//! Active-command registry and lifecycle driver for wrap commands. Elements
//! never point back at their parent: an element id index resolves acks to the
//! owning wrap command, and each completion returns an
//! [`ElementCompletion`] the hierarchy acts on.
//!
//! Commands reaching COMPLETE or END are evicted together with their overlap
//! dependencies and element reservations. Acks for evicted or cancelled
//! elements are logged and dropped.

use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::{AckKind, DeviceAction, DeviceCommand, ElementAck};
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::logging::log_command_operation;
use crate::models::{
    CommandType, ContainerCommand, ElementCommand, ElementCompletion, NodeId, WrapCommand,
    WrapCommandSpec,
};
use crate::orchestration::overlap::OverlapTracker;
use crate::orchestration::strategy::container_dispatch_order;
use crate::state_machine::{CommandEvent, StepTransition, WrapCommandStateMachine, WrapCommandStep};
use crate::system_context::EngineContext;

/// Where a command ended up after all its elements completed
#[derive(Debug, Clone)]
pub enum Settlement {
    /// Elements are done and a live goal is pending
    Running(Uuid),
    /// COMPLETE or END; the command has been evicted
    Finished(Box<WrapCommand>),
}

#[derive(Debug, Clone)]
pub enum AckOutcome {
    /// Unknown element or command, dropped
    Stale,
    /// Duplicate or out-of-place ack, nothing changed
    Ignored,
    /// State advanced, command still in flight
    Progressed,
    Settled(Settlement),
}

#[derive(Debug, Default)]
pub struct CommandHierarchy {
    active: HashMap<Uuid, WrapCommand>,
    /// element id -> owning wrap command uuid, pending elements only
    element_index: HashMap<Uuid, Uuid>,
}

impl CommandHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a new command in WAIT
    pub fn create(&mut self, spec: &WrapCommandSpec, containers: Vec<ContainerCommand>) -> Uuid {
        self.insert(WrapCommand::new(spec, containers))
    }

    /// Register an already built command
    pub fn insert(&mut self, command: WrapCommand) -> Uuid {
        let wrap_cmd_uuid = command.wrap_cmd_uuid;
        self.index_elements(&command);

        log_command_operation(
            "create",
            &command.wrap_cmd_id,
            Some(wrap_cmd_uuid),
            &command.step.to_string(),
            Some(&format!(
                "{} {} with {} elements",
                command.format,
                command.cmd_type,
                command.elements().count()
            )),
        );
        self.active.insert(wrap_cmd_uuid, command);
        wrap_cmd_uuid
    }

    /// Send every pending element to the device layer. Legal only from WAIT.
    pub fn dispatch(
        &mut self,
        wrap_cmd_uuid: Uuid,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> EngineResult<Option<Settlement>> {
        let command = self
            .active
            .get_mut(&wrap_cmd_uuid)
            .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))?;
        if command.step != WrapCommandStep::Wait {
            return Err(EngineError::StateMachine(format!(
                "dispatch of {} requires WAIT, step is {}",
                command.wrap_cmd_id, command.step
            )));
        }

        let mut sent = 0usize;
        for index in container_dispatch_order(&command.containers) {
            let rank = command.rank;
            for element in command.containers[index]
                .elements
                .iter_mut()
                .filter(|e| e.is_pending())
            {
                overlap.reserve_element(
                    &element.node_id,
                    element.control_value,
                    element.set_value,
                    element.element_id,
                );
                let device_command =
                    device_command(DeviceAction::Execute, wrap_cmd_uuid, rank, element);
                match ctx.device_link.dispatch_element(device_command) {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        warn!(
                            element_id = %element.element_id,
                            node_id = %element.node_id,
                            error = %e,
                            "Element dispatch failed"
                        );
                        element.error = Some(e.to_string());
                        ctx.event_publisher.publish(EngineEvent::DeviceError {
                            node_id: Some(element.node_id.clone()),
                            element_id: Some(element.element_id),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        debug!(
            wrap_cmd_id = %command.wrap_cmd_id,
            wrap_cmd_uuid = %wrap_cmd_uuid,
            sent,
            "Wrap command dispatched"
        );

        if command.is_complete() {
            // every element was ignored
            self.transition(wrap_cmd_uuid, CommandEvent::Start, ctx)?;
            return self.settle(wrap_cmd_uuid, ctx, overlap).map(Some);
        }
        Ok(None)
    }

    /// Apply a device acknowledgement
    pub fn on_element_ack(
        &mut self,
        ack: ElementAck,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> EngineResult<AckOutcome> {
        let Some(wrap_cmd_uuid) = self.element_index.get(&ack.element_id).copied() else {
            let stale = EngineError::StaleAck {
                element_id: ack.element_id,
            };
            warn!(error = %stale, kind = ?ack.kind, "Ack for untracked element dropped");
            return Ok(AckOutcome::Stale);
        };
        let Some(step) = self.active.get(&wrap_cmd_uuid).map(|c| c.step) else {
            self.element_index.remove(&ack.element_id);
            let stale = EngineError::StaleAck {
                element_id: ack.element_id,
            };
            warn!(error = %stale, wrap_cmd_uuid = %wrap_cmd_uuid, "Ack for evicted command dropped");
            return Ok(AckOutcome::Stale);
        };

        match ack.kind {
            AckKind::Start => {
                if step == WrapCommandStep::Wait {
                    self.transition(wrap_cmd_uuid, CommandEvent::Start, ctx)?;
                    Ok(AckOutcome::Progressed)
                } else {
                    Ok(AckOutcome::Ignored)
                }
            }
            AckKind::Terminate | AckKind::Delete => {
                if step == WrapCommandStep::Wait {
                    // terminal ack overtook the start ack
                    self.transition(wrap_cmd_uuid, CommandEvent::Start, ctx)?;
                }
                self.complete_element(wrap_cmd_uuid, ack.element_id, ctx, overlap)
            }
        }
    }

    fn complete_element(
        &mut self,
        wrap_cmd_uuid: Uuid,
        element_id: Uuid,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> EngineResult<AckOutcome> {
        let command = self
            .active
            .get_mut(&wrap_cmd_uuid)
            .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))?;

        match command.complete_element(element_id) {
            ElementCompletion::Unknown => {
                self.element_index.remove(&element_id);
                let stale = EngineError::StaleAck { element_id };
                debug!(error = %stale, "Ack for replaced element dropped");
                Ok(AckOutcome::Stale)
            }
            ElementCompletion::AlreadyComplete => Ok(AckOutcome::Ignored),
            ElementCompletion::Completed { all_complete } => {
                if let Some(element) = command.element(element_id) {
                    overlap.release_element(
                        &element.node_id,
                        element.control_value,
                        element.set_value,
                        element_id,
                    );
                }
                self.element_index.remove(&element_id);
                if all_complete {
                    self.settle(wrap_cmd_uuid, ctx, overlap)
                        .map(AckOutcome::Settled)
                } else {
                    Ok(AckOutcome::Progressed)
                }
            }
        }
    }

    /// PROCEED with every element complete: move on to COMPLETE, RUNNING or END
    fn settle(
        &mut self,
        wrap_cmd_uuid: Uuid,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> EngineResult<Settlement> {
        let transition = self.transition(wrap_cmd_uuid, CommandEvent::ElementsComplete, ctx)?;
        if transition.to == WrapCommandStep::Running {
            return Ok(Settlement::Running(wrap_cmd_uuid));
        }
        self.evict(wrap_cmd_uuid, ctx, overlap)
            .map(|command| Settlement::Finished(Box::new(command)))
            .ok_or_else(|| EngineError::Internal(format!("{wrap_cmd_uuid} vanished while settling")))
    }

    /// RUNNING -> END after the goal was met or its time limit passed
    pub fn goal_reached(
        &mut self,
        wrap_cmd_uuid: Uuid,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> EngineResult<WrapCommand> {
        self.transition(wrap_cmd_uuid, CommandEvent::GoalReached, ctx)?;
        self.evict(wrap_cmd_uuid, ctx, overlap)
            .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))
    }

    /// Cancel an active command.
    ///
    /// Pending elements are pulled from the device queue and the command's
    /// overlap dependencies are dropped. With `restore` non-empty the command
    /// returns to WAIT carrying the restore elements and is dispatched again;
    /// otherwise it ends.
    pub fn cancel(
        &mut self,
        wrap_cmd_uuid: Uuid,
        restore: Vec<ContainerCommand>,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> EngineResult<Option<Settlement>> {
        self.transition(wrap_cmd_uuid, CommandEvent::Cancel, ctx)?;

        let command = self
            .active
            .get(&wrap_cmd_uuid)
            .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))?;
        for element in command.pending_elements() {
            let cancel = device_command(DeviceAction::Cancel, wrap_cmd_uuid, command.rank, element);
            if let Err(e) = ctx.device_link.dispatch_element(cancel) {
                warn!(element_id = %element.element_id, error = %e, "Element cancel dispatch failed");
            }
        }
        self.release_elements(wrap_cmd_uuid, overlap);
        overlap.release_all(wrap_cmd_uuid);

        if restore.is_empty() {
            self.transition(wrap_cmd_uuid, CommandEvent::NothingToRestore, ctx)?;
            let command = self
                .evict(wrap_cmd_uuid, ctx, overlap)
                .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))?;
            return Ok(Some(Settlement::Finished(Box::new(command))));
        }

        let element_ids: Vec<Uuid> = match self.active.get_mut(&wrap_cmd_uuid) {
            Some(command) => {
                command.replace_containers(restore);
                command.pending_elements().map(|e| e.element_id).collect()
            }
            None => Vec::new(),
        };
        self.index_elements_of(wrap_cmd_uuid, element_ids);
        self.transition(wrap_cmd_uuid, CommandEvent::RestoreDispatched, ctx)?;
        self.dispatch(wrap_cmd_uuid, ctx, overlap)
    }

    /// Flag a device error on the element; it stays pending
    pub fn on_device_error(&mut self, element_id: Uuid, message: &str) -> Option<NodeId> {
        let wrap_cmd_uuid = self.element_index.get(&element_id)?;
        let element = self
            .active
            .get_mut(wrap_cmd_uuid)
            .and_then(|command| command.element_mut(element_id))?;
        element.error = Some(message.to_string());
        Some(element.node_id.clone())
    }

    pub fn get(&self, wrap_cmd_uuid: Uuid) -> Option<&WrapCommand> {
        self.active.get(&wrap_cmd_uuid)
    }

    /// Active command with this logical id and type
    pub fn find_active(&self, wrap_cmd_id: &str, cmd_type: CommandType) -> Option<&WrapCommand> {
        self.active
            .values()
            .find(|c| c.wrap_cmd_id == wrap_cmd_id && c.cmd_type == cmd_type)
    }

    /// Oldest active, not yet cancelled command with this logical id
    pub fn find_cancellable(&self, wrap_cmd_id: &str) -> Option<&WrapCommand> {
        self.active
            .values()
            .filter(|c| c.wrap_cmd_id == wrap_cmd_id && c.cmd_type != CommandType::Cancel)
            .filter(|c| c.step.can_cancel())
            .min_by_key(|c| c.created_at)
    }

    pub fn active(&self) -> impl Iterator<Item = &WrapCommand> {
        self.active.values()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn tracked_elements(&self) -> usize {
        self.element_index.len()
    }

    fn transition(
        &mut self,
        wrap_cmd_uuid: Uuid,
        event: CommandEvent,
        ctx: &EngineContext,
    ) -> EngineResult<StepTransition> {
        let command = self
            .active
            .get_mut(&wrap_cmd_uuid)
            .ok_or_else(|| EngineError::not_found("wrap command", wrap_cmd_uuid.to_string()))?;
        let transition = WrapCommandStateMachine::transition(command, event)?;
        ctx.event_publisher.publish(EngineEvent::WrapCommandStepChanged {
            wrap_cmd_uuid,
            wrap_cmd_id: command.wrap_cmd_id.clone(),
            cmd_type: command.cmd_type,
            from: transition.from,
            to: transition.to,
        });
        Ok(transition)
    }

    fn evict(
        &mut self,
        wrap_cmd_uuid: Uuid,
        ctx: &EngineContext,
        overlap: &mut OverlapTracker,
    ) -> Option<WrapCommand> {
        self.release_elements(wrap_cmd_uuid, overlap);
        let command = self.active.remove(&wrap_cmd_uuid)?;
        overlap.release_all(wrap_cmd_uuid);

        info!(
            wrap_cmd_id = %command.wrap_cmd_id,
            wrap_cmd_uuid = %wrap_cmd_uuid,
            cmd_type = %command.cmd_type,
            step = %command.step,
            "Wrap command finished"
        );
        ctx.event_publisher.publish(EngineEvent::CommandCompleted {
            wrap_cmd_uuid,
            wrap_cmd_id: command.wrap_cmd_id.clone(),
            cmd_type: command.cmd_type,
            final_step: command.step,
        });
        Some(command)
    }

    /// Drop index entries and reservations held by the command's elements
    fn release_elements(&mut self, wrap_cmd_uuid: Uuid, overlap: &mut OverlapTracker) {
        let Some(command) = self.active.get(&wrap_cmd_uuid) else {
            return;
        };
        for element in command.elements() {
            self.element_index.remove(&element.element_id);
            overlap.release_element(
                &element.node_id,
                element.control_value,
                element.set_value,
                element.element_id,
            );
        }
    }

    fn index_elements(&mut self, command: &WrapCommand) {
        let ids = command
            .pending_elements()
            .map(|e| e.element_id)
            .collect::<Vec<_>>();
        self.index_elements_of(command.wrap_cmd_uuid, ids);
    }

    fn index_elements_of(&mut self, wrap_cmd_uuid: Uuid, element_ids: Vec<Uuid>) {
        for element_id in element_ids {
            self.element_index.insert(element_id, wrap_cmd_uuid);
        }
    }
}

fn device_command(
    action: DeviceAction,
    wrap_cmd_uuid: Uuid,
    rank: u8,
    element: &ElementCommand,
) -> DeviceCommand {
    DeviceCommand {
        action,
        element_id: element.element_id,
        wrap_cmd_uuid,
        node_id: element.node_id.clone(),
        control_value: element.control_value,
        set_value: element.set_value,
        rank,
    }
}
