//! # Engine Processor
//!
//! Single dispatch context for the engine. API calls and device-layer
//! events arrive as [`EngineCommand`]s on one bounded channel and are
//! applied to the [`CommandManager`] strictly one at a time, so no event
//! interleaves with another.
//!
//! API commands carry a oneshot responder. Device events are
//! fire-and-forget; their failures are logged and published, and a panic
//! while handling one event is contained so the loop keeps serving.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::ControlMode;
use crate::device::{DeviceErrorReport, ElementAck, NodeUpdate};
use crate::error::{EngineError, EngineResult};
use crate::models::{CommandRequest, GoalInfo};
use crate::orchestration::command_manager::{
    CommandManager, EngineStats, NodeStatusView, WrapCommandHandle,
};
use crate::orchestration::threshold::{TimerScheduler, TimerToken};
use crate::place::PlaceGraph;
use crate::system_context::EngineContext;

/// Engine command responder type
type CommandResponder<T> = oneshot::Sender<EngineResult<T>>;

/// Commands that can be sent to the EngineProcessor
#[derive(Debug)]
pub enum EngineCommand {
    SubmitCommand {
        request: CommandRequest,
        resp: CommandResponder<WrapCommandHandle>,
    },
    CancelCommand {
        wrap_cmd_id: String,
        resp: CommandResponder<()>,
    },
    QueryNodeStatus {
        node_id: String,
        resp: CommandResponder<NodeStatusView>,
    },
    ExecuteFlow {
        src_place_id: String,
        dest_place_id: String,
        goal: Option<GoalInfo>,
        resp: CommandResponder<WrapCommandHandle>,
    },
    ReloadPlaceStatus {
        place_id: String,
        node_def_ids: Vec<String>,
        resp: CommandResponder<Vec<NodeStatusView>>,
    },
    SetControlMode {
        mode: ControlMode,
        resp: CommandResponder<()>,
    },
    GetStats {
        resp: CommandResponder<EngineStats>,
    },
    FlushReadings {
        resp: CommandResponder<()>,
    },
    /// Device acknowledgement for one element
    ElementAck(ElementAck),
    /// New measured value for a node
    NodeUpdate(NodeUpdate),
    DeviceError(DeviceErrorReport),
    /// A goal time limit elapsed
    TimerExpired(TimerToken),
    /// Flush buffered readings and stop the processor
    Shutdown { resp: CommandResponder<()> },
}

impl EngineCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::SubmitCommand { .. } => "submit_command",
            Self::CancelCommand { .. } => "cancel_command",
            Self::QueryNodeStatus { .. } => "query_node_status",
            Self::ExecuteFlow { .. } => "execute_flow",
            Self::ReloadPlaceStatus { .. } => "reload_place_status",
            Self::SetControlMode { .. } => "set_control_mode",
            Self::GetStats { .. } => "get_stats",
            Self::FlushReadings { .. } => "flush_readings",
            Self::ElementAck(_) => "element_ack",
            Self::NodeUpdate(_) => "node_update",
            Self::DeviceError(_) => "device_error",
            Self::TimerExpired(_) => "timer_expired",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

/// Timer scheduler backed by tokio sleeps; expiry comes back as a command
#[derive(Debug)]
pub struct TokioTimerScheduler {
    sender: mpsc::Sender<EngineCommand>,
    timers: Arc<Mutex<HashMap<TimerToken, JoinHandle<()>>>>,
}

impl TokioTimerScheduler {
    pub fn new(sender: mpsc::Sender<EngineCommand>) -> Self {
        Self {
            sender,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }
}

impl TimerScheduler for TokioTimerScheduler {
    fn schedule(&self, token: TimerToken, after: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(wrap_cmd_uuid = %token.wrap_cmd_uuid, "No tokio runtime, goal timer not scheduled");
            return;
        };
        let sender = self.sender.clone();
        let timers = Arc::clone(&self.timers);
        // held until the handle is stored, so the task's removal always comes after
        let mut pending = self.timers.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            timers.lock().remove(&token);
            if sender.send(EngineCommand::TimerExpired(token)).await.is_err() {
                debug!(wrap_cmd_uuid = %token.wrap_cmd_uuid, "Processor gone before goal timer fired");
            }
        });
        if let Some(previous) = pending.insert(token, handle) {
            previous.abort();
        }
    }

    fn cancel(&self, token: TimerToken) {
        if let Some(handle) = self.timers.lock().remove(&token) {
            handle.abort();
        }
    }
}

/// Owns the command manager and drains the command channel
#[derive(Debug)]
pub struct EngineProcessor {
    manager: CommandManager,
    command_receiver: Option<mpsc::Receiver<EngineCommand>>,
    flush_interval: Duration,
}

impl EngineProcessor {
    /// Create a processor and the handle used to drive it
    pub fn new(ctx: EngineContext, graph: PlaceGraph) -> (Self, EngineHandle) {
        let (command_sender, command_receiver) =
            mpsc::channel(ctx.config.engine.command_buffer_size);
        let scheduler = Arc::new(TokioTimerScheduler::new(command_sender.clone()));
        let flush_interval = Duration::from_millis(ctx.config.persistence.flush_interval_ms);

        info!(
            engine_id = %ctx.engine_id,
            command_buffer_size = ctx.config.engine.command_buffer_size,
            flush_interval_ms = ctx.config.persistence.flush_interval_ms,
            "Creating EngineProcessor"
        );

        let processor = Self {
            manager: CommandManager::new(ctx, graph, scheduler),
            command_receiver: Some(command_receiver),
            flush_interval,
        };
        (processor, EngineHandle { sender: command_sender })
    }

    pub fn manager(&self) -> &CommandManager {
        &self.manager
    }

    /// Run until a shutdown command arrives
    pub async fn start(&mut self) -> EngineResult<()> {
        let mut command_receiver = self
            .command_receiver
            .take()
            .ok_or_else(|| EngineError::Internal("processor already started".to_string()))?;
        let mut flush_tick = tokio::time::interval(self.flush_interval);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(engine_id = %self.manager.context().engine_id, "EngineProcessor started");

        loop {
            tokio::select! {
                command = command_receiver.recv() => {
                    match command {
                        Some(cmd) => {
                            if !self.dispatch(cmd) {
                                break;
                            }
                        }
                        None => {
                            info!("Engine command channel closed");
                            self.manager.flush_readings();
                            break;
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    self.manager.flush_readings();
                }
            }
        }

        info!(engine_id = %self.manager.context().engine_id, "EngineProcessor shutdown complete");
        Ok(())
    }

    /// Handle one command with panics contained; false stops the loop
    fn dispatch(&mut self, command: EngineCommand) -> bool {
        let name = command.name();
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.handle_command(command))) {
            Ok(keep_running) => keep_running,
            Err(_) => {
                error!(command = name, "Engine command handler panicked, continuing");
                true
            }
        }
    }

    fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::SubmitCommand { request, resp } => {
                let _ = resp.send(self.manager.submit_command(request));
            }
            EngineCommand::CancelCommand { wrap_cmd_id, resp } => {
                let _ = resp.send(self.manager.cancel_command(&wrap_cmd_id));
            }
            EngineCommand::QueryNodeStatus { node_id, resp } => {
                let _ = resp.send(self.manager.query_node_status(&node_id));
            }
            EngineCommand::ExecuteFlow {
                src_place_id,
                dest_place_id,
                goal,
                resp,
            } => {
                let result = self
                    .manager
                    .execute_flow(&src_place_id, &dest_place_id, goal);
                let _ = resp.send(result);
            }
            EngineCommand::ReloadPlaceStatus {
                place_id,
                node_def_ids,
                resp,
            } => {
                let _ = resp.send(self.manager.reload_place_status(&place_id, &node_def_ids));
            }
            EngineCommand::SetControlMode { mode, resp } => {
                self.manager.set_control_mode(mode);
                let _ = resp.send(Ok(()));
            }
            EngineCommand::GetStats { resp } => {
                let _ = resp.send(Ok(self.manager.stats()));
            }
            EngineCommand::FlushReadings { resp } => {
                self.manager.flush_readings();
                let _ = resp.send(Ok(()));
            }
            EngineCommand::ElementAck(ack) => self.manager.on_element_ack(ack),
            EngineCommand::NodeUpdate(update) => self.manager.on_node_update(update),
            EngineCommand::DeviceError(report) => self.manager.on_device_error(report),
            EngineCommand::TimerExpired(token) => self.manager.on_timer_expired(token),
            EngineCommand::Shutdown { resp } => {
                info!("Shutting down EngineProcessor");
                self.manager.flush_readings();
                let _ = resp.send(Ok(()));
                return false;
            }
        }
        true
    }
}

/// Cloneable client side of the processor
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(CommandResponder<T>) -> EngineCommand,
    ) -> EngineResult<T> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.sender
            .send(build(resp_tx))
            .await
            .map_err(|e| EngineError::ChannelClosed(e.to_string()))?;
        resp_rx
            .await
            .map_err(|e| EngineError::ChannelClosed(e.to_string()))?
    }

    async fn notify(&self, command: EngineCommand) -> EngineResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|e| EngineError::ChannelClosed(e.to_string()))
    }

    pub async fn submit_command(&self, request: CommandRequest) -> EngineResult<WrapCommandHandle> {
        self.request(|resp| EngineCommand::SubmitCommand { request, resp })
            .await
    }

    pub async fn cancel_command(&self, wrap_cmd_id: impl Into<String>) -> EngineResult<()> {
        let wrap_cmd_id = wrap_cmd_id.into();
        self.request(|resp| EngineCommand::CancelCommand { wrap_cmd_id, resp })
            .await
    }

    pub async fn query_node_status(&self, node_id: impl Into<String>) -> EngineResult<NodeStatusView> {
        let node_id = node_id.into();
        self.request(|resp| EngineCommand::QueryNodeStatus { node_id, resp })
            .await
    }

    pub async fn execute_flow(
        &self,
        src_place_id: impl Into<String>,
        dest_place_id: impl Into<String>,
        goal: Option<GoalInfo>,
    ) -> EngineResult<WrapCommandHandle> {
        let src_place_id = src_place_id.into();
        let dest_place_id = dest_place_id.into();
        self.request(|resp| EngineCommand::ExecuteFlow {
            src_place_id,
            dest_place_id,
            goal,
            resp,
        })
        .await
    }

    pub async fn reload_place_status(
        &self,
        place_id: impl Into<String>,
        node_def_ids: Vec<String>,
    ) -> EngineResult<Vec<NodeStatusView>> {
        let place_id = place_id.into();
        self.request(|resp| EngineCommand::ReloadPlaceStatus {
            place_id,
            node_def_ids,
            resp,
        })
        .await
    }

    pub async fn set_control_mode(&self, mode: ControlMode) -> EngineResult<()> {
        self.request(|resp| EngineCommand::SetControlMode { mode, resp })
            .await
    }

    pub async fn stats(&self) -> EngineResult<EngineStats> {
        self.request(|resp| EngineCommand::GetStats { resp }).await
    }

    pub async fn flush_readings(&self) -> EngineResult<()> {
        self.request(|resp| EngineCommand::FlushReadings { resp })
            .await
    }

    pub async fn shutdown(&self) -> EngineResult<()> {
        self.request(|resp| EngineCommand::Shutdown { resp }).await
    }

    pub async fn element_ack(&self, ack: ElementAck) -> EngineResult<()> {
        self.notify(EngineCommand::ElementAck(ack)).await
    }

    pub async fn node_update(&self, update: NodeUpdate) -> EngineResult<()> {
        self.notify(EngineCommand::NodeUpdate(update)).await
    }

    pub async fn device_error(&self, report: DeviceErrorReport) -> EngineResult<()> {
        self.notify(EngineCommand::DeviceError(report)).await
    }
}
