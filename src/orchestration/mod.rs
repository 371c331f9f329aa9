//! # Orchestration Engine
//!
//! Command orchestration for the brine field.
//!
//! ## Core Components
//!
//! - **CommandManager**: facade owning all mutable engine state
//! - **EngineProcessor**: single dispatch context draining API calls and device events
//! - **CommandHierarchy**: wrap/container/element commands and their lifecycle
//! - **OverlapTracker**: per-actuator dependency counting and in-flight reservations
//! - **CommandStrategy**: turns a refined request into element commands, and computes restores
//! - **ThresholdTracker**: goal and time-limit tracking for RUNNING commands
//! - **ControlAlgorithm**: autonomous reactions to water-level status changes

pub mod algorithm;
pub mod command_manager;
pub mod hierarchy;
pub mod overlap;
pub mod processor;
pub mod strategy;
pub mod threshold;

pub use algorithm::{AlgorithmAction, ControlAlgorithm};
pub use command_manager::{CommandManager, EngineStats, NodeStatusView, WrapCommandHandle};
pub use hierarchy::{AckOutcome, CommandHierarchy, Settlement};
pub use overlap::{OverlapKey, OverlapStatus, OverlapTracker};
pub use processor::{EngineCommand, EngineHandle, EngineProcessor, TokioTimerScheduler};
pub use strategy::CommandStrategy;
pub use threshold::{
    ManualTimerScheduler, ThresholdCommandStorage, ThresholdGoal, ThresholdOutcome,
    ThresholdTracker, TimerScheduler, TimerToken,
};
