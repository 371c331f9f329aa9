#![allow(clippy::doc_markdown)] // Allow technical terms like WCU, SCADA in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Brinectl Core
//!
//! Supervisory command orchestration for salt-field devices.
//!
//! ## Overview
//!
//! The engine accepts logical commands (open a valve, move brine from a
//! reservoir to a pond, run a preset, poll every data logger) and decomposes
//! them into a three-level hierarchy of wrap, container and element commands.
//! Element commands go out to the device layer; acknowledgements and node
//! updates come back in and drive each wrap command through its lifecycle
//! (`WAIT -> PROCEED -> RUNNING -> COMPLETE | END`, with `CANCEL` on the side).
//!
//! Shared actuators are protected by per-node dependency counting, so turning
//! one flow off never closes a valve another live flow still needs. RUNNING
//! commands may carry threshold goals which end them once met or once their
//! time limit passes. In automatic mode the engine reacts to water-level
//! status changes on its own.
//!
//! ## Module Organization
//!
//! - [`place`] - Place graph arena and node status evaluation
//! - [`models`] - Places, goals and the command hierarchy data model
//! - [`state_machine`] - Wrap command lifecycle
//! - [`orchestration`] - Overlap tracking, strategies, thresholds, the control algorithm and the command manager
//! - [`device`] - Boundary to the device layer
//! - [`persistence`] - Batched node readings
//! - [`config`] - Engine settings and topology snapshot
//! - [`events`] - Lifecycle event feed
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brinectl_core::config::TopologyConfig;
//! use brinectl_core::device::ChannelDeviceLink;
//! use brinectl_core::models::CommandRequest;
//! use brinectl_core::orchestration::EngineProcessor;
//! use brinectl_core::place::PlaceGraph;
//! use brinectl_core::system_context::EngineContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let topology = TopologyConfig::from_file("config/brinectl/topology.toml".as_ref())?;
//! let graph = PlaceGraph::from_topology(&topology)?;
//! let (link, _device_rx) = ChannelDeviceLink::new(256);
//! let ctx = EngineContext::with_device_link(Arc::new(link))?;
//!
//! let (mut processor, handle) = EngineProcessor::new(ctx, graph);
//! tokio::spawn(async move { processor.start().await });
//!
//! let submitted = handle.submit_command(CommandRequest::flow("R1", "P1")).await?;
//! println!("{} is {}", submitted.wrap_cmd_id, submitted.step);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod place;
pub mod state_machine;
pub mod system_context;

pub use config::{ConfigManager, EngineConfig, TopologyConfig};
pub use constants::{ControlMode, ControlValue, DeviceKind, NodeStatus};
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventPublisher};
pub use models::{CommandRequest, CommandTarget, CommandType, GoalInfo, WrapCommand};
pub use orchestration::{CommandManager, EngineHandle, EngineProcessor};
pub use place::PlaceGraph;
pub use state_machine::WrapCommandStep;
pub use system_context::EngineContext;
