//! # Engine Configuration
//!
//! Two configuration documents drive the engine:
//!
//! - [`EngineConfig`]: runtime settings (initial control mode, channel sizes,
//!   persistence batching, algorithm node definitions). Layered from
//!   `base/engine.toml`, an optional per-environment override and
//!   `BRINECTL__`-prefixed environment variables.
//! - [`TopologyConfig`]: the read-only snapshot of places, nodes, thresholds,
//!   data loggers, flow routes and command presets loaded once at startup.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use brinectl_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let mode = manager.config().engine.control_mode;
//! let topology = manager.load_topology()?;
//! println!("{mode} mode, {} places", topology.places.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod topology;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{ControlMode, DEFAULT_RANK};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;
pub use topology::{
    DataLoggerConfig, FlowRouteConfig, NodeConfig, PlaceConfig, PlaceKind, PresetConfig,
    TopologyConfig,
};

/// Root runtime configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Command orchestration settings
    pub engine: EngineSettings,

    /// Outbound reading persistence settings
    pub persistence: PersistenceConfig,

    /// Autonomous algorithm settings
    pub algorithm: AlgorithmConfig,

    /// Path of the topology snapshot, relative paths resolve against the config directory
    pub topology_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Control mode the engine starts in
    pub control_mode: ControlMode,
    /// Capacity of the lifecycle event broadcast channel
    pub event_channel_capacity: usize,
    /// Capacity of the processor's inbound command channel
    pub command_buffer_size: usize,
    /// Rank assigned to requests that carry none
    pub default_rank: u8,
    /// Issue a turn-off command when a goal-driven flow reaches its goal
    pub cancel_on_goal_complete: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::Manual,
            event_channel_capacity: 1000,
            command_buffer_size: 1024,
            default_rank: DEFAULT_RANK,
            cancel_on_goal_complete: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Number of buffered readings that triggers a write
    pub batch_size: usize,
    /// Interval of the processor's periodic flush
    pub flush_interval_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    /// Node definition whose status drives autonomous flow decisions
    pub water_level_node_def: String,
    /// Node definition watched for salinity statuses
    pub salinity_node_def: String,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            water_level_node_def: "waterLevel".to_string(),
            salinity_node_def: "salinity".to_string(),
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.event_channel_capacity",
                "0",
                "broadcast channel capacity must be positive",
            ));
        }
        if self.engine.command_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.command_buffer_size",
                "0",
                "command channel capacity must be positive",
            ));
        }
        if self.persistence.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "persistence.batch_size",
                "0",
                "batch size must be positive",
            ));
        }
        if self.persistence.flush_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "persistence.flush_interval_ms",
                "0",
                "flush interval must be positive",
            ));
        }
        if self.algorithm.water_level_node_def.trim().is_empty() {
            return Err(ConfigurationError::MissingRequiredField {
                field: "water_level_node_def".to_string(),
                context: "algorithm".to_string(),
            });
        }
        Ok(())
    }
}
