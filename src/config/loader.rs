//! Configuration Loader
//!
//! Environment-aware loading of [`EngineConfig`]. Layers, lowest first:
//!
//! 1. `<config_dir>/base/engine.toml` (required)
//! 2. `<config_dir>/environments/<env>/engine.toml` (optional)
//! 3. `BRINECTL__SECTION__KEY` environment variables

use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::topology::TopologyConfig;
use super::EngineConfig;

const ENV_PREFIX: &str = "BRINECTL";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading engine configuration"
        );

        let base_path = config_directory.join("base").join("engine.toml");
        if !base_path.is_file() {
            return Err(ConfigurationError::config_file_not_found(vec![base_path]));
        }
        let env_path = config_directory
            .join("environments")
            .join(environment)
            .join("engine.toml");

        let settings = Config::builder()
            .add_source(File::from(base_path.as_path()).format(FileFormat::Toml))
            .add_source(
                File::from(env_path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::invalid_toml(base_path.display().to_string(), e))?;
        config.validate()?;

        info!(
            environment = environment,
            control_mode = %config.engine.control_mode,
            batch_size = config.persistence.batch_size,
            "Configuration loaded successfully"
        );
        debug!(
            "Effective configuration: {}",
            serde_json::to_string_pretty(&config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, used by embedding hosts and tests
    pub fn from_config(config: EngineConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Load the topology snapshot named by `topology_path`
    pub fn load_topology(&self) -> ConfigResult<TopologyConfig> {
        let relative = self.config.topology_path.as_ref().ok_or_else(|| {
            ConfigurationError::MissingRequiredField {
                field: "topology_path".to_string(),
                context: "engine configuration".to_string(),
            }
        })?;
        let path = if relative.is_absolute() {
            relative.clone()
        } else {
            self.config_directory.join(relative)
        };
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(vec![path]));
        }
        TopologyConfig::from_file(&path)
    }

    /// Environment name, shared with the logging setup
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        env::var("BRINECTL_CONFIG_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config").join("brinectl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ControlMode;
    use std::fs;

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_environment_detection_matches_logging() {
        assert_eq!(
            ConfigManager::detect_environment(),
            crate::logging::get_environment()
        );
    }

    #[test]
    fn test_missing_base_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_environment_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base/engine.toml",
            "[engine]\ncontrol_mode = \"manual\"\n[persistence]\nbatch_size = 50\n",
        );
        write(
            dir.path(),
            "environments/production/engine.toml",
            "[engine]\ncontrol_mode = \"automatic\"\n",
        );

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();
        assert_eq!(manager.config().engine.control_mode, ControlMode::Automatic);
        assert_eq!(manager.config().persistence.batch_size, 50);
        assert_eq!(manager.environment(), "production");
    }

    #[test]
    fn test_topology_resolves_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base/engine.toml", "topology_path = \"topology.toml\"\n");
        write(
            dir.path(),
            "topology.toml",
            "[[places]]\nid = \"R1\"\n[[places.nodes]]\nnode_id = \"WL_R1\"\nnode_def_id = \"waterLevel\"\n",
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let topology = manager.load_topology().unwrap();
        assert_eq!(topology.places[0].nodes[0].node_id, "WL_R1");
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base/engine.toml", "[persistence]\nbatch_size = 0\n");
        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
