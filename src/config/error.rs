//! Configuration Error Types
//!
//! Specific, actionable error messages for configuration loading and
//! topology validation failures.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid TOML syntax or shape in configuration file
    #[error("Invalid TOML in '{file_path}': {error}")]
    InvalidToml { file_path: String, error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Topology references an entity that is not declared
    #[error("Unknown {kind} '{id}' referenced by {referenced_by}")]
    UnknownReference {
        kind: String,
        id: String,
        referenced_by: String,
    },

    /// The same identifier is declared twice
    #[error("Duplicate {kind} '{id}'")]
    Duplicate { kind: String, id: String },

    /// File I/O errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    /// Errors raised by the layered settings builder
    #[error("Failed to build configuration: {0}")]
    Build(String),
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn invalid_toml(file_path: impl Into<String>, error: impl ToString) -> Self {
        Self::InvalidToml {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn unknown_reference(
        kind: impl Into<String>,
        id: impl Into<String>,
        referenced_by: impl Into<String>,
    ) -> Self {
        Self::UnknownReference {
            kind: kind.into(),
            id: id.into(),
            referenced_by: referenced_by.into(),
        }
    }

    pub fn duplicate(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn file_read_error(file_path: impl Into<String>, error: std::io::Error) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        ConfigurationError::Build(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
