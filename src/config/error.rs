//! Configuration Error Types
//!
//! Errors raised while locating, parsing and validating coordinator configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid YAML syntax in configuration file
    #[error("Invalid YAML in configuration file '{file_path}': {error}")]
    InvalidYaml { file_path: String, error: String },

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

    /// Configuration merging errors
    #[error("Failed to merge environment-specific configuration: {error}")]
    ConfigMergeError { error: String },

    /// File I/O errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },
}

impl ConfigurationError {
    /// Create a configuration file not found error
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    /// Create an invalid YAML error
    pub fn invalid_yaml<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::InvalidYaml {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a file read error
    pub fn file_read_error<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
