//! Error types for the Scout service-discovery engine.
//!
//! All errors implement `std::error::Error`. Failures are contained per
//! configuration key; none of them is fatal to the parent process.

use std::io;
use thiserror::Error;

/// Result type alias using [`ScoutError`] as the error type.
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Top-level error type for all Scout operations.
#[derive(Debug, Error)]
pub enum ScoutError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline lifecycle errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Remote-configuration protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors related to configuration declarations and the daemon config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to load a configuration file
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Configuration content could not be parsed
    #[error("Failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// A declaration must select exactly one discoverer
    #[error("Invalid discoverer selection: {reason}")]
    InvalidDiscoverer { reason: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

impl ConfigError {
    /// Creates a load failed error.
    pub fn load_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a parse failed error.
    pub fn parse_failed(reason: impl Into<String>) -> Self {
        Self::ParseFailed {
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation failed error.
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }
}

/// Errors related to pipeline construction and lifecycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline construction failed
    #[error("Failed to construct pipeline '{name}': {reason}")]
    ConstructionFailed { name: String, reason: String },

    /// The requested discoverer has no runtime backend in this build
    #[error("Unsupported discoverer: {kind}")]
    UnsupportedDiscoverer { kind: String },

    /// A discovery source could not be read
    #[error("Discovery source error: {reason}")]
    SourceError { reason: String },
}

impl PipelineError {
    /// Creates a construction failed error.
    pub fn construction_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConstructionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a source error.
    pub fn source_error(reason: impl Into<String>) -> Self {
        Self::SourceError {
            reason: reason.into(),
        }
    }
}

/// Errors related to the remote-configuration protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An inbound command frame could not be decoded
    #[error("Malformed command frame: {reason}")]
    MalformedFrame { reason: String },

    /// A command referenced an id outside this agent's namespace
    #[error("Unknown config id: {id}")]
    UnknownId { id: String },

    /// Writing an outbound frame failed
    #[error("Failed to write frame: {reason}")]
    WriteFailed { reason: String },
}

impl ProtocolError {
    /// Creates a malformed frame error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_helpers() {
        let err = ConfigError::missing_field("name");
        assert!(matches!(err, ConfigError::MissingField { .. }));

        let err = ConfigError::invalid_value("interval", "must be positive");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::construction_failed("docker-job", "no backend");
        let display = format!("{}", err);
        assert!(display.contains("docker-job"));
        assert!(display.contains("no backend"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let scout_err: ScoutError = io_err.into();
        assert!(matches!(scout_err, ScoutError::Io(_)));
    }
}
