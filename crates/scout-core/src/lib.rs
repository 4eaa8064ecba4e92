//! # Scout Core
//!
//! Core types, error handling, and daemon configuration for the Scout
//! service-discovery engine.
//!
//! This crate provides the foundational building blocks shared by every
//! other crate in the workspace:
//!
//! - **Types**: discoverer kinds, config source kinds and their priorities,
//!   config lifecycle statuses, and the target/group structures that flow
//!   from discovery pipelines to the downstream consumer.
//! - **Errors**: `thiserror`-based error types covering configuration,
//!   pipeline, and protocol failure modes.
//! - **Configuration**: the daemon configuration loaded from a YAML file
//!   and validated before use.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{ActivationMode, AppConfig};
pub use error::{ConfigError, PipelineError, ProtocolError, Result, ScoutError};
pub use types::{ConfigStatus, DiscovererKind, SourceKind, Target, TargetGroup};
