//! # Scout Pipeline
//!
//! Discovery pipelines and their lifecycle management.
//!
//! - **Declarations**: [`PipelineConfig`] is the single declaration model
//!   parsed from `*.conf` files (YAML) and remote-command payloads (JSON).
//! - **Contract**: a pipeline is anything implementing [`Pipeline`]: run
//!   until cancelled, emitting batches of source-tagged target groups.
//!   Concrete pipelines are produced by a [`PipelineFactory`] keyed on the
//!   declaration's discoverer kind.
//! - **Manager**: [`PipelineManager`] owns every running pipeline, starts,
//!   stops and restarts them, tracks the sources each pipeline contributed,
//!   and sweeps the grace-period pending-removal set.

pub mod config;
pub mod discoverers;
pub mod manager;
pub mod net_listeners;
pub mod pipeline;

pub use config::{DiscovererConfig, PipelineConfig, ServiceRuleConfig};
pub use manager::{ManagerTiming, PipelineManager};
pub use net_listeners::NetListenersPipeline;
pub use pipeline::{DefaultFactory, Pipeline, PipelineFactory};
