//! # Scout SD
//!
//! The service-discovery orchestrator.
//!
//! [`ServiceDiscovery`] reconciles two configuration sources (`*.conf`
//! files on disk and remote-configuration commands) into one consistent
//! set of running discovery pipelines. File events and state-changing
//! commands are serviced one at a time by a single consumer loop; pipelines
//! and the grace-period sweep run as independent workers supervised by the
//! pipeline manager.

pub mod conffile;
pub mod job;
pub mod sd;

mod dyncfg_ops;

#[cfg(test)]
pub(crate) mod testutil;

pub use conffile::{ConfDirProvider, ConfFile};
pub use job::JobConfig;
pub use sd::{RunState, SdOpts, ServiceDiscovery};
