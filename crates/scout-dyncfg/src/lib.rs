//! # Scout Dyncfg
//!
//! The remote-configuration protocol layer.
//!
//! - **Commands in**: [`Function`] values decoded from the line-oriented
//!   command stream (`FUNCTION` / `FUNCTION_PAYLOAD` frames).
//! - **Frames out**: [`WireWriter`] encodes `CONFIG` advertisements and
//!   `FUNCTION_RESULT` replies onto an injected sink.
//! - **Registries**: the shared locked-cache abstraction backing the
//!   orchestrator's `seen` and `exposed` registries.
//! - **Schemas**: per-discoverer JSON schemas with a generic fallback.

pub mod cache;
pub mod function;
pub mod response;
pub mod schema;
pub mod wire;

pub use cache::{CacheKeyed, ExposedCache, ExposedEntry, SeenCache};
pub use function::{ConfigId, Function, FunctionReader};
pub use wire::{ConfigScope, WireWriter};
