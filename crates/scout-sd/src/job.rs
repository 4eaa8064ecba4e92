//! The config record tracked by the registries.

use scout_core::types::{DiscovererKind, SourceKind};
use scout_dyncfg::cache::CacheKeyed;
use scout_pipeline::PipelineConfig;

/// One configuration as seen from one source.
///
/// The identity string distinguishes records sharing a composite key: a
/// removal only tears down the exposed config if the vanished record is the
/// one actually exposed, which guards against races with a newer add from a
/// different source. Identity is derived from provenance, so re-ingesting a
/// declaration from the same source yields the same identity.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    kind: DiscovererKind,
    source: String,
    source_kind: SourceKind,
    identity: String,
    /// The raw declaration this record carries.
    pub declaration: PipelineConfig,
}

impl JobConfig {
    pub fn new(
        kind: DiscovererKind,
        source_kind: SourceKind,
        source: impl Into<String>,
        declaration: PipelineConfig,
    ) -> Self {
        let source = source.into();
        let identity = format!("{}|{}|{}:{}", source_kind, source, kind, declaration.name);
        Self {
            kind,
            source,
            source_kind,
            identity,
            declaration,
        }
    }

    pub fn kind(&self) -> DiscovererKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    /// The manager's lookup key. File- and dyncfg-sourced pipelines under
    /// the same name never collide: files key by path, dyncfg by namespace.
    pub fn pipeline_key(&self) -> String {
        match self.source_kind {
            SourceKind::File => self.source.clone(),
            SourceKind::Dyncfg => format!("dyncfg:{}", self.composite_key()),
        }
    }
}

impl CacheKeyed for JobConfig {
    fn composite_key(&self) -> String {
        format!("{}:{}", self.kind, self.declaration.name)
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    fn uid(&self) -> &str {
        &self.identity
    }
}
