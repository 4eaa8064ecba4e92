//! The pipeline contract and the default factory.

use crate::config::PipelineConfig;
use crate::net_listeners::NetListenersPipeline;
use async_trait::async_trait;
use scout_core::error::{PipelineError, Result, ScoutError};
use scout_core::types::{DiscovererKind, TargetGroup};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A discovery strategy instance.
///
/// A pipeline runs until its token is cancelled, emitting batches of
/// source-tagged target groups on `out`. Dropping `out` without emitting is
/// allowed; emitting after cancellation is not observed.
#[async_trait]
pub trait Pipeline: Send + 'static {
    async fn run(self: Box<Self>, cancel: CancellationToken, out: mpsc::Sender<Vec<TargetGroup>>);
}

/// Builds a pipeline from a validated declaration.
pub trait PipelineFactory: Send + Sync + 'static {
    fn create(&self, config: &PipelineConfig) -> Result<Box<dyn Pipeline>>;
}

impl<F> PipelineFactory for F
where
    F: Fn(&PipelineConfig) -> Result<Box<dyn Pipeline>> + Send + Sync + 'static,
{
    fn create(&self, config: &PipelineConfig) -> Result<Box<dyn Pipeline>> {
        self(config)
    }
}

/// The in-tree factory.
///
/// `net_listeners` is fully implemented. The other discoverer kinds validate
/// but have no runtime backend in this build; constructing them surfaces an
/// error so the caller can report the failure instead of running a pipeline
/// that discovers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFactory;

impl PipelineFactory for DefaultFactory {
    fn create(&self, config: &PipelineConfig) -> Result<Box<dyn Pipeline>> {
        config.validate()?;

        let kind = config.discoverer_kind().ok_or_else(|| {
            ScoutError::from(PipelineError::construction_failed(
                &config.name,
                "declaration selects no discoverer",
            ))
        })?;

        match kind {
            DiscovererKind::NetListeners => {
                Ok(Box::new(NetListenersPipeline::new(config)?) as Box<dyn Pipeline>)
            }
            DiscovererKind::Docker | DiscovererKind::K8s | DiscovererKind::Snmp => {
                Err(PipelineError::UnsupportedDiscoverer {
                    kind: kind.to_string(),
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscovererConfig, ServiceRuleConfig};
    use crate::discoverers::{DockerConfig, NetListenersConfig};

    fn config_with(discoverer: DiscovererConfig) -> PipelineConfig {
        PipelineConfig {
            name: "test".to_string(),
            discoverer,
            services: vec![ServiceRuleConfig {
                id: "all".to_string(),
                match_expr: "true".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_factory_builds_net_listeners() {
        let cfg = config_with(DiscovererConfig {
            net_listeners: Some(NetListenersConfig::default()),
            ..Default::default()
        });
        assert!(DefaultFactory.create(&cfg).is_ok());
    }

    #[test]
    fn test_default_factory_rejects_unbacked_discoverer() {
        let cfg = config_with(DiscovererConfig {
            docker: Some(DockerConfig {
                address: "unix:///var/run/docker.sock".to_string(),
                timeout: None,
            }),
            ..Default::default()
        });
        let err = match DefaultFactory.create(&cfg) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("Unsupported discoverer"));
    }
}
