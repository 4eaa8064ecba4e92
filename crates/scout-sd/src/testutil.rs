//! Shared helpers for the orchestrator tests.

use crate::conffile::ConfFile;
use crate::sd::{RunState, SdOpts, ServiceDiscovery};
use async_trait::async_trait;
use parking_lot::Mutex;
use scout_core::config::ActivationMode;
use scout_core::error::{PipelineError, Result, ScoutError};
use scout_core::types::{Target, TargetGroup};
use scout_dyncfg::function::Function;
use scout_dyncfg::wire::WireWriter;
use scout_pipeline::manager::ManagerTiming;
use scout_pipeline::pipeline::{Pipeline, PipelineFactory};
use scout_pipeline::{DiscovererConfig, PipelineConfig, ServiceRuleConfig};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Captures everything the orchestrator writes to the wire.
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    /// The captured frames, with blank lines and the startup template
    /// advertisements filtered out.
    pub(crate) fn transcript(&self) -> String {
        String::from_utf8(self.0.lock().clone())
            .expect("wire output is valid utf-8")
            .lines()
            .filter(|l| !l.is_empty())
            .filter(|l| !(l.starts_with("CONFIG ") && l.contains(" template ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Emits its scripted batch once, then waits for cancellation.
struct IdlePipeline {
    groups: Vec<TargetGroup>,
}

#[async_trait]
impl Pipeline for IdlePipeline {
    async fn run(self: Box<Self>, cancel: CancellationToken, out: mpsc::Sender<Vec<TargetGroup>>) {
        if !self.groups.is_empty() && out.send(self.groups).await.is_err() {
            return;
        }
        cancel.cancelled().await;
    }
}

/// Counts construction calls and starts failing from call `fail_from`
/// (1-based), if set.
struct TestFactory {
    calls: Arc<AtomicUsize>,
    fail_from: Option<usize>,
    groups: Vec<TargetGroup>,
}

impl PipelineFactory for TestFactory {
    fn create(&self, config: &PipelineConfig) -> Result<Box<dyn Pipeline>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.is_some_and(|from| call >= from) {
            return Err(ScoutError::from(PipelineError::construction_failed(
                &config.name,
                "scripted construction failure",
            )));
        }
        Ok(Box::new(IdlePipeline {
            groups: self.groups.clone(),
        }))
    }
}

/// A self-contained orchestrator instance with captured wire output.
pub(crate) struct Sim {
    pub sd: ServiceDiscovery,
    pub state: RunState,
    pub buf: SharedBuf,
    pub calls: Arc<AtomicUsize>,
    pub out_rx: mpsc::Receiver<Vec<TargetGroup>>,
    pub cmd_rx: mpsc::Receiver<Function>,
    pub cancel: CancellationToken,
}

impl Sim {
    pub(crate) fn new() -> Self {
        Self::build(ActivationMode::AutoEnable, None, Vec::new())
    }

    pub(crate) fn wait_mode() -> Self {
        Self::build(ActivationMode::WaitForCommand, None, Vec::new())
    }

    pub(crate) fn failing_from(call: usize) -> Self {
        Self::build(ActivationMode::AutoEnable, Some(call), Vec::new())
    }

    pub(crate) fn emitting(groups: Vec<TargetGroup>) -> Self {
        Self::build(ActivationMode::AutoEnable, None, groups)
    }

    fn build(
        activation: ActivationMode,
        fail_from: Option<usize>,
        groups: Vec<TargetGroup>,
    ) -> Self {
        let buf = SharedBuf::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (out_tx, out_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let (sd, cmd_rx) = ServiceDiscovery::new(SdOpts {
            agent_name: "scout".to_string(),
            activation,
            factory: Arc::new(TestFactory {
                calls: Arc::clone(&calls),
                fail_from,
                groups,
            }),
            writer: WireWriter::new(buf.clone()),
            out: out_tx,
            cancel: cancel.clone(),
            timing: ManagerTiming {
                grace_period: Duration::from_millis(150),
                sweep_interval: Duration::from_millis(25),
                stop_timeout: Duration::from_secs(1),
            },
        });

        Self {
            sd,
            state: RunState::Normal,
            buf,
            calls,
            out_rx,
            cmd_rx,
            cancel,
        }
    }

    pub(crate) async fn ingest(&mut self, source: &str, content: &str) {
        self.sd
            .process_conf_file(
                ConfFile {
                    source: source.to_string(),
                    content: content.to_string(),
                },
                &mut self.state,
            )
            .await;
    }

    pub(crate) async fn exec(
        &mut self,
        uid: &str,
        args: &[&str],
        payload: Option<Vec<u8>>,
        source: &str,
    ) {
        let function = make_function(uid, args, payload, source);
        self.sd.execute(function, &mut self.state).await;
    }

    pub(crate) fn readonly(&self, uid: &str, args: &[&str], payload: Option<Vec<u8>>) {
        let function = make_function(uid, args, payload, "");
        self.sd.answer_readonly(function);
    }

    pub(crate) fn transcript(&self) -> String {
        self.buf.transcript()
    }

    pub(crate) fn factory_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn make_function(
    uid: &str,
    args: &[&str],
    payload: Option<Vec<u8>>,
    source: &str,
) -> Function {
    Function {
        uid: uid.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        payload,
        source: source.to_string(),
        content_type: "application/json".to_string(),
    }
}

pub(crate) fn net_listeners_declaration(name: &str) -> PipelineConfig {
    PipelineConfig {
        name: name.to_string(),
        discoverer: DiscovererConfig {
            net_listeners: Some(Default::default()),
            ..Default::default()
        },
        services: vec![ServiceRuleConfig {
            id: "all".to_string(),
            match_expr: "true".to_string(),
        }],
        ..Default::default()
    }
}

pub(crate) fn json_payload(config: &PipelineConfig) -> Vec<u8> {
    serde_json::to_vec(config).expect("declaration serializes")
}

pub(crate) fn yaml_content(config: &PipelineConfig) -> String {
    serde_yaml::to_string(config).expect("declaration serializes")
}

pub(crate) fn group(source: &str, port: u16) -> TargetGroup {
    TargetGroup::new(
        source,
        vec![Target {
            protocol: "tcp".to_string(),
            address: "127.0.0.1".to_string(),
            port,
            comm: None,
        }],
    )
}
