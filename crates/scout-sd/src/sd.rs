//! The orchestrator.
//!
//! One logical thread owns all configuration state: file events and
//! state-changing commands are serviced one at a time by [`ServiceDiscovery::run`],
//! while pipelines and the grace-period sweep run as independent workers
//! under the pipeline manager. Read-only commands are answered on the
//! caller without entering the loop.

use crate::conffile::ConfFile;
use crate::job::JobConfig;
use scout_core::config::ActivationMode;
use scout_core::error::Result;
use scout_core::types::{ConfigStatus, SourceKind, TargetGroup};
use scout_dyncfg::cache::{CacheKeyed, ExposedCache, ExposedEntry, SeenCache};
use scout_dyncfg::function::Function;
use scout_dyncfg::wire::{ConfigScope, WireWriter};
use scout_pipeline::manager::{ManagerTiming, PipelineManager};
use scout_pipeline::pipeline::PipelineFactory;
use scout_pipeline::PipelineConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the state-changing command queue.
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Base command set of a job advertisement; dyncfg-sourced jobs also get
/// `remove`.
const JOB_COMMANDS: &str = "schema get enable disable update test userconfig";
const TEMPLATE_COMMANDS: &str = "add schema enable disable test userconfig";

/// The orchestrator's loop state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Servicing file events and commands
    Normal,
    /// A freshly exposed config awaits an enable/disable decision; only
    /// commands are serviced until it arrives
    AwaitingActivation { key: String },
}

/// Construction options for [`ServiceDiscovery`].
pub struct SdOpts {
    pub agent_name: String,
    pub activation: ActivationMode,
    pub factory: Arc<dyn PipelineFactory>,
    pub writer: WireWriter,
    /// Downstream sink for job-group batches
    pub out: mpsc::Sender<Vec<TargetGroup>>,
    pub cancel: CancellationToken,
    pub timing: ManagerTiming,
}

/// The service-discovery orchestrator.
pub struct ServiceDiscovery {
    agent: String,
    path: String,
    activation: ActivationMode,
    pub(crate) seen: SeenCache<JobConfig>,
    pub(crate) exposed: ExposedCache<JobConfig>,
    pub(crate) mgr: PipelineManager,
    pub(crate) api: WireWriter,
    cancel: CancellationToken,
    cmd_tx: mpsc::Sender<Function>,
}

impl ServiceDiscovery {
    /// Creates the orchestrator and its command queue. Must be called from
    /// within a tokio runtime (the manager spawns its sweep worker).
    pub fn new(opts: SdOpts) -> (Self, mpsc::Receiver<Function>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let mgr = PipelineManager::with_timing(
            opts.factory,
            opts.out,
            opts.cancel.clone(),
            opts.timing,
        );
        let sd = Self {
            path: format!("/collectors/{}/ServiceDiscovery", opts.agent_name),
            agent: opts.agent_name,
            activation: opts.activation,
            seen: SeenCache::new(),
            exposed: ExposedCache::new(),
            mgr,
            api: opts.writer,
            cancel: opts.cancel,
            cmd_tx,
        };
        (sd, cmd_rx)
    }

    /// Entry point for decoded commands. Read-only commands are answered
    /// synchronously; state-changing ones are queued for the single
    /// consumer so concurrent commands never interleave mutations.
    pub fn dispatch(&self, function: Function) {
        match function.command() {
            "schema" | "get" | "test" | "userconfig" => self.answer_readonly(function),
            _ => {
                if let Err(e) = self.cmd_tx.try_send(function) {
                    warn!(error = %e, "dropping command; queue unavailable");
                }
            }
        }
    }

    /// The main loop. Advertises the discoverer templates, then services
    /// file events and queued commands until cancelled; on the way out it
    /// stops every pipeline.
    pub async fn run(
        &self,
        mut file_rx: mpsc::Receiver<ConfFile>,
        mut cmd_rx: mpsc::Receiver<Function>,
    ) {
        info!(agent = %self.agent, "service discovery started");
        self.register_templates();

        let mut state = RunState::Normal;
        loop {
            match state {
                RunState::Normal => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        Some(file) = file_rx.recv() => {
                            self.process_conf_file(file, &mut state).await;
                        }
                        Some(function) = cmd_rx.recv() => {
                            self.execute(function, &mut state).await;
                        }
                    }
                }
                RunState::AwaitingActivation { .. } => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        Some(function) = cmd_rx.recv() => {
                            self.execute(function, &mut state).await;
                        }
                    }
                }
            }
        }

        self.mgr.stop_all().await;
        info!(agent = %self.agent, "service discovery stopped");
    }

    /// Ingests one conf-file event.
    pub(crate) async fn process_conf_file(&self, file: ConfFile, state: &mut RunState) {
        if file.is_tombstone() {
            self.remove_source(&file.source).await;
            return;
        }

        let declaration = match PipelineConfig::from_yaml(&file.content) {
            Ok(d) => d,
            Err(e) => {
                warn!(source = %file.source, error = %e, "dropping conf file");
                return;
            }
        };
        let Some(kind) = declaration.discoverer_kind() else {
            warn!(source = %file.source, "dropping conf file: no single discoverer configured");
            return;
        };
        if declaration.disabled {
            info!(source = %file.source, name = %declaration.name, "skipping disabled declaration");
            return;
        }
        if let Err(e) = declaration.validate() {
            warn!(source = %file.source, error = %e, "dropping conf file");
            return;
        }

        let incoming = JobConfig::new(kind, SourceKind::File, file.source.clone(), declaration);
        let key = incoming.composite_key();

        // The source previously yielded a different composite key: retire
        // the stale record. Its pipeline is left alone; activating the new
        // record replaces it, so an invalid successor never kills it.
        for stale in self.seen.lookup_by_source(&file.source) {
            if stale.composite_key() == key {
                continue;
            }
            self.seen.remove(&stale);
            if let Some(entry) = self.exposed.lookup(&stale.composite_key()) {
                if entry.cfg.uid() == stale.uid() {
                    self.exposed.remove(&stale.composite_key());
                    self.api.config_delete(&self.job_id(&stale));
                    info!(
                        config = %stale.composite_key(),
                        source = %file.source,
                        "retired config whose source changed key"
                    );
                }
            }
        }

        self.seen.add(incoming.clone());

        match self.exposed.lookup(&key) {
            None => {
                self.expose(&incoming);
                self.decide_activation(incoming, state).await;
            }
            Some(existing) => {
                let existing_priority = existing.cfg.source_kind().priority();
                let incoming_priority = incoming.source_kind().priority();
                let existing_wins = existing_priority > incoming_priority
                    || (existing_priority == incoming_priority
                        && existing.status == ConfigStatus::Running);
                if existing_wins {
                    debug!(
                        config = %key,
                        source = %file.source,
                        "keeping existing config over new file declaration"
                    );
                    return;
                }
                if existing.status == ConfigStatus::Running {
                    self.mgr.stop(&existing.cfg.pipeline_key()).await;
                }
                self.expose(&incoming);
                self.decide_activation(incoming, state).await;
            }
        }
    }

    /// Removal of a vanished source: drop everything it provided, and tear
    /// down exposed configs only when the vanished record is the exposed
    /// one (identity match, not just key).
    async fn remove_source(&self, source: &str) {
        for record in self.seen.lookup_by_source(source) {
            self.seen.remove(&record);
            let key = record.composite_key();
            if let Some(entry) = self.exposed.lookup(&key) {
                if entry.cfg.uid() == record.uid() {
                    self.mgr.stop(&entry.cfg.pipeline_key()).await;
                    self.exposed.remove(&key);
                    self.api.config_delete(&self.job_id(&record));
                    info!(config = %key, source = %source, "removed config of vanished source");
                }
            }
        }
    }

    /// Advertises a config as `accepted`, replacing whatever was exposed
    /// under its key.
    pub(crate) fn expose(&self, cfg: &JobConfig) {
        self.exposed.add(ExposedEntry {
            cfg: cfg.clone(),
            status: ConfigStatus::Accepted,
        });
        self.api.config_create(
            &self.job_id(cfg),
            ConfigStatus::Accepted,
            ConfigScope::Job,
            &self.path,
            cfg.source_kind().as_str(),
            cfg.source(),
            self.job_commands(cfg.source_kind()),
        );
    }

    async fn decide_activation(&self, incoming: JobConfig, state: &mut RunState) {
        let key = incoming.composite_key();
        match self.activation {
            ActivationMode::AutoEnable => {
                if let Err(e) = self.activate(&key).await {
                    warn!(config = %key, error = %e, "failed to activate config");
                }
                let status = self
                    .exposed
                    .lookup(&key)
                    .map(|e| e.status)
                    .unwrap_or(ConfigStatus::Failed);
                self.api.config_status(&self.job_id(&incoming), status);
            }
            ActivationMode::WaitForCommand => {
                debug!(config = %key, "holding file ingestion until activation decision");
                *state = RunState::AwaitingActivation { key };
            }
        }
    }

    /// Starts the exposed config's pipeline and records the outcome in the
    /// registry. The caller emits the status frame.
    pub(crate) async fn activate(&self, key: &str) -> Result<()> {
        let Some(entry) = self.exposed.lookup(key) else {
            return Ok(());
        };
        match self
            .mgr
            .start(&entry.cfg.pipeline_key(), entry.cfg.declaration.clone())
            .await
        {
            Ok(()) => {
                self.exposed.set_status(key, ConfigStatus::Running);
                Ok(())
            }
            Err(e) => {
                self.exposed.set_status(key, ConfigStatus::Failed);
                Err(e)
            }
        }
    }

    fn register_templates(&self) {
        for kind in scout_core::types::DiscovererKind::ALL {
            self.api.config_create(
                &self.template_id(kind.as_str()),
                ConfigStatus::Accepted,
                ConfigScope::Template,
                &self.path,
                "internal",
                "internal",
                TEMPLATE_COMMANDS,
            );
        }
    }

    pub(crate) fn agent(&self) -> &str {
        &self.agent
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn template_id(&self, kind: &str) -> String {
        format!("{}:sd:{}", self.agent, kind)
    }

    pub(crate) fn job_id_for_key(&self, composite_key: &str) -> String {
        format!("{}:sd:{}", self.agent, composite_key)
    }

    pub(crate) fn job_id(&self, cfg: &JobConfig) -> String {
        self.job_id_for_key(&cfg.composite_key())
    }

    pub(crate) fn job_commands(&self, source_kind: SourceKind) -> &'static str {
        match source_kind {
            SourceKind::File => JOB_COMMANDS,
            SourceKind::Dyncfg => "schema get enable disable update test userconfig remove",
        }
    }
}
