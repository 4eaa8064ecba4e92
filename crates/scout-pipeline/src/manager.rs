//! Pipeline lifecycle management.
//!
//! The manager owns every running pipeline, keyed by pipeline key. It tracks
//! the sources each pipeline contributed so stopping a pipeline retracts
//! exactly what it discovered, and it holds the sources of a restarted
//! pipeline in a pending-removal set for a grace period instead of
//! retracting them immediately.

use crate::config::PipelineConfig;
use crate::pipeline::{Pipeline, PipelineFactory};
use dashmap::DashMap;
use parking_lot::Mutex;
use scout_core::error::Result;
use scout_core::types::TargetGroup;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of each pipeline's output channel.
const PIPELINE_CHANNEL_CAPACITY: usize = 16;

/// Timing knobs for the manager. Production uses the defaults; tests shrink
/// them.
#[derive(Debug, Clone, Copy)]
pub struct ManagerTiming {
    /// How long a restarted pipeline's sources wait for rediscovery
    pub grace_period: Duration,
    /// Cadence of the pending-removal sweep
    pub sweep_interval: Duration,
    /// Bounded wait for a cancelled pipeline to finish
    pub stop_timeout: Duration,
}

impl Default for ManagerTiming {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

struct RunningPipeline {
    cancel: CancellationToken,
    pipeline_task: JoinHandle<()>,
    forwarder_task: JoinHandle<()>,
}

struct Inner {
    factory: Arc<dyn PipelineFactory>,
    out: mpsc::Sender<Vec<TargetGroup>>,
    cancel: CancellationToken,
    timing: ManagerTiming,
    pipelines: DashMap<String, RunningPipeline>,
    /// Pipeline key -> sources it currently contributes.
    sources: Mutex<HashMap<String, BTreeSet<String>>>,
    /// Source -> when its removal was requested. Lock order: `sources`
    /// before `pending_removal`.
    pending_removal: Mutex<HashMap<String, Instant>>,
}

/// Owns and supervises running discovery pipelines.
#[derive(Clone)]
pub struct PipelineManager {
    inner: Arc<Inner>,
}

impl PipelineManager {
    /// Creates a manager and spawns its grace-period sweep worker. The
    /// worker stops when `cancel` is cancelled.
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        out: mpsc::Sender<Vec<TargetGroup>>,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_timing(factory, out, cancel, ManagerTiming::default())
    }

    /// Creates a manager with explicit timing.
    pub fn with_timing(
        factory: Arc<dyn PipelineFactory>,
        out: mpsc::Sender<Vec<TargetGroup>>,
        cancel: CancellationToken,
        timing: ManagerTiming,
    ) -> Self {
        let inner = Arc::new(Inner {
            factory,
            out,
            cancel,
            timing,
            pipelines: DashMap::new(),
            sources: Mutex::new(HashMap::new()),
            pending_removal: Mutex::new(HashMap::new()),
        });

        tokio::spawn(Inner::sweep_loop(Arc::clone(&inner)));

        Self { inner }
    }

    /// Starts a pipeline under `key`, stopping any pipeline already running
    /// there (with full source retraction). On construction failure nothing
    /// is registered.
    pub async fn start(&self, key: &str, config: PipelineConfig) -> Result<()> {
        if self.inner.pipelines.contains_key(key) {
            self.stop(key).await;
        }
        let pipeline = self.inner.factory.create(&config)?;
        self.launch(key, pipeline);
        Ok(())
    }

    /// Stops the pipeline under `key` and retracts every source it
    /// contributed. No-op if absent.
    pub async fn stop(&self, key: &str) {
        let Some((_, rp)) = self.inner.pipelines.remove(key) else {
            return;
        };
        Inner::shutdown(&self.inner, key, rp).await;

        let removals: Vec<TargetGroup> = {
            let mut sources = self.inner.sources.lock();
            sources
                .remove(key)
                .unwrap_or_default()
                .into_iter()
                .map(TargetGroup::removal)
                .collect()
        };
        if !removals.is_empty() {
            info!(
                pipeline = %key,
                sources = removals.len(),
                "retracting sources of stopped pipeline"
            );
            self.inner.send_groups(removals).await;
        }
        info!(pipeline = %key, "pipeline stopped");
    }

    /// Replaces the pipeline under `old_key` with a new instance under
    /// `new_key` (the keys differ when an update moved the config between
    /// sources). The new instance is constructed first; on failure the old
    /// pipeline is untouched. The old pipeline's sources move into the
    /// pending-removal set instead of being retracted; the new pipeline
    /// rescues whichever it rediscovers within the grace period.
    pub async fn restart(&self, old_key: &str, new_key: &str, config: PipelineConfig) -> Result<()> {
        let pipeline = self.inner.factory.create(&config)?;

        if let Some((_, rp)) = self.inner.pipelines.remove(old_key) {
            {
                let mut sources = self.inner.sources.lock();
                let moved = sources.remove(old_key).unwrap_or_default();
                let now = Instant::now();
                let mut pending = self.inner.pending_removal.lock();
                for source in moved {
                    pending.insert(source, now);
                }
            }
            Inner::shutdown(&self.inner, old_key, rp).await;
            info!(pipeline = %old_key, "pipeline stopped for restart");
        }

        self.launch(new_key, pipeline);
        Ok(())
    }

    /// Stops every pipeline: collect and cancel first, then wait for each
    /// outside any lock. No source retraction; this is the shutdown path.
    pub async fn stop_all(&self) {
        let entries: Vec<(String, RunningPipeline)> = {
            let keys: Vec<String> = self
                .inner
                .pipelines
                .iter()
                .map(|e| e.key().clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| self.inner.pipelines.remove(&k))
                .collect()
        };
        for (_, rp) in &entries {
            rp.cancel.cancel();
        }
        for (key, rp) in entries {
            Inner::shutdown(&self.inner, &key, rp).await;
        }
        self.inner.sources.lock().clear();
        self.inner.pending_removal.lock().clear();
        info!("all pipelines stopped");
    }

    /// Whether a pipeline is running under `key`.
    pub fn is_running(&self, key: &str) -> bool {
        self.inner.pipelines.contains_key(key)
    }

    /// Keys of all running pipelines.
    pub fn keys(&self) -> Vec<String> {
        self.inner.pipelines.iter().map(|e| e.key().clone()).collect()
    }

    fn launch(&self, key: &str, pipeline: Box<dyn Pipeline>) {
        let token = self.inner.cancel.child_token();
        let (tx, rx) = mpsc::channel(PIPELINE_CHANNEL_CAPACITY);

        let pipeline_task = tokio::spawn(pipeline.run(token.clone(), tx));
        let forwarder_task = tokio::spawn(Inner::forward(
            Arc::clone(&self.inner),
            key.to_string(),
            rx,
        ));

        self.inner.pipelines.insert(
            key.to_string(),
            RunningPipeline {
                cancel: token,
                pipeline_task,
                forwarder_task,
            },
        );
        info!(pipeline = %key, "pipeline started");
    }
}

impl Inner {
    /// Forwards a pipeline's batches downstream in emission order, keeping
    /// the per-pipeline source set current and rescuing rediscovered
    /// sources from the pending-removal set.
    async fn forward(inner: Arc<Inner>, key: String, mut rx: mpsc::Receiver<Vec<TargetGroup>>) {
        while let Some(groups) = rx.recv().await {
            {
                let mut sources = inner.sources.lock();
                let mut pending = inner.pending_removal.lock();
                let set = sources.entry(key.clone()).or_default();
                for group in &groups {
                    if group.is_removal() {
                        set.remove(&group.source);
                    } else {
                        set.insert(group.source.clone());
                        pending.remove(&group.source);
                    }
                }
            }
            if !inner.send_groups(groups).await {
                return;
            }
        }
        debug!(pipeline = %key, "forwarder finished");
    }

    /// Sends a batch downstream unless shutting down. Returns false when
    /// the downstream consumer is gone.
    async fn send_groups(&self, groups: Vec<TargetGroup>) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.out.send(groups) => {
                if sent.is_err() {
                    debug!("downstream consumer closed");
                    return false;
                }
                true
            }
        }
    }

    /// Cancels a pipeline and waits, bounded, for it to finish. A pipeline
    /// missing the deadline is detached, not aborted.
    async fn shutdown(inner: &Arc<Inner>, key: &str, rp: RunningPipeline) {
        rp.cancel.cancel();
        match tokio::time::timeout(inner.timing.stop_timeout, rp.pipeline_task).await {
            Ok(Ok(())) => {
                // Pipeline done; its sender is dropped, so the forwarder
                // drains whatever is queued and exits.
                if tokio::time::timeout(inner.timing.stop_timeout, rp.forwarder_task)
                    .await
                    .is_err()
                {
                    warn!(pipeline = %key, "forwarder did not finish in time");
                }
            }
            Ok(Err(e)) => {
                warn!(pipeline = %key, error = %e, "pipeline task failed");
            }
            Err(_) => {
                warn!(
                    pipeline = %key,
                    timeout = ?inner.timing.stop_timeout,
                    "pipeline did not stop in time; detaching"
                );
            }
        }
    }

    async fn sweep_loop(inner: Arc<Inner>) {
        let mut interval = tokio::time::interval(inner.timing.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = interval.tick() => {}
            }
            Inner::sweep(&inner).await;
        }
    }

    /// Retracts pending-removal sources whose grace period elapsed without
    /// rediscovery.
    async fn sweep(inner: &Arc<Inner>) {
        let expired: Vec<TargetGroup> = {
            let mut pending = inner.pending_removal.lock();
            let grace = inner.timing.grace_period;
            let mut expired: Vec<String> = pending
                .iter()
                .filter(|(_, requested)| requested.elapsed() >= grace)
                .map(|(source, _)| source.clone())
                .collect();
            expired.sort();
            for source in &expired {
                pending.remove(source);
            }
            expired.into_iter().map(TargetGroup::removal).collect()
        };
        if !expired.is_empty() {
            info!(
                sources = expired.len(),
                "retracting sources not rediscovered within grace period"
            );
            inner.send_groups(expired).await;
        }
    }
}
