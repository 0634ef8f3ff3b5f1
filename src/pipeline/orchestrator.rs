//! Indexing pipeline: wires grouper → loader → document creator → publisher, tracks
//! lifecycle, and turns finished builds into commits and persisted status.

use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::error::PipelineError;
use crate::stats::{IndexingStatistics, PipelineCounts};
use crate::status::BuildStatusUpdater;
use crate::types::{IdentifierSet, IndexBuildStatus, IndexState, IndexType, IndexableEntity, Uid};
use crate::utils::config::{ExecutionMode, PipelineConfig};
use crate::utils::now_ms;
use crate::utils::tools::lock;

use super::context::PipelineContext;
use super::document::{DocumentCreator, DocumentTask};
use super::failures::FailureLog;
use super::grouper::{GroupingTask, check_batch_size};
use super::loader::{EntityLookup, LoadingTask};
use super::pool::WorkerPool;
use super::publisher::{DocumentPublisher, PublishingTask};
use super::stage::{ExecutionStrategy, Sink, Stage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    /// Terminal: the pipeline refuses new builds.
    ShutDown,
}

/// Called with the index type of every build the monitor sees finish.
pub type CompletionListener = Box<dyn Fn(IndexType) + Send + Sync>;

pub struct IndexingPipeline {
    config: PipelineConfig,
    state: Mutex<PipelineState>,
    /// Builds started and not yet seen complete by the monitor.
    active: Mutex<BTreeSet<IndexType>>,
    /// Held for a whole monitor pass so a build is finished and committed by one caller.
    monitor: Mutex<()>,
    entry: Arc<Stage<GroupingTask>>,
    /// Worker pools in stage order; shut down upstream first so downstream drains last.
    pools: Vec<Arc<WorkerPool>>,
    publisher: Arc<dyn DocumentPublisher>,
    updater: Option<Arc<BuildStatusUpdater>>,
    ctx: PipelineContext,
    listeners: Vec<CompletionListener>,
}

pub struct PipelineBuilder<E> {
    lookup: Arc<dyn EntityLookup<E>>,
    creator: Arc<dyn DocumentCreator<E>>,
    publisher: Arc<dyn DocumentPublisher>,
    config: PipelineConfig,
    statistics: Option<Arc<IndexingStatistics>>,
    updater: Option<Arc<BuildStatusUpdater>>,
    listeners: Vec<CompletionListener>,
}

fn strategy_for(
    mode: ExecutionMode,
    name: &str,
    config: &PipelineConfig,
    pools: &mut Vec<Arc<WorkerPool>>,
) -> Result<ExecutionStrategy, PipelineError> {
    match mode {
        ExecutionMode::Inline => Ok(ExecutionStrategy::Inline),
        ExecutionMode::Pooled => {
            let pool = WorkerPool::new(
                name,
                config.effective_worker_threads(),
                config.pool_queue_capacity,
            )
            .map_err(|e| PipelineError::configuration(format!("spawn {name} workers: {e}")))?;
            let pool = Arc::new(pool);
            pools.push(Arc::clone(&pool));
            Ok(ExecutionStrategy::Pooled(pool))
        }
    }
}

impl<E: IndexableEntity> PipelineBuilder<E> {
    pub fn new(
        lookup: Arc<dyn EntityLookup<E>>,
        creator: Arc<dyn DocumentCreator<E>>,
        publisher: Arc<dyn DocumentPublisher>,
    ) -> Self {
        Self {
            lookup,
            creator,
            publisher,
            config: PipelineConfig::default(),
            statistics: None,
            updater: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a statistics registry (e.g. with a monitor or another pipeline).
    pub fn statistics(mut self, statistics: Arc<IndexingStatistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Persist build status through `updater`. `destroy()` flushes and stops it.
    pub fn status_updater(mut self, updater: Arc<BuildStatusUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn on_build_complete(mut self, listener: impl Fn(IndexType) + Send + Sync + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn build(self) -> Result<IndexingPipeline, PipelineError> {
        let config = self.config;
        // Validate before any worker is spawned.
        check_batch_size(config.batch_size)?;

        let statistics = self.statistics.unwrap_or_default();
        let ctx = PipelineContext::new(statistics);
        let mut pools = Vec::new();

        let batch_size = config.batch_size;
        let grouping = Arc::new(Stage::<GroupingTask>::new(
            "grouper",
            strategy_for(config.grouping, "grouper", &config, &mut pools)?,
            Arc::new(move || GroupingTask::new(batch_size)),
            ctx.clone(),
        ));

        let lookup = self.lookup;
        let loader_ctx = ctx.clone();
        let loading = Arc::new(Stage::<LoadingTask<E>>::new(
            "loader",
            strategy_for(config.loading, "loader", &config, &mut pools)?,
            Arc::new(move || LoadingTask::new(Arc::clone(&lookup), loader_ctx.clone())),
            ctx.clone(),
        ));

        let creator = self.creator;
        let document_ctx = ctx.clone();
        let documents = Arc::new(Stage::<DocumentTask<E>>::new(
            "documents",
            strategy_for(config.documents, "documents", &config, &mut pools)?,
            Arc::new(move || DocumentTask::new(Arc::clone(&creator), document_ctx.clone())),
            ctx.clone(),
        ));

        let publisher = Arc::clone(&self.publisher);
        let publish_ctx = ctx.clone();
        let publishing = Arc::new(Stage::<PublishingTask>::new(
            "publisher",
            strategy_for(config.publishing, "publisher", &config, &mut pools)?,
            Arc::new(move || PublishingTask::new(Arc::clone(&publisher), publish_ctx.clone())),
            ctx.clone(),
        ));

        documents.set_next_stage(publishing)?;
        loading.set_next_stage(documents)?;
        grouping.set_next_stage(loading)?;

        debug!(
            "pipeline built: batch size {}, {} pooled stages",
            config.batch_size,
            pools.len()
        );
        Ok(IndexingPipeline {
            config,
            state: Mutex::new(PipelineState::Idle),
            active: Mutex::new(BTreeSet::new()),
            monitor: Mutex::new(()),
            entry: grouping,
            pools,
            publisher: self.publisher,
            updater: self.updater,
            ctx,
            listeners: self.listeners,
        })
    }
}

impl IndexingPipeline {
    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    /// True while at least one started build still has items in flight.
    pub fn is_busy(&self) -> bool {
        if self.state() != PipelineState::Running {
            return false;
        }
        let stats = &self.ctx.statistics;
        lock(&self.active)
            .iter()
            .any(|&it| !stats.pipeline_status(it).is_completed())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn statistics(&self) -> &Arc<IndexingStatistics> {
        &self.ctx.statistics
    }

    pub fn failures(&self) -> &Arc<FailureLog> {
        &self.ctx.failures
    }

    pub fn publisher(&self) -> &Arc<dyn DocumentPublisher> {
        &self.publisher
    }

    pub fn build_status(&self, index_type: IndexType) -> IndexBuildStatus {
        self.ctx.statistics.build_status(index_type).snapshot()
    }

    pub fn pipeline_counts(&self, index_type: IndexType) -> PipelineCounts {
        self.ctx.statistics.pipeline_status(index_type).snapshot()
    }

    fn enqueue_status(&self, index_type: IndexType) {
        if let Some(updater) = &self.updater {
            updater.enqueue(self.build_status(index_type));
        }
    }

    /// Start an update build of `uids` for `index_type`.
    pub fn start(&self, uids: &[Uid], index_type: IndexType) -> Result<(), PipelineError> {
        self.start_build(
            IdentifierSet::new(index_type, uids.iter().copied()),
            IndexState::Updating,
        )
    }

    /// Start a build of `set`. Per-build counts become `(n, 0)`, build status is reset to
    /// `n` total records, cumulative counters keep growing. Inline stages run the whole build
    /// before this returns; pooled stages return once the set is queued.
    pub fn start_build(&self, set: IdentifierSet, state: IndexState) -> Result<(), PipelineError> {
        let index_type = set.index_type;
        let n = set.len() as u64;
        {
            let mut current = lock(&self.state);
            if *current == PipelineState::ShutDown {
                return Err(PipelineError::configuration(format!(
                    "cannot start {index_type} build: pipeline is shut down"
                )));
            }
            if !lock(&self.active).insert(index_type) {
                warn!("{index_type}: build restarted before the previous one was reported complete");
            }
            *current = PipelineState::Running;
            let stats = &self.ctx.statistics;
            stats.pipeline_status(index_type).start_build(n);
            stats.build_status(index_type).begin(n, state, now_ms());
        }
        info!("{index_type}: starting {} build of {n} records", state.as_str());
        self.enqueue_status(index_type);

        if let Err(e) = self.entry.send(set) {
            lock(&self.active).remove(&index_type);
            self.abandon(index_type);
            return Err(e);
        }
        Ok(())
    }

    /// Count every record not yet seen as completed so waiters on the build wake up.
    fn abandon(&self, index_type: IndexType) {
        let counts = self.pipeline_counts(index_type);
        let outstanding = counts.incoming.saturating_sub(counts.completed);
        if outstanding > 0 {
            warn!("{index_type}: build abandoned with {outstanding} records outstanding");
            self.ctx.statistics.mark_completed(index_type, outstanding);
        }
    }

    /// Finish every active build whose items have all completed: commit, stamp the build
    /// status, persist, notify listeners. Unfinished builds get a progress snapshot persisted.
    /// Returns the index types committed by this call. A build whose commit fails leaves the
    /// active set without being stamped complete; the failure goes to the failure log.
    ///
    /// Passes are serialized: a caller returns only after any concurrent pass is done.
    /// Completion listeners must not call back into the monitor.
    pub fn periodic_monitor(&self) -> Vec<IndexType> {
        let _pass = lock(&self.monitor);
        let active: Vec<IndexType> = lock(&self.active).iter().copied().collect();
        let stats = &self.ctx.statistics;
        let mut finished = Vec::new();
        for index_type in active {
            let counts = stats.pipeline_status(index_type).snapshot();
            if !counts.is_completed() {
                debug!(
                    "{index_type}: {}/{} records completed",
                    counts.completed, counts.incoming
                );
                self.enqueue_status(index_type);
                continue;
            }
            if !lock(&self.active).remove(&index_type) {
                continue;
            }
            if self.finish_build(index_type, counts) {
                finished.push(index_type);
            }
        }

        let mut state = lock(&self.state);
        if *state == PipelineState::Running && lock(&self.active).is_empty() {
            *state = PipelineState::Idle;
        }
        finished
    }

    fn finish_build(&self, index_type: IndexType, counts: PipelineCounts) -> bool {
        if let Err(e) = self.publisher.commit(index_type) {
            self.ctx.failures.record(
                "publisher",
                PipelineError::Commit {
                    index_type,
                    message: format!("{e:#}"),
                },
            );
            warn!("{index_type}: build not committed; status left at its last progress");
            self.enqueue_status(index_type);
            return false;
        }
        self.ctx.statistics.build_status(index_type).finish(now_ms());
        info!(
            "{index_type}: build complete, {} records processed ({} failed)",
            counts.completed,
            self.ctx.failures.count_for(index_type)
        );
        self.enqueue_status(index_type);
        for listener in &self.listeners {
            listener(index_type);
        }
        true
    }

    /// Shut the pipeline down for good: drain the worker pools, finish builds that completed,
    /// flush the status updater. Later `start` calls fail. Idempotent.
    pub fn destroy(&self) {
        {
            let mut state = lock(&self.state);
            if *state == PipelineState::ShutDown {
                return;
            }
            *state = PipelineState::ShutDown;
        }
        for pool in &self.pools {
            pool.shutdown();
        }
        self.periodic_monitor();
        for index_type in lock(&self.active).iter() {
            let counts = self.pipeline_counts(*index_type);
            warn!(
                "{index_type}: pipeline destroyed with build unfinished ({}/{} records)",
                counts.completed, counts.incoming
            );
        }
        if let Some(updater) = &self.updater {
            let handled = updater.shutdown();
            debug!("status updater flushed {handled} snapshots");
        }
        info!("pipeline shut down");
    }
}

impl Drop for IndexingPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
