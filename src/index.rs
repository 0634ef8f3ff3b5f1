//! Full rebuilds and incremental updates of one index, run to completion.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;
use crate::pipeline::{IndexingPipeline, PipelineState, check_build_failures};
use crate::types::{IdentifierSet, IndexState, IndexType, Uid};

/// Drives one build at a time through a shared pipeline and waits for it to finish.
pub struct IndexBuildRunner {
    pipeline: Arc<IndexingPipeline>,
    wait_timeout: Option<Duration>,
}

impl IndexBuildRunner {
    pub fn new(pipeline: Arc<IndexingPipeline>) -> Self {
        Self {
            pipeline,
            wait_timeout: None,
        }
    }

    /// Give up waiting for a build after `timeout`. Without one, waits indefinitely.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn pipeline(&self) -> &Arc<IndexingPipeline> {
        &self.pipeline
    }

    fn published_count(&self, index_type: IndexType) -> u64 {
        self.pipeline
            .statistics()
            .performance(index_type)
            .get("publisher.published")
            .count
    }

    fn wait(&self, index_type: IndexType) -> Result<()> {
        let status = self.pipeline.statistics().pipeline_status(index_type);
        match self.wait_timeout {
            None => status.wait_until_completed(),
            Some(timeout) => {
                if !status.wait_until_completed_timeout(timeout) {
                    let counts = status.snapshot();
                    bail!(
                        "{index_type} build did not finish within {timeout:?} ({}/{} records)",
                        counts.completed,
                        counts.incoming
                    );
                }
            }
        }
        Ok(())
    }

    /// Refuse before touching the index when the pipeline can no longer run the build.
    fn ensure_open(&self, index_type: IndexType) -> Result<(), PipelineError> {
        if self.pipeline.state() == PipelineState::ShutDown {
            return Err(PipelineError::configuration(format!(
                "cannot build {index_type}: pipeline is shut down"
            )));
        }
        Ok(())
    }

    /// Push `set`, wait for every item, then commit and check recorded failures. A failed
    /// commit is an error whatever the strictness.
    fn run_build(&self, set: IdentifierSet, state: IndexState) -> Result<bool> {
        let index_type = set.index_type;
        let published_before = self.published_count(index_type);
        self.pipeline
            .start_build(set, state)
            .with_context(|| format!("start {index_type} build"))?;
        self.wait(index_type)?;
        self.pipeline.periodic_monitor();
        check_build_failures(self.pipeline.config().strict, self.pipeline.failures(), index_type)
            .with_context(|| format!("{index_type} build"))?;
        let published = self.published_count(index_type).saturating_sub(published_before);
        debug!("{index_type}: {published} documents published");
        Ok(published > 0)
    }

    /// Replace the whole index with documents for `uids`. An empty set commits an empty index.
    /// Returns whether any document was published.
    pub fn rebuild(&self, index_type: IndexType, uids: &[Uid]) -> Result<bool> {
        info!("{index_type}: full rebuild of {} records", uids.len());
        self.ensure_open(index_type)?;
        self.pipeline
            .publisher()
            .delete_all(index_type)
            .with_context(|| format!("clear {index_type} index"))?;
        self.run_build(
            IdentifierSet::new(index_type, uids.iter().copied()),
            IndexState::RebuildInProgress,
        )
    }

    /// Apply a delta: remove `deleted`, reindex `added_or_modified`. Nothing to do returns false
    /// without touching the index.
    pub fn update(
        &self,
        index_type: IndexType,
        added_or_modified: &[Uid],
        deleted: &[Uid],
    ) -> Result<bool> {
        if added_or_modified.is_empty() && deleted.is_empty() {
            debug!("{index_type}: nothing to update");
            return Ok(false);
        }
        info!(
            "{index_type}: update of {} records, {} deletions",
            added_or_modified.len(),
            deleted.len()
        );
        self.ensure_open(index_type)?;
        let publisher = self.pipeline.publisher();
        for &uid in deleted {
            if let Err(e) = publisher.delete(index_type, uid) {
                let err = PipelineError::Publish {
                    index_type,
                    uid,
                    message: format!("delete: {e:#}"),
                };
                self.pipeline.failures().record("publisher", err);
            }
        }
        let published = self.run_build(
            IdentifierSet::new(index_type, added_or_modified.iter().copied()),
            IndexState::Updating,
        )?;
        Ok(published || !deleted.is_empty())
    }
}
