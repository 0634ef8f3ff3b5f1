//! Resolves batches of ids into entities, isolating per-item failures.
//!
//! The whole batch is first resolved with one bulk call. If that call fails, each id is
//! resolved on its own so a single bad id costs only itself. Ids that do not resolve are
//! logged, counted as completed, and dropped; the build carries on.

use anyhow::Result;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::types::{Batch, IndexType, IndexableEntity, Loaded, Uid};

use super::context::PipelineContext;
use super::stage::{Emit, Task};

/// Entity lookup service boundary.
pub trait EntityLookup<E>: Send + Sync {
    /// Resolve many ids in one call. Ids that do not exist are simply absent from the result.
    fn find_by_ids(&self, index_type: IndexType, uids: &[Uid]) -> Result<Vec<E>>;

    /// Resolve one id. `Ok(None)` when it does not exist.
    fn find_by_id(&self, index_type: IndexType, uid: Uid) -> Result<Option<E>>;
}

pub struct LoadingTask<E> {
    lookup: Arc<dyn EntityLookup<E>>,
    ctx: PipelineContext,
}

impl<E: IndexableEntity> LoadingTask<E> {
    pub fn new(lookup: Arc<dyn EntityLookup<E>>, ctx: PipelineContext) -> Self {
        Self { lookup, ctx }
    }

    /// Forward `entity` if it belongs to the batch and was not forwarded yet.
    fn forward(
        index_type: IndexType,
        entity: E,
        pending: &mut HashSet<Uid>,
        emit: &mut Emit<'_, Loaded<E>>,
    ) -> Result<(), PipelineError> {
        let uid = entity.uid();
        if !pending.remove(&uid) {
            debug!("{index_type}: lookup returned uid {uid} not pending in batch; ignored");
            return Ok(());
        }
        emit(Loaded { index_type, entity })
    }

    fn load_individually(
        &self,
        batch: &Batch,
        pending: &mut HashSet<Uid>,
        emit: &mut Emit<'_, Loaded<E>>,
    ) -> Result<(), PipelineError> {
        let index_type = batch.index_type;
        for &uid in &batch.uids {
            match self.lookup.find_by_id(index_type, uid) {
                Ok(Some(entity)) => Self::forward(index_type, entity, pending, emit)?,
                Ok(None) => debug!("{index_type}: uid {uid} not found"),
                Err(e) => {
                    let err = PipelineError::Lookup {
                        index_type,
                        uid: Some(uid),
                        message: format!("{e:#}"),
                    };
                    warn!("{err}; skipping");
                }
            }
        }
        Ok(())
    }
}

impl<E: IndexableEntity> Task for LoadingTask<E> {
    type Input = Batch;
    type Output = Loaded<E>;

    fn run(
        &mut self,
        batch: Batch,
        emit: &mut Emit<'_, Loaded<E>>,
    ) -> Result<(), PipelineError> {
        let index_type = batch.index_type;
        let stats = &self.ctx.statistics;
        let mut pending: HashSet<Uid> = batch.uids.iter().copied().collect();

        match self.lookup.find_by_ids(index_type, &batch.uids) {
            Ok(entities) => {
                for entity in entities {
                    Self::forward(index_type, entity, &mut pending, emit)?;
                }
            }
            Err(e) => {
                warn!(
                    "{index_type}: bulk load of {} ids failed ({e:#}); loading one by one",
                    batch.len()
                );
                stats.add_count(index_type, "loader.fallbacks", 1);
                self.load_individually(&batch, &mut pending, emit)?;
            }
        }

        let lost = pending.len() as u64;
        if lost > 0 {
            debug!("{index_type}: {lost} ids in batch did not resolve: {pending:?}");
            stats.add_count(index_type, "loader.unresolved", lost);
            stats.mark_completed(index_type, lost);
        }
        Ok(())
    }
}
