//! Turns one loaded entity into one search document.

use anyhow::Result;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::types::{Document, IndexType, IndexableEntity, Loaded};

use super::context::PipelineContext;
use super::stage::{Emit, Task};

/// Pure entity → document mapping. No I/O; a failure is a mapping bug and is not retried.
pub trait DocumentCreator<E>: Send + Sync {
    fn create_document(&self, index_type: IndexType, entity: E) -> Result<Document>;
}

pub struct DocumentTask<E> {
    creator: Arc<dyn DocumentCreator<E>>,
    ctx: PipelineContext,
}

impl<E> DocumentTask<E> {
    pub fn new(creator: Arc<dyn DocumentCreator<E>>, ctx: PipelineContext) -> Self {
        Self { creator, ctx }
    }
}

impl<E: IndexableEntity> Task for DocumentTask<E> {
    type Input = Loaded<E>;
    type Output = Document;

    fn run(
        &mut self,
        loaded: Loaded<E>,
        emit: &mut Emit<'_, Document>,
    ) -> Result<(), PipelineError> {
        let Loaded { index_type, entity } = loaded;
        let uid = entity.uid();
        match self.creator.create_document(index_type, entity) {
            Ok(document) => emit(document),
            Err(e) => {
                self.ctx.statistics.mark_completed(index_type, 1);
                Err(PipelineError::Transform {
                    index_type,
                    uid,
                    message: format!("{e:#}"),
                })
            }
        }
    }
}
