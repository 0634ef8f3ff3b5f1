//! Hands documents to the search engine client. Terminal stage.

use anyhow::Result;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::types::{Document, IndexType, Uid};

use super::context::PipelineContext;
use super::stage::{Emit, Task};

/// Search engine client boundary. The pipeline never retries; retries belong here.
pub trait DocumentPublisher: Send + Sync {
    fn publish(&self, document: Document) -> Result<()>;

    fn delete(&self, index_type: IndexType, uid: Uid) -> Result<()>;

    /// Remove every document of `index_type` (start of a full rebuild).
    fn delete_all(&self, index_type: IndexType) -> Result<()>;

    fn commit(&self, index_type: IndexType) -> Result<()>;
}

pub struct PublishingTask {
    publisher: Arc<dyn DocumentPublisher>,
    ctx: PipelineContext,
}

impl PublishingTask {
    pub fn new(publisher: Arc<dyn DocumentPublisher>, ctx: PipelineContext) -> Self {
        Self { publisher, ctx }
    }
}

impl Task for PublishingTask {
    type Input = Document;
    type Output = ();

    const TERMINAL: bool = true;

    fn run(
        &mut self,
        document: Document,
        _emit: &mut Emit<'_, ()>,
    ) -> Result<(), PipelineError> {
        let index_type = document.index_type;
        let uid = document.uid;
        let stats = &self.ctx.statistics;
        let result = self.publisher.publish(document);
        if result.is_ok() {
            stats.add_count(index_type, "publisher.published", 1);
        }
        // Published or not, the item has left the pipeline.
        stats.mark_completed(index_type, 1);
        result.map_err(|e| PipelineError::Publish {
            index_type,
            uid,
            message: format!("{e:#}"),
        })
    }
}
