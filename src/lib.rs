//! Indexpipe: staged search index build pipeline with resilient build status tracking

pub mod engine;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod stats;
pub mod status;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::PipelineError;
pub use index::IndexBuildRunner;
pub use pipeline::{
    DocumentCreator, DocumentPublisher, EntityLookup, IndexingPipeline, PipelineBuilder,
    PipelineState,
};
pub use utils::config::{ExecutionMode, PipelineConfig};

use log::debug;
use std::sync::Arc;

/// Result alias used by public indexpipe API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: build a pipeline from the three collaborators, fully rebuild
/// `index_type` from `uids`, then shut the pipeline down.
///
/// Returns whether any document was published. For repeated builds, keep an
/// [`IndexingPipeline`] and an [`IndexBuildRunner`] around instead.
///
/// ```ignore
/// let published = indexpipe::rebuild_index(
///     lookup,
///     creator,
///     publisher,
///     PipelineConfig::default(),
///     IndexType::Product,
///     &[1, 2, 3],
/// )?;
/// ```
pub fn rebuild_index<E: IndexableEntity>(
    lookup: Arc<dyn EntityLookup<E>>,
    creator: Arc<dyn DocumentCreator<E>>,
    publisher: Arc<dyn DocumentPublisher>,
    config: PipelineConfig,
    index_type: IndexType,
    uids: &[Uid],
) -> Result<bool> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        config
    );
    let pipeline = Arc::new(
        PipelineBuilder::new(lookup, creator, publisher)
            .config(config)
            .build()?,
    );
    let outcome = IndexBuildRunner::new(Arc::clone(&pipeline)).rebuild(index_type, uids);
    pipeline.destroy();
    outcome
}
