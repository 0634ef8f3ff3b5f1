//! Pipeline components: stages, worker pools, the four build steps and the orchestrator.

pub mod context;
pub mod document;
pub mod failures;
pub mod grouper;
pub mod loader;
pub mod orchestrator;
pub mod pool;
pub mod publisher;
pub mod stage;

pub use context::PipelineContext;
pub use document::{DocumentCreator, DocumentTask};
pub use failures::{FailureLog, StageFailure, check_build_failures};
pub use grouper::{GroupingTask, group_into_batches};
pub use loader::{EntityLookup, LoadingTask};
pub use orchestrator::{CompletionListener, IndexingPipeline, PipelineBuilder, PipelineState};
pub use pool::WorkerPool;
pub use publisher::{DocumentPublisher, PublishingTask};
pub use stage::{
    Emit, ExecutionStrategy, PipelineItem, Sink, Stage, Task, TaskFactory, Weighted,
};
