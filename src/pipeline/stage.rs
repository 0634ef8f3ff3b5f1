//! Generic pipeline stage: one task type, one execution strategy, one next stage.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::types::{Batch, Document, IdentifierSet, IndexType, Loaded};

use super::context::PipelineContext;
use super::pool::WorkerPool;

/// Number of records an item stands for in its build's completion count.
pub trait Weighted {
    fn weight(&self) -> u64;
}

/// Anything that travels between stages knows which index build it belongs to.
pub trait PipelineItem: Weighted + Send + 'static {
    fn index_type(&self) -> IndexType;
}

impl Weighted for () {
    fn weight(&self) -> u64 {
        0
    }
}

impl Weighted for IdentifierSet {
    fn weight(&self) -> u64 {
        self.len() as u64
    }
}

impl PipelineItem for IdentifierSet {
    fn index_type(&self) -> IndexType {
        self.index_type
    }
}

impl Weighted for Batch {
    fn weight(&self) -> u64 {
        self.uids.len() as u64
    }
}

impl PipelineItem for Batch {
    fn index_type(&self) -> IndexType {
        self.index_type
    }
}

impl<E> Weighted for Loaded<E> {
    fn weight(&self) -> u64 {
        1
    }
}

impl<E: Send + 'static> PipelineItem for Loaded<E> {
    fn index_type(&self) -> IndexType {
        self.index_type
    }
}

impl Weighted for Document {
    fn weight(&self) -> u64 {
        1
    }
}

impl PipelineItem for Document {
    fn index_type(&self) -> IndexType {
        self.index_type
    }
}

/// Emits one output to the next stage.
pub type Emit<'a, O> = dyn FnMut(O) -> Result<(), PipelineError> + 'a;

/// Per-unit-of-work operation. A fresh task is built for every input, so tasks may keep
/// mutable scratch state without sharing it across workers.
pub trait Task: Send + 'static {
    type Input: PipelineItem;
    type Output: Weighted + Send + 'static;

    /// Terminal tasks emit nothing and run without a next stage.
    const TERMINAL: bool = false;

    fn run(
        &mut self,
        input: Self::Input,
        emit: &mut Emit<'_, Self::Output>,
    ) -> Result<(), PipelineError>;
}

/// Receiving end of a stage, as seen by the stage before it.
pub trait Sink<I>: Send + Sync {
    fn send(&self, item: I) -> Result<(), PipelineError>;
}

/// Builds a fresh task per unit of work.
pub type TaskFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

#[derive(Clone)]
pub enum ExecutionStrategy {
    /// Run on the sender's thread.
    Inline,
    /// Hand off to a worker pool; `send` returns once the job is queued.
    Pooled(Arc<WorkerPool>),
}

pub struct Stage<T: Task> {
    name: &'static str,
    strategy: ExecutionStrategy,
    factory: TaskFactory<T>,
    next: OnceLock<Arc<dyn Sink<T::Output>>>,
    ctx: PipelineContext,
}

impl<T: Task> Stage<T> {
    pub fn new(
        name: &'static str,
        strategy: ExecutionStrategy,
        factory: TaskFactory<T>,
        ctx: PipelineContext,
    ) -> Self {
        Self {
            name,
            strategy,
            factory,
            next: OnceLock::new(),
            ctx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wire the next stage. A stage is wired once.
    pub fn set_next_stage(&self, next: Arc<dyn Sink<T::Output>>) -> Result<(), PipelineError> {
        self.next.set(next).map_err(|_| {
            PipelineError::configuration(format!("stage '{}' already has a next stage", self.name))
        })
    }

    fn next_stage(&self) -> Result<Option<Arc<dyn Sink<T::Output>>>, PipelineError> {
        match self.next.get() {
            Some(next) => Ok(Some(Arc::clone(next))),
            None if T::TERMINAL => Ok(None),
            None => Err(PipelineError::configuration(format!(
                "stage '{}' has no next stage",
                self.name
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Build a task, run it on `item`, and record item count and duration for the stage.
/// `"<stage>.millis"` excludes time spent in later stages reached through `emit`.
///
/// A panicking task fails its item: records it had not handed on yet are counted as
/// completed so the build can still finish.
fn execute<T: Task>(
    name: &'static str,
    factory: &TaskFactory<T>,
    next: Option<&Arc<dyn Sink<T::Output>>>,
    ctx: &PipelineContext,
    item: T::Input,
) -> Result<(), PipelineError> {
    let index_type = item.index_type();
    let weight = item.weight();
    let start = Instant::now();
    let mut handed_on = 0u64;
    let mut downstream = Duration::ZERO;
    let mut emit = |out: T::Output| {
        handed_on += out.weight();
        let Some(next) = next else {
            return Ok(());
        };
        let sent_at = Instant::now();
        let sent = next.send(out);
        downstream += sent_at.elapsed();
        sent
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut task = factory();
        task.run(item, &mut emit)
    }));
    let stats = &ctx.statistics;
    let result = outcome.unwrap_or_else(|payload| {
        let lost = weight.saturating_sub(handed_on);
        stats.mark_completed(index_type, lost);
        Err(PipelineError::Panicked {
            index_type,
            stage: name,
            message: panic_message(&*payload),
        })
    });
    stats.add_count(index_type, &format!("{name}.items"), 1);
    stats.add_value(
        index_type,
        &format!("{name}.millis"),
        start.elapsed().saturating_sub(downstream).as_millis() as u64,
    );
    result
}

impl<T: Task> Sink<T::Input> for Stage<T> {
    /// Inline: run now; configuration errors are returned, item failures recorded.
    /// Pooled: queue the work; every error is recorded by the worker.
    fn send(&self, item: T::Input) -> Result<(), PipelineError> {
        let next = self.next_stage()?;
        match &self.strategy {
            ExecutionStrategy::Inline => {
                match execute(self.name, &self.factory, next.as_ref(), &self.ctx, item) {
                    Err(e) if e.is_configuration() => Err(e),
                    Err(e) => {
                        self.ctx.failures.record(self.name, e);
                        Ok(())
                    }
                    Ok(()) => Ok(()),
                }
            }
            ExecutionStrategy::Pooled(pool) => {
                let name = self.name;
                let factory = Arc::clone(&self.factory);
                let ctx = self.ctx.clone();
                pool.submit(Box::new(move || {
                    if let Err(e) = execute(name, &factory, next.as_ref(), &ctx, item) {
                        ctx.failures.record(name, e);
                    }
                }))
            }
        }
    }
}
