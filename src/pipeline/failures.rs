//! Item-level failures recorded by stages, checked when a build finishes.

use log::{error, warn};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PipelineError;
use crate::types::IndexType;
use crate::utils::tools::lock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Mutex<Vec<StageFailure>>,
    recorded: AtomicUsize,
}

impl FailureLog {
    pub fn record(&self, stage: &'static str, error: PipelineError) {
        error!("[{stage}] {error}");
        lock(&self.failures).push(StageFailure { stage, error });
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Failures recorded since creation, including ones already taken.
    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        lock(&self.failures).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.failures).is_empty()
    }

    pub fn count_for(&self, index_type: IndexType) -> usize {
        lock(&self.failures)
            .iter()
            .filter(|f| f.error.index_type() == Some(index_type))
            .count()
    }

    pub fn all(&self) -> Vec<StageFailure> {
        lock(&self.failures).clone()
    }

    /// Remove and return the failures recorded for `index_type`.
    pub fn take_for(&self, index_type: IndexType) -> Vec<StageFailure> {
        let mut failures = lock(&self.failures);
        let (taken, kept): (Vec<_>, Vec<_>) = failures
            .drain(..)
            .partition(|f| f.error.index_type() == Some(index_type));
        *failures = kept;
        taken
    }
}

/// Check a finished build. A failed commit is always returned. Otherwise, in strict mode
/// return its first failure, else log the count. Call after the build's items have all
/// completed and the monitor has run.
pub fn check_build_failures(
    strict: bool,
    failures: &FailureLog,
    index_type: IndexType,
) -> Result<(), PipelineError> {
    let taken = failures.take_for(index_type);
    if let Some(commit) = taken
        .iter()
        .find(|f| matches!(f.error, PipelineError::Commit { .. }))
    {
        return Err(commit.error.clone());
    }
    if strict && let Some(first) = taken.first() {
        return Err(first.error.clone());
    }
    if !taken.is_empty() {
        warn!(
            "{} {} records failed during the build and were not published",
            taken.len(),
            index_type
        );
    }
    Ok(())
}
