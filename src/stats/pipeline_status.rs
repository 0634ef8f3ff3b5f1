//! Per index type incoming/completed counters with a completion wait.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::types::IndexType;
use crate::utils::tools::lock;

/// Snapshot of a [`PipelineStatus`].
///
/// `incoming`/`completed` describe the current build. `total_incoming`/`total_completed`
/// accumulate across builds and are only zeroed by [`PipelineStatus::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCounts {
    pub incoming: u64,
    pub completed: u64,
    pub total_incoming: u64,
    pub total_completed: u64,
}

impl PipelineCounts {
    pub fn is_completed(&self) -> bool {
        self.completed >= self.incoming
    }
}

/// Build progress counters for one index type. All four counters sit behind one lock so a
/// reset or a new build is never observed half-applied.
#[derive(Debug)]
pub struct PipelineStatus {
    index_type: IndexType,
    counts: Mutex<PipelineCounts>,
    completed_cv: Condvar,
}

impl PipelineStatus {
    pub fn new(index_type: IndexType) -> Self {
        Self {
            index_type,
            counts: Mutex::new(PipelineCounts::default()),
            completed_cv: Condvar::new(),
        }
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Begin a build of `incoming` items: per-build counts become `(incoming, 0)`,
    /// cumulative incoming grows by `incoming`.
    pub fn start_build(&self, incoming: u64) {
        let mut c = lock(&self.counts);
        c.incoming = incoming;
        c.completed = 0;
        c.total_incoming += incoming;
        if c.is_completed() {
            self.completed_cv.notify_all();
        }
    }

    /// Record `n` items that left the pipeline (published, lost during load, or failed).
    pub fn add_completed(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut c = lock(&self.counts);
        c.completed += n;
        c.total_completed += n;
        if c.is_completed() {
            self.completed_cv.notify_all();
        }
    }

    pub fn snapshot(&self) -> PipelineCounts {
        *lock(&self.counts)
    }

    pub fn incoming_count(&self) -> u64 {
        lock(&self.counts).incoming
    }

    pub fn completed_count(&self) -> u64 {
        lock(&self.counts).completed
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.counts).is_completed()
    }

    /// Zero every counter, per-build and cumulative, in one step.
    pub fn reset(&self) {
        *lock(&self.counts) = PipelineCounts::default();
        self.completed_cv.notify_all();
    }

    /// Block until `completed >= incoming`.
    pub fn wait_until_completed(&self) {
        let mut c = lock(&self.counts);
        while !c.is_completed() {
            c = self
                .completed_cv
                .wait(c)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Like [`Self::wait_until_completed`] but gives up after `timeout`. Returns true if completed.
    pub fn wait_until_completed_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut c = lock(&self.counts);
        while !c.is_completed() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .completed_cv
                .wait_timeout(c, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            c = guard;
        }
        true
    }
}
