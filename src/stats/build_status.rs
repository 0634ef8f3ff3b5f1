//! Live [`IndexBuildStatus`] shared between stage workers, the monitor and the updater.

use std::sync::Mutex;

use crate::types::{IndexBuildStatus, IndexState, IndexType};
use crate::utils::tools::lock;

/// One lock per index type. Readers only ever see whole snapshots.
#[derive(Debug)]
pub struct SharedBuildStatus {
    inner: Mutex<IndexBuildStatus>,
}

impl SharedBuildStatus {
    pub fn new(index_type: IndexType) -> Self {
        Self::from_status(IndexBuildStatus::new(index_type))
    }

    /// Seed from a previously persisted status (keeps `last_build_date_ms`).
    pub fn from_status(status: IndexBuildStatus) -> Self {
        Self {
            inner: Mutex::new(status),
        }
    }

    pub fn index_type(&self) -> IndexType {
        lock(&self.inner).index_type
    }

    /// Start a new build: total and processed are replaced together.
    pub fn begin(&self, total: u64, state: IndexState, started_at_ms: i64) {
        let mut s = lock(&self.inner);
        s.total_records = total;
        s.processed_records = 0;
        s.started_at_ms = started_at_ms;
        s.state = state;
    }

    /// Count `n` more processed records, never past `total_records`.
    pub fn add_processed(&self, n: u64) {
        let mut s = lock(&self.inner);
        s.processed_records = (s.processed_records + n).min(s.total_records);
    }

    pub fn set_state(&self, state: IndexState) {
        lock(&self.inner).state = state;
    }

    /// Mark the build complete at `finished_at_ms`.
    pub fn finish(&self, finished_at_ms: i64) {
        let mut s = lock(&self.inner);
        s.processed_records = s.total_records;
        s.state = IndexState::Complete;
        s.last_build_date_ms = Some(finished_at_ms);
    }

    pub fn set_last_build_date(&self, at_ms: i64) {
        lock(&self.inner).last_build_date_ms = Some(at_ms);
    }

    pub fn snapshot(&self) -> IndexBuildStatus {
        lock(&self.inner).clone()
    }
}
