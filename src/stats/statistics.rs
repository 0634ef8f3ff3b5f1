//! Registry of per index type statistics.
//!
//! One fixed slot per [`IndexType`], each with its own locks, so builds of different index
//! types never contend on a shared lock.

use std::sync::{Arc, RwLock};

use crate::types::IndexType;
use crate::utils::tools::{read, write};

use super::build_status::SharedBuildStatus;
use super::performance::PipelinePerformance;
use super::pipeline_status::PipelineStatus;

#[derive(Debug)]
struct Slot {
    pipeline_status: RwLock<Arc<PipelineStatus>>,
    build_status: RwLock<Arc<SharedBuildStatus>>,
    performance: PipelinePerformance,
}

impl Slot {
    fn new(index_type: IndexType) -> Self {
        Self {
            pipeline_status: RwLock::new(Arc::new(PipelineStatus::new(index_type))),
            build_status: RwLock::new(Arc::new(SharedBuildStatus::new(index_type))),
            performance: PipelinePerformance::default(),
        }
    }
}

#[derive(Debug)]
pub struct IndexingStatistics {
    slots: [Slot; IndexType::COUNT],
}

impl Default for IndexingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexingStatistics {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|i| Slot::new(IndexType::ALL[i])),
        }
    }

    fn slot(&self, index_type: IndexType) -> &Slot {
        &self.slots[index_type.slot()]
    }

    pub fn pipeline_status(&self, index_type: IndexType) -> Arc<PipelineStatus> {
        Arc::clone(&read(&self.slot(index_type).pipeline_status))
    }

    /// Attach `status` under its own index type. Latest attach wins.
    pub fn attach_pipeline_status(&self, status: Arc<PipelineStatus>) {
        let slot = self.slot(status.index_type());
        *write(&slot.pipeline_status) = status;
    }

    pub fn build_status(&self, index_type: IndexType) -> Arc<SharedBuildStatus> {
        Arc::clone(&read(&self.slot(index_type).build_status))
    }

    /// Attach `status` under its own index type. Latest attach wins.
    pub fn attach_build_status(&self, status: Arc<SharedBuildStatus>) {
        let slot = self.slot(status.index_type());
        *write(&slot.build_status) = status;
    }

    pub fn performance(&self, index_type: IndexType) -> &PipelinePerformance {
        &self.slot(index_type).performance
    }

    pub fn add_count(&self, index_type: IndexType, key: &str, n: u64) {
        self.performance(index_type).add_count(key, n);
    }

    pub fn add_value(&self, index_type: IndexType, key: &str, value: u64) {
        self.performance(index_type).add_value(key, value);
    }

    /// Items that left the pipeline: bumps completed counts and processed records.
    pub fn mark_completed(&self, index_type: IndexType, n: u64) {
        if n == 0 {
            return;
        }
        self.pipeline_status(index_type).add_completed(n);
        self.build_status(index_type).add_processed(n);
    }

    /// Zero incoming/completed for `index_type` only.
    pub fn reset(&self, index_type: IndexType) {
        self.pipeline_status(index_type).reset();
    }
}
