//! Shared state handed to every stage task.

use std::sync::Arc;

use crate::stats::IndexingStatistics;

use super::failures::FailureLog;

/// Statistics and failure log shared by all stages of one pipeline. Cheap to clone.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub statistics: Arc<IndexingStatistics>,
    pub failures: Arc<FailureLog>,
}

impl PipelineContext {
    pub fn new(statistics: Arc<IndexingStatistics>) -> Self {
        Self {
            statistics,
            failures: Arc::new(FailureLog::default()),
        }
    }
}
