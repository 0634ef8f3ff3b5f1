//! Build statistics: per index type pipeline counters, live build status and performance.

pub mod build_status;
pub mod performance;
pub mod pipeline_status;
pub mod statistics;

pub use build_status::SharedBuildStatus;
pub use performance::{Counter, PipelinePerformance};
pub use pipeline_status::{PipelineCounts, PipelineStatus};
pub use statistics::IndexingStatistics;
