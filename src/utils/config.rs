//! Application configuration constants and the pipeline configuration value.
//! Tuning and thresholds in one place.

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    status_db_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                status_db_filename: format!(".{pkg}_status"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    pub fn status_db_filename(&self) -> &str {
        &self.status_db_filename
    }
}

// ---- Worker threads ----

/// Thread limits for pooled stages.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor for any pooled stage.
    pub floor: usize,
    /// Cap for the loader pool; lookups are I/O bound against one store.
    pub loader_max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            loader_max: Self::LOADER_MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 2;
    pub const LOADER_MAX_THREADS: usize = 8;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Default worker count for one pooled stage.
    pub fn stage_threads(&self) -> usize {
        self.all_threads.clamp(self.floor, self.loader_max.max(self.floor))
    }
}

// ---- Circuit breaker ----

/// Build status persistence circuit breaker.
pub struct CircuitBreakerConsts;

impl CircuitBreakerConsts {
    /// Capacity of the operation history ring buffer.
    pub const MAX_NUMBER_OF_OPERATIONS_TO_TRACK: usize = 5;
    /// Errors within the tracked window that put the DAO into degraded mode.
    pub const ERRORS_TO_CONSIDER_AS_FAILING: usize = 3;
    /// Consecutive successes needed to leave degraded mode.
    pub const SUCCESS_TO_CONSIDER_AS_RECOVERING: usize = 3;
    /// While degraded, one probe attempt is let through per interval.
    pub const DEFAULT_DEGRADED_PROBE_INTERVAL_MS: u64 = 30_000;
}

// Recovery must push enough errors out of the window that one new error cannot re-trip it.
const _: () = assert!(
    CircuitBreakerConsts::MAX_NUMBER_OF_OPERATIONS_TO_TRACK
        < CircuitBreakerConsts::ERRORS_TO_CONSIDER_AS_FAILING
            + CircuitBreakerConsts::SUCCESS_TO_CONSIDER_AS_RECOVERING
);

// ---- Batching / queues ----

/// Ids per batch handed to one loader invocation.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Pending jobs per worker pool before `send` applies backpressure.
pub const DEFAULT_POOL_QUEUE_CAPACITY: usize = 1_000;

/// Pending status snapshots before the updater starts dropping the oldest.
pub const STATUS_QUEUE_CAPACITY: usize = 1_024;

/// How often the CLI monitor loop polls the pipeline.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(200);

// ---- Pipeline configuration ----

/// How a stage schedules its tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run on the caller's thread. Deterministic; used in tests.
    #[default]
    Inline,
    /// Dispatch to the stage's own worker pool.
    Pooled,
}

/// Pipeline configuration. Built from defaults, then `.indexpipe.toml`, then CLI flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub grouping: ExecutionMode,
    pub loading: ExecutionMode,
    pub documents: ExecutionMode,
    pub publishing: ExecutionMode,
    /// Worker threads per pooled stage. When None, from [`WorkerThreadLimits::current`].
    pub worker_threads: Option<usize>,
    pub pool_queue_capacity: usize,
    pub status_queue_capacity: usize,
    pub degraded_probe_interval: Duration,
    /// Fail a build with its first item failure instead of logging and continuing.
    pub strict: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            grouping: ExecutionMode::Inline,
            loading: ExecutionMode::Inline,
            documents: ExecutionMode::Inline,
            publishing: ExecutionMode::Inline,
            worker_threads: None,
            pool_queue_capacity: DEFAULT_POOL_QUEUE_CAPACITY,
            status_queue_capacity: STATUS_QUEUE_CAPACITY,
            degraded_probe_interval: Duration::from_millis(
                CircuitBreakerConsts::DEFAULT_DEGRADED_PROBE_INTERVAL_MS,
            ),
            strict: false,
        }
    }
}

impl PipelineConfig {
    /// Production shape: inline grouping, pooled loading, documents and publishing.
    pub fn pooled() -> Self {
        Self {
            loading: ExecutionMode::Pooled,
            documents: ExecutionMode::Pooled,
            publishing: ExecutionMode::Pooled,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| WorkerThreadLimits::current().stage_threads())
            .max(1)
    }
}
