//! Circuit breaker around the build status store.
//!
//! Every attempt's outcome goes into an [`OperationHistory`]. Once the window holds
//! `ERRORS_TO_CONSIDER_AS_FAILING` errors the DAO enters degraded mode and stops hitting the
//! store, apart from one probe per interval. It leaves degraded mode only after
//! `SUCCESS_TO_CONSIDER_AS_RECOVERING` consecutive successes.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::types::{IndexBuildStatus, IndexType};
use crate::utils::tools::lock;

use super::history::{Expect, OperationHistory, Outcome};
use super::store::IndexBuildStatusStore;

pub struct GuardedIndexBuildStatusDao {
    inner: Arc<dyn IndexBuildStatusStore>,
    history: Mutex<OperationHistory>,
    degraded: AtomicBool,
    probe_interval: Duration,
    last_attempt: Mutex<Option<Instant>>,
    last_error: Mutex<Option<PipelineError>>,
}

impl GuardedIndexBuildStatusDao {
    pub fn new(inner: Arc<dyn IndexBuildStatusStore>, probe_interval: Duration) -> Self {
        Self {
            inner,
            history: Mutex::new(OperationHistory::new()),
            degraded: AtomicBool::new(false),
            probe_interval,
            last_attempt: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Readable from any thread.
    pub fn is_in_degraded_mode(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Most recent store failure, if any attempt has failed.
    pub fn last_error(&self) -> Option<PipelineError> {
        lock(&self.last_error).clone()
    }

    fn store_failed(&self, index_type: IndexType, action: &str, e: anyhow::Error) {
        let err = PipelineError::Store {
            index_type,
            message: format!("{action}: {e:#}"),
        };
        warn!("{err}");
        *lock(&self.last_error) = Some(err);
        self.record(Outcome::Error);
    }

    pub fn history(&self) -> OperationHistory {
        lock(&self.history).clone()
    }

    pub fn matches_pattern(&self, pattern: &[Expect]) -> Result<bool, PipelineError> {
        lock(&self.history).matches_pattern(pattern)
    }

    /// Record one outcome and move the degraded flag with hysteresis.
    pub fn record(&self, outcome: Outcome) {
        let mut history = lock(&self.history);
        history.record(outcome);
        let was_degraded = self.degraded.load(Ordering::Acquire);
        let degraded = if was_degraded {
            !history.is_recovering()
        } else {
            history.is_failing()
        };
        if degraded != was_degraded {
            if degraded {
                warn!(
                    "Build status store failing ({} errors in last {} attempts); entering degraded mode",
                    history.error_count(),
                    history.capacity()
                );
            } else {
                info!("Build status store recovered; leaving degraded mode");
            }
        }
        self.degraded.store(degraded, Ordering::Release);
    }

    /// In degraded mode only one probe per interval reaches the store.
    fn should_attempt(&self) -> bool {
        let mut last = lock(&self.last_attempt);
        let due = !self.is_in_degraded_mode()
            || last.is_none_or(|t| t.elapsed() >= self.probe_interval);
        if due {
            *last = Some(Instant::now());
        }
        due
    }

    /// Persist `status`. Store errors are recorded and logged, never returned.
    /// Returns None when the attempt failed or was skipped in degraded mode.
    pub fn save_or_update(&self, status: &IndexBuildStatus) -> Option<IndexBuildStatus> {
        if !self.should_attempt() {
            debug!(
                "Degraded mode: skipping build status save for {}",
                status.index_type
            );
            return None;
        }
        match self.inner.save_or_update(status) {
            Ok(saved) => {
                self.record(Outcome::Success);
                Some(saved)
            }
            Err(e) => {
                self.store_failed(status.index_type, "save", e);
                None
            }
        }
    }

    /// Load the stored status. Store errors are recorded and logged; None on error or skip.
    pub fn get(&self, index_type: IndexType) -> Option<IndexBuildStatus> {
        if !self.should_attempt() {
            debug!("Degraded mode: skipping build status read for {index_type}");
            return None;
        }
        match self.inner.get(index_type) {
            Ok(found) => {
                self.record(Outcome::Success);
                found
            }
            Err(e) => {
                self.store_failed(index_type, "read", e);
                None
            }
        }
    }
}
