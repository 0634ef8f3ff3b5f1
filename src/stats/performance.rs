//! Named performance counters for one index type.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::utils::tools::lock;

/// Count of observations and their integer sum. Integer sums keep concurrent adds
/// order-independent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    pub sum: u64,
}

impl Counter {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

#[derive(Debug, Default)]
pub struct PipelinePerformance {
    counters: Mutex<BTreeMap<String, Counter>>,
}

impl PipelinePerformance {
    /// Add `n` to the count of `key`.
    pub fn add_count(&self, key: &str, n: u64) {
        let mut counters = lock(&self.counters);
        counters.entry(key.to_string()).or_default().count += n;
    }

    /// Record one observation of `value` under `key` (e.g. a stage duration in ms).
    pub fn add_value(&self, key: &str, value: u64) {
        let mut counters = lock(&self.counters);
        let c = counters.entry(key.to_string()).or_default();
        c.count += 1;
        c.sum += value;
    }

    pub fn get(&self, key: &str) -> Counter {
        lock(&self.counters).get(key).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Counter> {
        lock(&self.counters).clone()
    }

    pub fn reset(&self) {
        lock(&self.counters).clear();
    }
}
