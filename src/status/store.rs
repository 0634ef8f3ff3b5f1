//! Build status store boundary and an in-process implementation.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{IndexBuildStatus, IndexType};
use crate::utils::tools::lock;

/// Durable home of [`IndexBuildStatus`] records, one per index type.
pub trait IndexBuildStatusStore: Send + Sync {
    fn get(&self, index_type: IndexType) -> Result<Option<IndexBuildStatus>>;

    /// Insert or replace the record for `status.index_type`; returns what was stored.
    fn save_or_update(&self, status: &IndexBuildStatus) -> Result<IndexBuildStatus>;
}

#[derive(Debug, Default)]
pub struct InMemoryBuildStatusStore {
    rows: Mutex<HashMap<IndexType, IndexBuildStatus>>,
}

impl InMemoryBuildStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexBuildStatusStore for InMemoryBuildStatusStore {
    fn get(&self, index_type: IndexType) -> Result<Option<IndexBuildStatus>> {
        Ok(lock(&self.rows).get(&index_type).cloned())
    }

    fn save_or_update(&self, status: &IndexBuildStatus) -> Result<IndexBuildStatus> {
        lock(&self.rows).insert(status.index_type, status.clone());
        Ok(status.clone())
    }
}
