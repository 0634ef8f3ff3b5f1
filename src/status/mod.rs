//! Build status persistence: store boundary, circuit breaker and background updater.

pub mod guarded;
pub mod history;
pub mod sqlite_store;
pub mod store;
pub mod updater;

pub use guarded::GuardedIndexBuildStatusDao;
pub use history::{Expect, HISTORY_CAPACITY, OperationHistory, Outcome, RECOVERING_PATTERN};
pub use sqlite_store::SqliteBuildStatusStore;
pub use store::{InMemoryBuildStatusStore, IndexBuildStatusStore};
pub use updater::BuildStatusUpdater;
