//! Background writer for build status snapshots.
//!
//! Producers call [`BuildStatusUpdater::enqueue`], which only touches a bounded channel. One
//! dedicated thread drains the channel into the guarded DAO.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::types::IndexBuildStatus;
use crate::utils::tools::lock;

use super::guarded::GuardedIndexBuildStatusDao;

pub struct BuildStatusUpdater {
    tx: Mutex<Option<Sender<IndexBuildStatus>>>,
    /// Receiver clone used only to evict the oldest snapshot when the queue is full.
    evict_rx: Receiver<IndexBuildStatus>,
    handle: Mutex<Option<JoinHandle<u64>>>,
    dao: Arc<GuardedIndexBuildStatusDao>,
    dropped: AtomicU64,
}

/// Consumer loop: runs until every sender is gone and the queue is drained.
fn updater_loop(rx: Receiver<IndexBuildStatus>, dao: Arc<GuardedIndexBuildStatusDao>) -> u64 {
    let mut handled = 0_u64;
    while let Ok(status) = rx.recv() {
        dao.save_or_update(&status);
        handled += 1;
    }
    debug!("build status updater: queue closed after {handled} snapshots");
    handled
}

impl BuildStatusUpdater {
    /// Spawn the consumer thread with a queue of `capacity` pending snapshots.
    pub fn start(dao: Arc<GuardedIndexBuildStatusDao>, capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<IndexBuildStatus>(capacity.max(1));
        let evict_rx = rx.clone();
        let consumer_dao = Arc::clone(&dao);
        let handle = thread::Builder::new()
            .name("build-status-updater".to_string())
            .spawn(move || updater_loop(rx, consumer_dao))?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            evict_rx,
            handle: Mutex::new(Some(handle)),
            dao,
            dropped: AtomicU64::new(0),
        })
    }

    pub fn dao(&self) -> &Arc<GuardedIndexBuildStatusDao> {
        &self.dao
    }

    pub fn is_in_degraded_mode(&self) -> bool {
        self.dao.is_in_degraded_mode()
    }

    /// Snapshots evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue `status` for persistence without blocking. When the queue is full the oldest
    /// pending snapshot is dropped. Returns false once the updater has been shut down.
    pub fn enqueue(&self, status: IndexBuildStatus) -> bool {
        let guard = lock(&self.tx);
        let Some(tx) = guard.as_ref() else {
            debug!(
                "build status updater stopped; dropping status for {}",
                status.index_type
            );
            return false;
        };
        let mut pending = status;
        loop {
            match tx.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Full(s)) => {
                    if let Ok(evicted) = self.evict_rx.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "build status queue full; dropped pending status for {}",
                            evicted.index_type
                        );
                    }
                    pending = s;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// Close the queue, let the consumer drain it, and join. Returns snapshots handled.
    /// Idempotent; later calls return 0.
    pub fn shutdown(&self) -> u64 {
        drop(lock(&self.tx).take());
        match lock(&self.handle).take() {
            Some(h) => h.join().unwrap_or_else(|_| {
                warn!("build status updater thread panicked");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for BuildStatusUpdater {
    fn drop(&mut self) {
        self.shutdown();
    }
}
