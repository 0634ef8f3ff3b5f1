//! Fixed set of worker threads fed by a bounded job channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, error};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crate::error::PipelineError;
use crate::utils::tools::lock;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool for one pooled stage. `submit` blocks only while the job queue is full.
pub struct WorkerPool {
    name: String,
    threads: usize,
    tx: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Single worker: run jobs until the channel is closed and drained.
fn worker_loop(name: &str, job_rx: Receiver<Job>) {
    while let Ok(job) = job_rx.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("{name}: job panicked; worker continues");
        }
    }
}

impl WorkerPool {
    /// Spawn `threads` workers sharing a queue of `queue_capacity` pending jobs.
    pub fn new(name: &str, threads: usize, queue_capacity: usize) -> std::io::Result<Self> {
        let (job_tx, job_rx) = bounded::<Job>(queue_capacity.max(1));
        let threads = threads.max(1);
        let handles = (0..threads)
            .map(|i| {
                let job_rx = job_rx.clone();
                let worker_name = format!("{name}-{i}");
                thread::Builder::new()
                    .name(worker_name.clone())
                    .spawn(move || worker_loop(&worker_name, job_rx))
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        debug!("{name}: started {threads} workers");
        Ok(Self {
            name: name.to_string(),
            threads,
            tx: Mutex::new(Some(job_tx)),
            handles: Mutex::new(handles),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.tx).is_none()
    }

    /// Queue `job`. Blocks while the queue is full; fails once the pool is shut down.
    pub fn submit(&self, job: Job) -> Result<(), PipelineError> {
        // Clone the sender so a blocked send never holds the lock shutdown needs.
        let job_tx = lock(&self.tx).clone().ok_or_else(|| {
            PipelineError::configuration(format!("worker pool '{}' is shut down", self.name))
        })?;
        job_tx.send(job).map_err(|_| {
            PipelineError::configuration(format!("worker pool '{}' is shut down", self.name))
        })
    }

    /// Close the queue, let workers drain it, and join them. Idempotent.
    pub fn shutdown(&self) {
        // Dropping the last sender closes the channel so workers exit.
        drop(lock(&self.tx).take());
        let handles: Vec<_> = lock(&self.handles).drain(..).collect();
        for h in handles {
            let _ = h.join();
        }
        debug!("{}: workers joined", self.name);
    }
}
