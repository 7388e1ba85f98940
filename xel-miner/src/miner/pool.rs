use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use parking_lot::RwLock;

use super::worker::{run_worker_loop, WorkerContext, WorkerStatus};
use crate::solution_queue::SolutionQueue;
use crate::tracing::prelude::*;
use crate::types::EvalRate;
use crate::work::CurrentWork;

/// Status view shared with the coordinator loop.
#[derive(Clone, Default)]
pub struct PoolMonitor {
    statuses: Vec<Arc<RwLock<WorkerStatus>>>,
}

impl PoolMonitor {
    /// Per-worker status snapshots.
    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.statuses.iter().map(|s| s.read().clone()).collect()
    }

    /// Sum of the latest per-worker rates.
    pub fn total_rate(&self) -> EvalRate {
        self.statuses.iter().map(|s| s.read().rate).sum()
    }

    /// Workers still running.
    pub fn alive(&self) -> usize {
        self.statuses.iter().filter(|s| !s.read().exited).count()
    }
}

/// Fixed set of worker threads sharing one active job and one queue.
pub struct WorkerPool {
    statuses: Vec<Arc<RwLock<WorkerStatus>>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    current: Arc<CurrentWork>,
}

impl WorkerPool {
    /// Spawn one worker per restart signal in `current`.
    ///
    /// Failing to spawn any thread stops the ones already started.
    pub fn spawn(
        current: Arc<CurrentWork>,
        queue: Arc<SolutionQueue>,
        public_key: [u8; 32],
        quiet: bool,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut pool = Self {
            statuses: Vec::new(),
            handles: Vec::new(),
            shutdown: Arc::clone(&shutdown),
            current: Arc::clone(&current),
        };

        for id in 0..current.workers() {
            let status = Arc::new(RwLock::new(WorkerStatus::default()));
            let ctx = WorkerContext {
                id,
                current: Arc::clone(&current),
                queue: Arc::clone(&queue),
                public_key,
                status: Arc::clone(&status),
                shutdown: Arc::clone(&shutdown),
                quiet,
            };

            let handle = std::thread::Builder::new()
                .name(format!("xel-worker-{}", id))
                .spawn(move || run_worker_loop(ctx))?;

            pool.statuses.push(status);
            pool.handles.push(handle);
        }

        info!(workers = pool.handles.len(), "Worker threads started");
        Ok(pool)
    }

    /// Cloneable read-only view of the worker statuses.
    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            statuses: self.statuses.clone(),
        }
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.current.wake_idle();
    }

    /// Stop every worker and wait for it to finish its current evaluation.
    pub fn shutdown(mut self) {
        self.signal_shutdown();
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "Worker thread panicked");
            }
        }
        debug!("Worker threads stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}
