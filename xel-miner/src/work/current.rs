//! The single job the whole worker pool is mining.
//!
//! The coordinator publishes a selection; workers poll [`CurrentWork::generation`]
//! cheaply and take a consistent [`ActiveJob`] snapshot when it changes. Every
//! field of the active job is written under one exclusive lock together with
//! the generation, so a worker never sees a job id from one generation paired
//! with a target from another.
//!
//! Restart signals are a low-latency nudge for workers deep in a search slice.
//! The generation counter stays authoritative.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::job::PreparedJob;
use crate::types::Target;

/// Job assignment shared by all workers.
#[derive(Debug, Clone)]
pub struct ActiveJob {
    pub work_id: u64,
    pub work_str: String,
    pub block_id: u64,
    pub name: String,
    pub target: Target,
    pub job: PreparedJob,

    /// Set by [`CurrentWork::publish`].
    pub generation: u64,
}

/// Per-worker restart flag, kept on its own cache line.
#[repr(align(128))]
#[derive(Debug, Default)]
pub struct RestartSignal(AtomicBool);

impl RestartSignal {
    fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What [`CurrentWork::publish`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A different package became active; workers restart.
    Switched,

    /// Same package, refreshed target; workers keep their search state.
    TargetUpdated,

    /// Nothing changed.
    Unchanged,

    /// No candidate; the active job was cleared and workers restart.
    Cleared,
}

/// Publisher and holder of the active job.
pub struct CurrentWork {
    active: RwLock<Option<ActiveJob>>,
    generation: AtomicU64,
    restart: Box<[RestartSignal]>,
    changed: Mutex<()>,
    changed_cond: Condvar,
}

impl CurrentWork {
    /// Empty publisher with one restart signal per worker.
    pub fn new(workers: usize) -> Self {
        Self {
            active: RwLock::new(None),
            generation: AtomicU64::new(0),
            restart: (0..workers).map(|_| RestartSignal::default()).collect(),
            changed: Mutex::new(()),
            changed_cond: Condvar::new(),
        }
    }

    /// Make `next` the active job, or clear it when `None`.
    pub fn publish(&self, next: Option<ActiveJob>) -> PublishOutcome {
        let outcome = {
            let mut active = self.active.write();
            match next {
                None => {
                    if active.take().is_some() {
                        self.bump_generation();
                        PublishOutcome::Cleared
                    } else {
                        PublishOutcome::Unchanged
                    }
                }
                Some(mut next) => match active.as_mut() {
                    Some(current) if current.work_id == next.work_id => {
                        if current.target == next.target {
                            PublishOutcome::Unchanged
                        } else {
                            current.target = next.target;
                            PublishOutcome::TargetUpdated
                        }
                    }
                    _ => {
                        next.generation = self.bump_generation();
                        *active = Some(next);
                        PublishOutcome::Switched
                    }
                },
            }
        };

        if matches!(outcome, PublishOutcome::Switched | PublishOutcome::Cleared) {
            self.raise_all();
            self.wake_idle();
        }
        outcome
    }

    // Caller holds the write lock.
    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn raise_all(&self) {
        for signal in self.restart.iter() {
            signal.raise();
        }
    }

    /// Wake every worker idling in [`wait_for_change`](Self::wait_for_change).
    pub fn wake_idle(&self) {
        let _guard = self.changed.lock();
        self.changed_cond.notify_all();
    }

    /// Current generation, without taking the job lock.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Consistent copy of the active job.
    pub fn snapshot(&self) -> Option<ActiveJob> {
        self.active.read().clone()
    }

    /// Target of the active job, if it still belongs to `generation`.
    pub fn target_for(&self, generation: u64) -> Option<Target> {
        self.active
            .read()
            .as_ref()
            .filter(|job| job.generation == generation)
            .map(|job| job.target)
    }

    pub fn restart_requested(&self, worker: usize) -> bool {
        self.restart.get(worker).is_some_and(RestartSignal::is_raised)
    }

    /// Only worker `worker` clears its own signal.
    pub fn clear_restart(&self, worker: usize) {
        if let Some(signal) = self.restart.get(worker) {
            signal.clear();
        }
    }

    /// Block until the generation moves past `seen` or `timeout` elapses.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) {
        let mut guard = self.changed.lock();
        if self.generation() != seen {
            return;
        }
        self.changed_cond.wait_for(&mut guard, timeout);
    }

    pub fn workers(&self) -> usize {
        self.restart.len()
    }
}
