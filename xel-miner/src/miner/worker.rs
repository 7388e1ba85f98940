//! The search loop run by each worker thread.
//!
//! Runs in a dedicated `std::thread`. Each pass of the outer loop checks the
//! published generation, rebuilds the job instance when it moved, and then
//! searches for at most one slice before checking again.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::input::{announcement_hash, pow_digest, vm_inputs};
use super::nonce::Multiplicator;
use super::{SolutionKind, SolutionReport};
use crate::job::{Execution, InstanceError, JobInstance, VmMemory};
use crate::solution_queue::SolutionQueue;
use crate::tracing::prelude::*;
use crate::types::{EvalRate, Target};
use crate::work::{ActiveJob, CurrentWork};

/// Longest uninterrupted search before re-checking the generation.
pub const SEARCH_SLICE: Duration = Duration::from_secs(1);

/// Longest idle wait when no job is published.
pub const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Interval between evaluation rate reports.
pub const RATE_INTERVAL: Duration = Duration::from_secs(5);

/// Evaluations between wall-clock checks inside a slice.
const CLOCK_CHECK_INTERVAL: u64 = 16;

/// Worker status for queries.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub active: bool,
    pub rate: EvalRate,
    pub evaluations: u64,
    pub solutions: u64,
    pub exited: bool,
}

/// Everything a worker thread needs.
pub struct WorkerContext {
    pub id: usize,
    pub current: Arc<CurrentWork>,
    pub queue: Arc<SolutionQueue>,
    pub public_key: [u8; 32],
    pub status: Arc<RwLock<WorkerStatus>>,
    pub shutdown: Arc<AtomicBool>,
    pub quiet: bool,
}

/// Worker-local copy of the active job.
struct LocalJob {
    job: ActiveJob,
    instance: Box<dyn JobInstance>,
    multiplicator: Multiplicator,
}

enum SliceOutcome {
    /// Slice elapsed with nothing found.
    Expired,

    /// Restart signal or shutdown observed.
    Abandoned,

    Found(SolutionKind),
}

/// Run the worker loop until shutdown or a fatal error.
pub fn run_worker_loop(ctx: WorkerContext) {
    let id = ctx.id;
    match worker_loop(&ctx) {
        Ok(()) => debug!(worker = id, "Worker stopped"),
        Err(e) => error!(worker = id, error = %e, "Worker exiting"),
    }

    let mut status = ctx.status.write();
    status.active = false;
    status.exited = true;
}

#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error("unable to queue solution: {0}")]
    Queue(#[from] crate::solution_queue::QueueError),
}

fn worker_loop(ctx: &WorkerContext) -> Result<(), WorkerError> {
    let id = ctx.id;
    let mut mem = VmMemory::allocate()?;
    let mut local: Option<LocalJob> = None;

    let mut evaluations: u64 = 0;
    let mut rate_start = Instant::now();

    loop {
        if ctx.shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        let generation = ctx.current.generation();

        let current_generation = local.as_ref().map(|l| l.job.generation);

        if current_generation == Some(generation) {
            // A signal raised for a generation we already run is stale
            ctx.current.clear_restart(id);
            let Some(target) = ctx.current.target_for(generation) else {
                continue;
            };
            if let Some(l) = local.as_mut() {
                l.job.target = target;
            }
        } else {
            ctx.current.clear_restart(id);
            local = None;

            let Some(job) = ctx.current.snapshot() else {
                ctx.status.write().active = false;
                ctx.current.wait_for_change(generation, IDLE_WAIT);
                continue;
            };

            let mut instance = job.job.instantiate()?;
            instance.initialize(&mut mem)?;
            debug!(
                worker = id,
                work_id = job.work_id,
                generation = job.generation,
                "Worker switched job"
            );

            local = Some(LocalJob {
                multiplicator: Multiplicator::random(id as u32),
                instance,
                job,
            });
            ctx.status.write().active = true;
        }

        let Some(l) = local.as_mut() else {
            continue;
        };

        let outcome = search_slice(ctx, l, &mut mem, &mut evaluations);

        let elapsed = rate_start.elapsed();
        if elapsed >= RATE_INTERVAL {
            let rate = EvalRate::from_count(evaluations, elapsed);
            if ctx.quiet {
                debug!(worker = id, rate = %rate, "Evaluation rate");
            } else {
                info!(worker = id, rate = %rate, "Evaluation rate");
            }
            let mut status = ctx.status.write();
            status.rate = rate;
            status.evaluations += evaluations;
            evaluations = 0;
            rate_start = Instant::now();
        }

        if let SliceOutcome::Found(kind) = outcome {
            if kind == SolutionKind::Bounty && !verify_bounty(l, &ctx.public_key, &mut mem) {
                warn!(
                    worker = id,
                    work_id = l.job.work_id,
                    "Bounty failed verification, dropped"
                );
                continue;
            }

            let report = SolutionReport::new(id, &l.job, l.multiplicator, kind);
            info!(worker = id, work_id = l.job.work_id, kind = %kind, "Submitting solution");
            ctx.queue.push(report)?;
            ctx.status.write().solutions += 1;
        }
    }
}

/// Search the active job for up to one slice.
fn search_slice(
    ctx: &WorkerContext,
    local: &mut LocalJob,
    mem: &mut VmMemory,
    evaluations: &mut u64,
) -> SliceOutcome {
    let start = Instant::now();
    let target = local.job.target;
    let mut done: u64 = 0;

    loop {
        if ctx.current.restart_requested(ctx.id) || ctx.shutdown.load(Ordering::Relaxed) {
            *evaluations += done;
            return SliceOutcome::Abandoned;
        }

        local.multiplicator.advance();
        let outcome = evaluate(local, &ctx.public_key, &target, mem);
        done += 1;

        if let Some(kind) = outcome {
            *evaluations += done;
            return SliceOutcome::Found(kind);
        }

        if done.is_multiple_of(CLOCK_CHECK_INTERVAL) && start.elapsed() >= SEARCH_SLICE {
            *evaluations += done;
            return SliceOutcome::Expired;
        }
    }
}

/// One evaluation at the current multiplicator.
fn evaluate(
    local: &mut LocalJob,
    public_key: &[u8; 32],
    target: &Target,
    mem: &mut VmMemory,
) -> Option<SolutionKind> {
    let inputs = vm_inputs(
        &local.multiplicator,
        public_key,
        local.job.work_id,
        local.job.block_id,
    );
    mem.load_inputs(&inputs);

    match local.instance.execute(mem) {
        Execution::Bounty => Some(SolutionKind::Bounty),
        Execution::Pow => Some(SolutionKind::Pow),
        Execution::Nothing => {
            let digest = pow_digest(&mem.state, &inputs);
            target.is_met_by(&digest).then_some(SolutionKind::Pow)
        }
    }
}

fn verify_bounty(local: &mut LocalJob, public_key: &[u8; 32], mem: &mut VmMemory) -> bool {
    let inputs = vm_inputs(
        &local.multiplicator,
        public_key,
        local.job.work_id,
        local.job.block_id,
    );
    mem.load_inputs(&inputs);
    local.instance.verify(mem)
}

impl SolutionReport {
    fn new(
        worker: usize,
        job: &ActiveJob,
        multiplicator: Multiplicator,
        kind: SolutionKind,
    ) -> Self {
        let announcement = match kind {
            SolutionKind::Bounty => Some(announcement_hash(job.work_id, &multiplicator)),
            SolutionKind::Pow => None,
        };
        Self {
            worker,
            work_id: job.work_id,
            block_id: job.block_id,
            generation: job.generation,
            kind,
            multiplicator,
            announcement,
        }
    }
}
