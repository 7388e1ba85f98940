//! Worker pool.
//!
//! Each worker is a dedicated `std::thread` searching its own slice of the
//! active job's nonce space and pushing winning evaluations to the
//! [`SolutionQueue`](crate::solution_queue::SolutionQueue).

pub mod input;
pub mod nonce;
mod pool;
mod worker;

use std::fmt;

pub use nonce::Multiplicator;
pub use pool::{PoolMonitor, WorkerPool};
pub use worker::{run_worker_loop, WorkerContext, WorkerStatus};

/// Solution classes, each with its own submission protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionKind {
    /// The job logic signaled a match; scarce and slot-limited.
    Bounty,

    /// The evaluation digest met the target.
    Pow,
}

impl fmt::Display for SolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolutionKind::Bounty => write!(f, "bounty"),
            SolutionKind::Pow => write!(f, "pow"),
        }
    }
}

/// A winning evaluation, as produced by a worker.
#[derive(Debug, Clone)]
pub struct SolutionReport {
    pub worker: usize,
    pub work_id: u64,
    pub block_id: u64,
    pub generation: u64,
    pub kind: SolutionKind,
    pub multiplicator: Multiplicator,

    /// Present for bounties.
    pub announcement: Option<[u8; 32]>,
}
