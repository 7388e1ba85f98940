//! The live set of submission requests.
//!
//! Only the coordinator loop mutates the book. Requests are copied out with
//! [`SubmissionBook::due`], advanced without the lock while the transport
//! call runs, and written back with [`SubmissionBook::write_back`].
//!
//! The owning package's pending-bounty count goes up by one when a bounty
//! request is admitted and down by one when it leaves the book, whether it
//! completed or went stale. The catalog is only touched after the book's
//! lock is released.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::machine::{self, Disposition, Transition};
use super::request::SubmissionRequest;
use crate::miner::{SolutionKind, SolutionReport};
use crate::tracing::prelude::*;
use crate::work::WorkCatalog;

/// Outcome counters for one solution class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub accepted: u64,
    pub rejected: u64,
    pub discarded: u64,
    pub deprecated: u64,
    pub timed_out: u64,
}

impl Tally {
    fn count(&mut self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Accepted => &mut self.accepted,
            Disposition::Rejected => &mut self.rejected,
            Disposition::Discarded => &mut self.discarded,
            Disposition::Deprecated => &mut self.deprecated,
            Disposition::TimedOut => &mut self.timed_out,
        };
        *counter += 1;
    }
}

/// Counters accumulated for summary reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    pub bounty: Tally,
    pub pow: Tally,

    /// Submission attempts that got no usable response.
    pub transport_errors: u64,
}

struct BookInner {
    next_id: u64,
    live: Vec<SubmissionRequest>,
    stats: SubmissionStats,
}

/// Live submission requests plus their outcome counters.
pub struct SubmissionBook {
    inner: Mutex<BookInner>,
    catalog: Arc<WorkCatalog>,
}

impl SubmissionBook {
    pub fn new(catalog: Arc<WorkCatalog>) -> Self {
        Self {
            inner: Mutex::new(BookInner {
                next_id: 1,
                live: Vec::new(),
                stats: SubmissionStats::default(),
            }),
            catalog,
        }
    }

    /// Turn a dequeued solution into a live request.
    pub fn admit(&self, report: &SolutionReport, now: Instant) -> u64 {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .live
                .push(SubmissionRequest::from_report(id, report, now));
            id
        };

        if report.kind == SolutionKind::Bounty {
            self.catalog.adjust_pending(report.work_id, 1);
        }
        debug!(
            id,
            worker = report.worker,
            work_id = report.work_id,
            kind = %report.kind,
            "Queued submission"
        );
        id
    }

    /// Copies of the requests whose next attempt is due, oldest first.
    pub fn due(&self, now: Instant) -> Vec<SubmissionRequest> {
        self.inner
            .lock()
            .live
            .iter()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect()
    }

    /// Store an advanced copy back, removing it if it completed.
    ///
    /// Requests no longer in the book (swept meanwhile) are ignored.
    pub fn write_back(&self, req: SubmissionRequest, transition: Transition) {
        let removed = {
            let mut inner = self.inner.lock();
            let Some(pos) = inner.live.iter().position(|r| r.id == req.id) else {
                return;
            };

            match transition {
                Transition::Completed(disposition) => {
                    let tally = match req.kind {
                        SolutionKind::Bounty => &mut inner.stats.bounty,
                        SolutionKind::Pow => &mut inner.stats.pow,
                    };
                    tally.count(disposition);
                    inner.live.remove(pos);
                    Some(disposition)
                }
                Transition::Advanced(_) | Transition::Retry => {
                    inner.live[pos] = req.clone();
                    None
                }
            }
        };

        if let Some(disposition) = removed {
            self.release(&req);
            log_outcome(&req, disposition);
        } else if let Transition::Advanced(phase) = transition {
            debug!(id = req.id, work_id = req.work_id, phase = %phase, "Submission advanced");
        }
    }

    /// Record a transport failure for a copied-out request.
    pub fn note_transport_error(&self, req: SubmissionRequest) {
        let mut inner = self.inner.lock();
        inner.stats.transport_errors += 1;
        if let Some(slot) = inner.live.iter_mut().find(|r| r.id == req.id) {
            *slot = req;
        }
    }

    /// Force-complete every request that outlived the staleness bound.
    ///
    /// Returns the number of requests expired.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<SubmissionRequest> = {
            let mut inner = self.inner.lock();
            let (stale, live): (Vec<_>, Vec<_>) = inner
                .live
                .drain(..)
                .partition(|r| r.is_stale(now) || r.is_complete());
            inner.live = live;

            let mut expired = Vec::with_capacity(stale.len());
            for mut req in stale {
                // Completed requests are removed on write-back; never counted twice
                if !req.is_complete() {
                    machine::expire(&mut req);
                    let tally = match req.kind {
                        SolutionKind::Bounty => &mut inner.stats.bounty,
                        SolutionKind::Pow => &mut inner.stats.pow,
                    };
                    tally.count(Disposition::TimedOut);
                    expired.push(req);
                }
            }
            expired
        };

        for req in &expired {
            self.release(req);
            log_outcome(req, Disposition::TimedOut);
        }
        expired.len()
    }

    fn release(&self, req: &SubmissionRequest) {
        if req.is_bounty() {
            self.catalog.adjust_pending(req.work_id, -1);
        }
    }

    pub fn stats(&self) -> SubmissionStats {
        self.inner.lock().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live bounty requests for one package.
    pub fn live_bounties(&self, work_id: u64) -> usize {
        self.inner
            .lock()
            .live
            .iter()
            .filter(|r| r.is_bounty() && r.work_id == work_id)
            .count()
    }
}

fn log_outcome(req: &SubmissionRequest, disposition: Disposition) {
    let kind = req.kind;
    match disposition {
        Disposition::Accepted => info!(
            worker = req.worker,
            work_id = req.work_id,
            kind = %kind,
            "Solution accepted"
        ),
        Disposition::Discarded => info!(
            worker = req.worker,
            work_id = req.work_id,
            kind = %kind,
            "Solution discarded as duplicate"
        ),
        Disposition::Rejected | Disposition::Deprecated | Disposition::TimedOut => warn!(
            worker = req.worker,
            work_id = req.work_id,
            kind = %kind,
            outcome = %disposition,
            "Solution not accepted"
        ),
    }
}
