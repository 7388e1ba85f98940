//! The coordinator loop.
//!
//! One async task owns all conversation with the coordinator. It refreshes
//! the work list on the scan interval or when the long-poll watcher reports a
//! new block, publishes the selected job to the workers, and drives every
//! queued solution through its submission protocol.
//!
//! Work reaches the workers only through [`CurrentWork`]; solutions come back
//! through the [`SolutionQueue`], forwarded into this task by
//! [`forward_solutions`]. No lock is held across a coordinator call:
//! submissions are copied out of the [`SubmissionBook`], advanced locally,
//! and written back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::coordinator::{Coordinator, CoordinatorError, MineableWork};
use crate::miner::{PoolMonitor, SolutionReport};
use crate::solution_queue::SolutionQueue;
use crate::submission::{machine, SubmissionBook, Tally};
use crate::tracing::prelude::*;
use crate::types::format_uptime;
use crate::work::{ActiveJob, Candidate, CurrentWork, PublishOutcome, WorkCatalog, WorkSelector};

/// Refresh interval cap while nothing is being mined.
pub const NO_WORK_REFRESH: Duration = Duration::from_secs(15);

/// Interval between mining summaries.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between submission passes.
const SUBMIT_TICK: Duration = Duration::from_secs(1);

/// How long the queue bridge blocks per pop.
const BRIDGE_POP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Regular work refresh interval.
    pub scan_time: Duration,

    /// Consecutive failed fetches tolerated; negative retries forever.
    pub retries: i32,

    /// Pause after a failed coordinator call.
    pub retry_pause: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("giving up after {failures} consecutive failed work fetches: {last}")]
    RetriesExhausted {
        failures: u32,
        last: CoordinatorError,
    },
}

/// Shared aggregates the loop drives.
#[derive(Clone)]
pub struct MinerState {
    pub catalog: Arc<WorkCatalog>,
    pub current: Arc<CurrentWork>,
    pub book: Arc<SubmissionBook>,
    pub monitor: PoolMonitor,
}

pub struct Scheduler {
    config: SchedulerConfig,
    coordinator: Coordinator,
    selector: WorkSelector,
    state: MinerState,
    solutions: mpsc::Receiver<SolutionReport>,
    refresh: Arc<Notify>,
    summary: Arc<Notify>,
    running: CancellationToken,
    started: Instant,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        coordinator: Coordinator,
        selector: WorkSelector,
        state: MinerState,
        solutions: mpsc::Receiver<SolutionReport>,
        running: CancellationToken,
    ) -> Self {
        Self {
            config,
            coordinator,
            selector,
            state,
            solutions,
            refresh: Arc::new(Notify::new()),
            summary: Arc::new(Notify::new()),
            running,
            started: Instant::now(),
        }
    }

    /// Notified to request an immediate work refresh.
    pub fn refresh_trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.refresh)
    }

    /// Notified to request a mining summary.
    pub fn summary_trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.summary)
    }

    /// Run until cancelled or until the fetch failure budget is spent.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        let refresh = Arc::clone(&self.refresh);
        let summary = Arc::clone(&self.summary);

        let mut next_refresh = tokio::time::Instant::now();
        let mut failures: u32 = 0;

        let mut submit_tick = tokio::time::interval(SUBMIT_TICK);
        submit_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut summary_interval = tokio::time::interval(SUMMARY_INTERVAL);
        summary_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut first_tick = true;

        debug!(
            scan_s = self.config.scan_time.as_secs(),
            preference = %self.selector.preference(),
            "Coordinator loop started"
        );

        let result = loop {
            let refresh_now = tokio::select! {
                _ = self.running.cancelled() => break Ok(()),

                _ = tokio::time::sleep_until(next_refresh) => true,

                _ = refresh.notified() => {
                    debug!("Out-of-cycle refresh requested");
                    true
                }

                Some(report) = self.solutions.recv() => {
                    self.admit(&report);
                    while let Ok(report) = self.solutions.try_recv() {
                        self.admit(&report);
                    }
                    self.process_submissions().await;
                    false
                }

                _ = submit_tick.tick() => {
                    self.process_submissions().await;
                    self.state.book.sweep(Instant::now());
                    false
                }

                _ = summary_interval.tick() => {
                    if first_tick {
                        first_tick = false;
                    } else {
                        self.log_summary();
                    }
                    false
                }

                _ = summary.notified() => {
                    self.log_summary();
                    false
                }
            };

            if !refresh_now {
                continue;
            }

            match self.refresh().await {
                Ok(()) => {
                    failures = 0;
                    let wait = if self.state.current.snapshot().is_some() {
                        self.config.scan_time
                    } else {
                        self.config.scan_time.min(NO_WORK_REFRESH)
                    };
                    next_refresh = tokio::time::Instant::now() + wait;
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        error = %e,
                        failures,
                        pause_s = self.config.retry_pause.as_secs(),
                        "Work fetch failed"
                    );
                    if exhausted(self.config.retries, failures) {
                        error!(failures, "Retry budget exhausted");
                        break Err(SchedulerError::RetriesExhausted { failures, last: e });
                    }
                    next_refresh = tokio::time::Instant::now() + self.config.retry_pause;
                }
            }
        };

        self.log_summary();
        debug!("Coordinator loop stopped");
        result
    }

    async fn refresh(&mut self) -> Result<(), CoordinatorError> {
        let work = self.coordinator.fetch_work().await?;
        self.apply_work(&work);
        Ok(())
    }

    /// Merge a fetched work list into the catalog and publish the selection.
    ///
    /// With nothing eligible the active job is cleared and workers go idle.
    fn apply_work(&mut self, work: &MineableWork) -> PublishOutcome {
        let catalog = &self.state.catalog;
        let candidates: Vec<Candidate> = work
            .work_packages
            .iter()
            .filter_map(|desc| {
                let work_id = catalog.upsert(desc);
                catalog.get(work_id).map(|package| Candidate {
                    package,
                    target: desc.target,
                    received_bounties: desc.received_bounties,
                })
            })
            .collect();

        let active = self.selector.select(&candidates).and_then(|choice| {
            let package = choice.package;
            Some(ActiveJob {
                work_id: package.work_id,
                work_str: package.work_str,
                block_id: package.block_id,
                name: package.name,
                target: choice.target,
                job: package.job?,
                generation: 0,
            })
        });

        let Some(active) = active else {
            let outcome = self.state.current.publish(None);
            if outcome == PublishOutcome::Cleared {
                info!(offered = candidates.len(), "No eligible work package, mining paused");
            } else {
                debug!(offered = candidates.len(), "No eligible work package");
            }
            return outcome;
        };

        let (work_id, target) = (active.work_id, active.target);
        let name = active.name.clone();

        let outcome = self.state.current.publish(Some(active));
        match outcome {
            PublishOutcome::Switched => info!(
                work_id,
                name = %name,
                target = %target,
                generation = self.state.current.generation(),
                "Mining new work"
            ),
            PublishOutcome::TargetUpdated => debug!(work_id, target = %target, "Target updated"),
            PublishOutcome::Unchanged | PublishOutcome::Cleared => {}
        }
        outcome
    }

    fn admit(&self, report: &SolutionReport) {
        self.state.book.admit(report, Instant::now());
    }

    /// Send every due submission step and apply the responses.
    async fn process_submissions(&self) {
        let book = &self.state.book;

        for mut req in book.due(Instant::now()) {
            if self.running.is_cancelled() {
                break;
            }
            let Some(request) = req.to_request() else {
                continue;
            };

            match self.coordinator.submit(&request).await {
                Ok(response) => {
                    let transition = machine::advance(&mut req, &response, Instant::now());
                    book.write_back(req, transition);
                }
                Err(e) => {
                    warn!(
                        id = req.id,
                        work_id = req.work_id,
                        phase = %req.phase,
                        error = %e,
                        "Submission attempt failed"
                    );
                    machine::postpone(&mut req, Instant::now(), self.config.retry_pause);
                    book.note_transport_error(req);
                }
            }
        }
    }

    fn log_summary(&self) {
        let stats = self.state.book.stats();
        let uptime = format_uptime(self.started.elapsed());
        let rate = self.state.monitor.total_rate();
        let pending = self.state.catalog.total_pending();

        match self.state.current.snapshot() {
            Some(active) => info!(
                uptime = %uptime,
                work = %active.name,
                work_id = active.work_id,
                target = %active.target,
                rate = %rate.to_human_readable(),
                workers = self.state.monitor.alive(),
                pending,
                bounties = %tally_summary(&stats.bounty),
                pow = %tally_summary(&stats.pow),
                transport_errors = stats.transport_errors,
                "Mining status."
            ),
            None => info!(
                uptime = %uptime,
                workers = self.state.monitor.alive(),
                pending,
                bounties = %tally_summary(&stats.bounty),
                pow = %tally_summary(&stats.pow),
                transport_errors = stats.transport_errors,
                "Mining status (no work)."
            ),
        }
    }
}

fn exhausted(retries: i32, failures: u32) -> bool {
    u32::try_from(retries).is_ok_and(|budget| failures > budget)
}

fn tally_summary(tally: &Tally) -> String {
    format!(
        "{} accepted, {} rejected, {} discarded, {} deprecated, {} timed out",
        tally.accepted, tally.rejected, tally.discarded, tally.deprecated, tally.timed_out
    )
}

/// Move solutions from the worker queue into the coordinator loop.
///
/// Runs on a blocking thread until cancelled, the receiver is dropped, or
/// the queue is frozen and drained.
pub fn forward_solutions(
    queue: Arc<SolutionQueue>,
    tx: mpsc::Sender<SolutionReport>,
    running: CancellationToken,
) {
    while !running.is_cancelled() {
        match queue.pop(BRIDGE_POP_TIMEOUT) {
            Some(report) => {
                if tx.blocking_send(report).is_err() {
                    break;
                }
            }
            None if queue.is_frozen() => break,
            None => {}
        }
    }
    trace!("Solution bridge stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::test_support::ScriptedTransport;
    use crate::job::ReferenceCompiler;
    use crate::miner::{Multiplicator, SolutionKind};
    use crate::work::Preference;
    use serde_json::{json, Value};

    const EASY: &str = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";

    fn package(work_id: u64, source: &str, reward_pow: u64) -> Value {
        json!({
            "work_id": work_id.to_string(),
            "block_id": "7",
            "title": format!("job {}", work_id),
            "target": EASY,
            "source": source,
            "bounty_limit": "5",
            "xel_per_bounty": "100",
            "xel_per_pow": reward_pow.to_string(),
            "received_bounties": "0"
        })
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        state: MinerState,
        tx: mpsc::Sender<SolutionReport>,
        running: CancellationToken,
    }

    fn harness(config: SchedulerConfig) -> (Scheduler, Harness) {
        let transport = ScriptedTransport::new();
        let catalog = Arc::new(WorkCatalog::new(Arc::new(ReferenceCompiler)));
        let state = MinerState {
            catalog: catalog.clone(),
            current: Arc::new(CurrentWork::new(1)),
            book: Arc::new(SubmissionBook::new(catalog)),
            monitor: PoolMonitor::default(),
        };
        let (tx, rx) = mpsc::channel(16);
        let running = CancellationToken::new();
        let scheduler = Scheduler::new(
            config,
            Coordinator::new(transport.clone()),
            WorkSelector::new(Preference::Profit),
            state.clone(),
            rx,
            running.clone(),
        );
        (
            scheduler,
            Harness {
                transport,
                state,
                tx,
                running,
            },
        )
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            scan_time: Duration::from_secs(3600),
            retries: -1,
            retry_pause: Duration::from_millis(20),
        }
    }

    fn report(kind: SolutionKind, work_id: u64) -> SolutionReport {
        let multiplicator = Multiplicator::new(0, [1, 2]);
        SolutionReport {
            worker: 0,
            work_id,
            block_id: 7,
            generation: 1,
            kind,
            announcement: (kind == SolutionKind::Bounty)
                .then(|| crate::miner::input::announcement_hash(work_id, &multiplicator)),
            multiplicator,
        }
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    fn test_apply_work_selects_most_profitable() {
        let (mut scheduler, h) = harness(config());
        // Source lengths set WCET: "87cURD]i,\"Ebo80" decodes to 12 bytes, "87cURDZ" to 5.
        let work: MineableWork = serde_json::from_value(json!({"work_packages": [
            package(1, "87cURD]i,\"Ebo80", 12),
            package(2, "87cURDZ", 10),
        ]}))
        .unwrap();

        assert_eq!(scheduler.apply_work(&work), PublishOutcome::Switched);
        let active = h.state.current.snapshot().unwrap();
        assert_eq!(active.work_id, 2);
        assert_eq!(active.name, "job 2");
        assert_eq!(h.state.catalog.len(), 2);

        assert_eq!(scheduler.apply_work(&work), PublishOutcome::Unchanged);
        assert_eq!(h.state.current.generation(), 1);
    }

    #[test]
    fn test_no_eligible_work_clears_active_job() {
        let (mut scheduler, h) = harness(config());
        let good: MineableWork =
            serde_json::from_value(json!({"work_packages": [package(1, "87cURDZ", 10)]})).unwrap();
        scheduler.apply_work(&good);
        h.state.current.clear_restart(0);

        let broken: MineableWork =
            serde_json::from_value(json!({"work_packages": [package(3, "vvvvv", 10)]})).unwrap();
        assert_eq!(scheduler.apply_work(&broken), PublishOutcome::Cleared);
        assert!(h.state.current.snapshot().is_none());
        assert!(h.state.current.restart_requested(0));
        assert!(h.state.catalog.get(3).unwrap().blacklisted);

        assert_eq!(scheduler.apply_work(&broken), PublishOutcome::Unchanged);
    }

    #[test]
    fn test_bounty_exhausted_package_is_dropped() {
        let (mut scheduler, h) = harness(config());
        let open: MineableWork =
            serde_json::from_value(json!({"work_packages": [package(1, "87cURDZ", 10)]})).unwrap();
        assert_eq!(scheduler.apply_work(&open), PublishOutcome::Switched);
        h.state.current.clear_restart(0);
        let generation = h.state.current.generation();

        let mut full = package(1, "87cURDZ", 10);
        full["received_bounties"] = json!("5");
        let full: MineableWork =
            serde_json::from_value(json!({ "work_packages": [full] })).unwrap();

        assert_eq!(scheduler.apply_work(&full), PublishOutcome::Cleared);
        assert!(h.state.current.snapshot().is_none());
        assert!(h.state.current.restart_requested(0));
        assert_eq!(h.state.current.generation(), generation + 1);
    }

    #[test]
    fn test_retry_budget() {
        assert!(!exhausted(-1, 1_000_000));
        assert!(exhausted(0, 1));
        assert!(!exhausted(2, 2));
        assert!(exhausted(2, 3));
    }

    #[tokio::test]
    async fn test_exits_when_fetch_budget_spent() {
        let (scheduler, h) = harness(SchedulerConfig {
            retries: 2,
            ..config()
        });
        for _ in 0..3 {
            h.transport.push_failure("getMineableWork");
        }

        let result = tokio::time::timeout(Duration::from_secs(5), scheduler.run())
            .await
            .expect("loop did not exit");
        match result {
            Err(SchedulerError::RetriesExhausted { failures, .. }) => assert_eq!(failures, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.transport.seen_of("getMineableWork").len(), 3);
    }

    #[tokio::test]
    async fn test_decode_failure_is_failed_fetch() {
        let (scheduler, h) = harness(SchedulerConfig {
            retries: 0,
            ..config()
        });
        h.transport
            .push("getMineableWork", json!({"work_packages": [{"work_id": "1"}]}));

        let result = scheduler.run().await;
        assert!(result.is_err());
        assert!(h.state.catalog.is_empty());
    }

    #[tokio::test]
    async fn test_pow_submission_accepted() {
        let (scheduler, h) = harness(config());
        h.transport.set_fallback(
            "getMineableWork",
            json!({"work_packages": [package(1, "87cURDZ", 10)]}),
        );
        h.transport.push("createPoX", json!({}));
        let task = tokio::spawn(scheduler.run());

        h.tx.send(report(SolutionKind::Pow, 1)).await.unwrap();
        let book = h.state.book.clone();
        wait_for(|| book.stats().pow.accepted == 1).await;
        assert!(book.is_empty());

        let pox = h.transport.seen_of("createPoX");
        assert!(matches!(pox[0], crate::coordinator::Request::CreatePox { is_pow: true, .. }));

        h.running.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bounty_runs_full_protocol() {
        let (scheduler, h) = harness(config());
        h.transport.set_fallback(
            "getMineableWork",
            json!({"work_packages": [package(1, "87cURDZ", 10)]}),
        );
        h.transport.push("bountyAnnouncement", json!({}));
        h.transport
            .push("getApprovedBounties", json!({"approved": "true"}));
        h.transport.push("createPoX", json!({}));
        let task = tokio::spawn(scheduler.run());

        let catalog = h.state.catalog.clone();
        wait_for(|| catalog.get(1).is_some()).await;

        h.tx.send(report(SolutionKind::Bounty, 1)).await.unwrap();
        let book = h.state.book.clone();
        wait_for(|| book.stats().bounty.accepted == 1).await;

        assert_eq!(catalog.get(1).unwrap().pending, 0);
        assert_eq!(h.transport.seen_of("bountyAnnouncement").len(), 1);
        assert_eq!(h.transport.seen_of("getApprovedBounties").len(), 1);
        let claim = h.transport.seen_of("createPoX");
        assert!(matches!(claim[0], crate::coordinator::Request::CreatePox { is_pow: false, .. }));

        h.running.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_submission_transport_failure_postpones() {
        let (scheduler, h) = harness(config());
        h.transport.set_fallback(
            "getMineableWork",
            json!({"work_packages": [package(1, "87cURDZ", 10)]}),
        );
        h.transport.push_failure("createPoX");
        h.transport.push("createPoX", json!({}));
        let task = tokio::spawn(scheduler.run());

        h.tx.send(report(SolutionKind::Pow, 1)).await.unwrap();
        let book = h.state.book.clone();
        wait_for(|| book.stats().pow.accepted == 1).await;
        assert_eq!(book.stats().transport_errors, 1);

        h.running.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_refresh_trigger_fetches_early() {
        let (scheduler, h) = harness(config());
        h.transport.set_fallback(
            "getMineableWork",
            json!({"work_packages": [package(1, "87cURDZ", 10)]}),
        );
        let refresh = scheduler.refresh_trigger();
        let task = tokio::spawn(scheduler.run());

        let transport = h.transport.clone();
        wait_for(|| transport.seen_of("getMineableWork").len() == 1).await;
        refresh.notify_one();
        wait_for(|| transport.seen_of("getMineableWork").len() == 2).await;

        h.running.cancel();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn test_forward_solutions_stops_on_freeze() {
        let queue = Arc::new(SolutionQueue::new());
        let (tx, mut rx) = mpsc::channel(4);
        queue.push(report(SolutionKind::Pow, 9)).unwrap();
        queue.freeze();

        forward_solutions(queue, tx, CancellationToken::new());
        assert_eq!(rx.try_recv().unwrap().work_id, 9);
        assert!(rx.try_recv().is_err());
    }
}
