//! Daemon lifecycle management for xel-miner.
//!
//! This module handles the core daemon functionality including initialization,
//! task management, signal handling, and graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::tracing::prelude::*;
use crate::{
    config::Config,
    console,
    coordinator::{Coordinator, FileTransport, HttpConfig, HttpTransport, Transport},
    job::ReferenceCompiler,
    longpoll::LongPollWatcher,
    miner::WorkerPool,
    scheduler::{self, MinerState, Scheduler, SchedulerConfig},
    solution_queue::SolutionQueue,
    submission::SubmissionBook,
    work::{CurrentWork, WorkCatalog, WorkSelector},
};

/// Capacity of the channel between the solution queue and the coordinator loop.
const SOLUTION_CHANNEL: usize = 256;

/// The main daemon.
pub struct Daemon {
    config: Config,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    async fn transport(&self) -> anyhow::Result<Arc<dyn Transport>> {
        let config = &self.config;
        match &config.test_miner {
            Some(path) => {
                info!(path = %path.display(), "Test miner mode: work read from file, nothing sent");
                let transport = FileTransport::open(path)
                    .await
                    .with_context(|| format!("Failed to load test work file {}", path.display()))?;
                Ok(Arc::new(transport))
            }
            None => {
                let (user, pass) = match &config.credentials {
                    Some((user, pass)) => (Some(user.clone()), Some(pass.clone())),
                    None => (None, None),
                };
                let transport = HttpTransport::new(HttpConfig {
                    url: config.url.clone(),
                    user,
                    pass,
                    secret_phrase: config.account.secret_phrase().to_string(),
                    timeout: config.timeout,
                })
                .context("Failed to create HTTP client")?;
                Ok(Arc::new(transport))
            }
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.config.clone();
        info!(public_key = %config.account.public_key_hex(), "Account loaded");

        let coordinator = Coordinator::new(self.transport().await?);

        // Shared state
        let catalog = Arc::new(WorkCatalog::new(Arc::new(ReferenceCompiler)));
        let current = Arc::new(CurrentWork::new(config.threads));
        let queue = Arc::new(SolutionQueue::new());
        let book = Arc::new(SubmissionBook::new(Arc::clone(&catalog)));

        let pool = WorkerPool::spawn(
            Arc::clone(&current),
            Arc::clone(&queue),
            config.account.public_key(),
            config.quiet,
        )
        .context("Failed to start worker threads")?;

        let (solution_tx, solution_rx) = mpsc::channel(SOLUTION_CHANNEL);
        let scheduler = Scheduler::new(
            SchedulerConfig {
                scan_time: config.scan_time,
                retries: config.retries,
                retry_pause: config.retry_pause,
            },
            coordinator.clone(),
            WorkSelector::new(config.preference.clone()),
            MinerState {
                catalog,
                current,
                book,
                monitor: pool.monitor(),
            },
            solution_rx,
            self.shutdown.clone(),
        );
        let refresh = scheduler.refresh_trigger();
        let summary = scheduler.summary_trigger();

        // Solution bridge
        self.tracker.spawn_blocking({
            let queue = Arc::clone(&queue);
            let shutdown = self.shutdown.clone();
            move || scheduler::forward_solutions(queue, solution_tx, shutdown)
        });

        // Coordinator loop
        let (fatal_tx, mut fatal_rx) = oneshot::channel();
        self.tracker.spawn(async move {
            if let Err(e) = scheduler.run().await {
                error!("Coordinator loop error: {}", e);
                let _ = fatal_tx.send(e);
            }
        });

        // Long-poll watcher
        self.tracker.spawn(
            LongPollWatcher::new(
                coordinator,
                refresh,
                config.retry_pause,
                self.shutdown.clone(),
            )
            .run(),
        );

        if config.console {
            if let Err(e) = console::spawn(summary) {
                warn!("Failed to start console monitor: {}", e);
            }
        }

        self.tracker.close();

        info!(
            url = %config.url,
            threads = config.threads,
            preference = %config.preference,
            "Started."
        );
        info!("For debugging, set RUST_LOG=xel_miner=debug or trace.");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        let mut failure = None;
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
            Ok(e) = &mut fatal_rx => {
                failure = Some(e);
            },
        }

        // Initiate shutdown
        self.shutdown.cancel();
        queue.freeze();
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .context("Worker shutdown failed")?;

        // Wait for all tasks to complete
        self.tracker.wait().await;
        info!("Exiting.");

        match failure {
            Some(e) => Err(e).context("Coordinator loop stopped"),
            None => Ok(()),
        }
    }
}
