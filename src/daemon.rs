//! Periodic runs
//!
//! The [`Scheduler`] repeats mirroring runs with a fixed pause in between
//! until a shutdown signal arrives, or stops after the first run in
//! single-run mode. A failed run is logged and the loop carries on.

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::sync::{MirrorEngine, RunSummary};

/// Parse a delay such as `"3600"`, `"90s"`, `"30m"`, `"1h"` or `"2d"` into seconds
pub fn parse_duration(duration_str: &str) -> Option<u64> {
    let duration_str = duration_str.trim().to_lowercase();

    let (value, unit) = if let Some(value) = duration_str.strip_suffix('s') {
        (value, 1)
    } else if let Some(value) = duration_str.strip_suffix('m') {
        (value, 60)
    } else if let Some(value) = duration_str.strip_suffix('h') {
        (value, 3600)
    } else if let Some(value) = duration_str.strip_suffix('d') {
        (value, 86400)
    } else {
        (duration_str.as_str(), 1)
    };

    value.trim().parse::<u64>().ok()?.checked_mul(unit)
}

/// One complete mirroring pass
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run_once(&self) -> Result<RunSummary>;
}

#[async_trait]
impl Runner for MirrorEngine {
    async fn run_once(&self) -> Result<RunSummary> {
        self.run().await
    }
}

/// Totals over the lifetime of a scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub runs: u64,
    pub failed_runs: u64,
    /// A shutdown arrived while a run was in flight and the run was dropped
    pub interrupted: bool,
}

pub struct Scheduler<R: Runner> {
    runner: R,
    delay: Duration,
    single_run: bool,
    shutdown_sender: broadcast::Sender<()>,
}

impl<R: Runner> Scheduler<R> {
    pub fn new(runner: R, delay: Duration, single_run: bool) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            runner,
            delay,
            single_run,
            shutdown_sender,
        }
    }

    /// Sender that stops the loop, dropping a run in flight
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Run until Ctrl+C, or once in single-run mode.
    ///
    /// A single run leaves the default SIGINT behavior in place, so Ctrl+C
    /// terminates the process and every outstanding request with it.
    pub async fn run_until_interrupted(&self) -> SchedulerStats {
        if self.single_run {
            return self.run().await;
        }

        let shutdown_sender = self.shutdown_sender.clone();
        let listener = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received, stopping");
                    let _ = shutdown_sender.send(());
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });

        let stats = self.run().await;
        listener.abort();
        stats
    }

    /// The scheduling loop
    pub async fn run(&self) -> SchedulerStats {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let mut stats = SchedulerStats::default();

        loop {
            debug!("Starting mirror run {}", stats.runs + 1);
            let run_start = Instant::now();
            stats.runs += 1;

            // Listed first so a run that finishes together with a shutdown still counts
            let result = tokio::select! {
                biased;
                result = self.runner.run_once() => result,
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown during run {}, abandoning it", stats.runs);
                    stats.interrupted = true;
                    break;
                }
            };

            match result {
                Ok(summary) => info!(
                    "Run {} finished in {:.2}s ({} failed)",
                    stats.runs,
                    run_start.elapsed().as_secs_f64(),
                    summary.failed
                ),
                Err(e) => {
                    stats.failed_runs += 1;
                    error!("Mirror run failed: {:?}", e);
                }
            }

            if self.single_run {
                debug!("Single run mode, exiting");
                break;
            }

            info!("Next run in {}s", self.delay.as_secs());
            tokio::select! {
                _ = shutdown_receiver.recv() => {
                    info!("Scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        stats
    }
}
