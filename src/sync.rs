//! Mirror Engine - Orchestrates one mirroring run
//!
//! A run authenticates against Gitea, discovers and filters the GitHub
//! repositories, then resolves a target and reconciles every repository with
//! a bounded number of repositories in flight. Per-repository failures are
//! reported and counted; only an unreachable Gitea user endpoint fails the run.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::Config;
use crate::discovery::{self, SourceApi};
use crate::gitea::{GiteaClient, TargetApi};
use crate::github::GitHubClient;
use crate::mirror::{MirrorOutcome, ReconcileSettings, Reconciler};
use crate::reporter::{Reporter, TracingReporter};
use crate::repository::Repository;
use crate::target::{TargetResolver, TargetSettings};

/// Counts from a complete run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_repositories: usize,
    pub mirrored: usize,
    pub already_mirrored: usize,
    pub starred: usize,
    pub dry_run: usize,
    pub failed: usize,
    pub duration: Duration,
    /// Outcome per repository full name, in completion order
    pub outcomes: Vec<(String, MirrorOutcome)>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} repositories in {:.2}s: {} mirrored, {} already mirrored, {} starred, {} dry-run, {} failed",
            self.total_repositories,
            self.duration.as_secs_f64(),
            self.mirrored,
            self.already_mirrored,
            self.starred,
            self.dry_run,
            self.failed
        )
    }
}

/// Tally outcomes into a summary
pub fn compile_summary(outcomes: Vec<(String, MirrorOutcome)>, duration: Duration) -> RunSummary {
    let mut summary = RunSummary {
        total_repositories: outcomes.len(),
        duration,
        ..Default::default()
    };

    for (_, outcome) in &outcomes {
        match outcome {
            MirrorOutcome::Mirrored { starred } => {
                summary.mirrored += 1;
                if *starred {
                    summary.starred += 1;
                }
            }
            MirrorOutcome::AlreadyMirrored => summary.already_mirrored += 1,
            MirrorOutcome::Starred => summary.starred += 1,
            MirrorOutcome::DryRun => summary.dry_run += 1,
            MirrorOutcome::Failed(_) => summary.failed += 1,
        }
    }

    summary.outcomes = outcomes;
    summary
}

/// Drive `task` over every item with at most `limit` futures in flight.
/// Results come back in completion order.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut futures = FuturesUnordered::new();

    for item in items {
        let semaphore = semaphore.clone();
        let future = task(item);

        futures.push(async move {
            // The semaphore is never closed, so acquiring only waits
            let _permit = semaphore.acquire().await.ok();
            future.await
        });
    }

    let mut results = Vec::new();
    while let Some(result) = futures.next().await {
        results.push(result);
    }
    results
}

/// The engine that wires discovery, resolution and reconciliation together
#[derive(Clone)]
pub struct MirrorEngine {
    config: Arc<Config>,
    source: Arc<dyn SourceApi>,
    target: Arc<dyn TargetApi>,
    reporter: Arc<dyn Reporter>,
}

impl MirrorEngine {
    /// Create an engine talking to the configured GitHub and Gitea instances
    pub fn new(config: Config) -> Result<Self> {
        let github = GitHubClient::new(&config.github)?;
        let gitea = GiteaClient::new(&config.gitea.url, &config.gitea.token)
            .context("Failed to create Gitea client")?;

        Ok(Self::with_clients(
            config,
            Arc::new(github),
            Arc::new(gitea),
            Arc::new(TracingReporter),
        ))
    }

    pub fn with_clients(
        config: Config,
        source: Arc<dyn SourceApi>,
        target: Arc<dyn TargetApi>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            target,
            reporter,
        }
    }

    /// Collect and filter the repositories a run would reconcile
    pub async fn discover(&self) -> Vec<Repository> {
        discovery::discover(self.source.as_ref(), &self.config, self.reporter.as_ref()).await
    }

    /// Run one complete mirroring pass
    pub async fn run(&self) -> Result<RunSummary> {
        let start_time = Instant::now();

        if self.config.dry_run {
            info!("Dry run: no changes will be made on {}", self.config.gitea.url);
        }

        let user = self
            .target
            .current_user()
            .await
            .context("Failed to get Gitea user information. Check your Gitea URL and token.")?;
        debug!("Mirroring as Gitea user {} (id {})", user.name, user.id);

        let repositories = self.discover().await;
        info!("Reconciling {} repositories", repositories.len());

        let resolver = Arc::new(TargetResolver::new(
            self.target.clone(),
            self.reporter.clone(),
            user,
            self.target_settings(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            self.source.clone(),
            self.target.clone(),
            self.reporter.clone(),
            self.reconcile_settings(),
        ));

        let outcomes = run_bounded(repositories, self.config.sync.max_parallel, |repository| {
            let resolver = resolver.clone();
            let reconciler = reconciler.clone();
            async move {
                let target = resolver.resolve_target(&repository).await;
                let outcome = reconciler.reconcile(&repository, &target).await;
                debug!("{} -> {}: {:?}", repository.full_name, target.name, outcome);
                (repository.full_name, outcome)
            }
        })
        .await;

        let summary = compile_summary(outcomes, start_time.elapsed());
        info!("Mirror run completed: {}", summary);

        Ok(summary)
    }

    fn target_settings(&self) -> TargetSettings {
        TargetSettings {
            default_organization: self.config.gitea.organization.clone(),
            starred_organization: self.config.gitea.starred_organization.clone(),
            visibility: self.config.gitea.visibility,
            dry_run: self.config.dry_run,
        }
    }

    fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            github_token: self.config.github.token.clone(),
            mirror_issues: self.config.github.mirror_issues,
            skip_starred_issues: self.config.github.skip_starred_issues,
            dry_run: self.config.dry_run,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
