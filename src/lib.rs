//! giteamirror - Mirror GitHub repositories into a Gitea instance
//!
//! giteamirror discovers repositories on GitHub and keeps a pull mirror of each
//! one on Gitea, creating organizations, stars and issue copies as configured.
//!
//! ## Core Features
//!
//! - **Discovery**: owned, private, starred, organization and single repositories
//! - **Filtering**: include/exclude name globs and fork skipping
//! - **Target Resolution**: structure-preserving organizations, a starred
//!   collection organization, or the authenticated user
//! - **Idempotent Reconciliation**: existing mirrors are left untouched
//! - **Dry Run**: log intended changes without mutating Gitea
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, environment overlay and validation
//! - [`discovery`]: Repository collection from the source platform
//! - [`github`]: GitHub API integration
//! - [`gitea`]: Gitea API integration
//! - [`sync`]: Run orchestration with bounded concurrency
//! - [`daemon`]: Periodic runs

pub mod config;
pub mod daemon;
pub mod discovery;
pub mod filter;
pub mod gitea;
pub mod github;
pub mod issues;
pub mod mirror;
pub mod reporter;
pub mod repository;
pub mod sync;
pub mod target;

#[cfg(test)]
mod test_support;

pub use config::{Config, ConfigError};
pub use daemon::Scheduler;
pub use discovery::{Collector, SourceApi, SourceError};
pub use gitea::{GiteaClient, GiteaError, TargetApi, Visibility};
pub use github::GitHubClient;
pub use mirror::{MirrorOutcome, Reconciler};
pub use reporter::{MemoryReporter, MirrorEvent, Reporter, TracingReporter};
pub use repository::{Issue, IssueState, MirrorTarget, Repository};
pub use sync::{MirrorEngine, RunSummary};
pub use target::TargetResolver;
