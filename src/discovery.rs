//! Repository discovery
//!
//! This module collects the candidate repositories from GitHub. Each enabled
//! mode (owned, private, starred, organization) contributes a list; the lists
//! are concatenated in that order, de-duplicated by clone URL and stripped of
//! forks when fork-skipping is on. A single explicit repository short-circuits
//! every other mode.
//!
//! Failures never abort collection: a failing query is reported and
//! contributes nothing.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, GitHubConfig};
use crate::filter::{self, NameFilter};
use crate::reporter::{MirrorEvent, Reporter};
use crate::repository::{Issue, Repository};

/// Errors returned by the source platform
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

/// Where to look up the organizations whose repositories are mirrored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgDiscovery {
    /// Organizations of the token's identity, including private memberships
    AuthenticatedUser,
    /// Public organization memberships of a named user
    PublicMemberships(String),
}

impl fmt::Display for OrgDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrgDiscovery::AuthenticatedUser => f.write_str("organizations of the authenticated user"),
            OrgDiscovery::PublicMemberships(user) => write!(f, "public organizations of {}", user),
        }
    }
}

/// Read-only operations the collector needs from GitHub
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Repositories visible for `username`
    async fn list_user_repositories(&self, username: &str) -> Result<Vec<Repository>, SourceError>;

    /// Private repositories owned by the authenticated identity
    async fn list_private_repositories(&self) -> Result<Vec<Repository>, SourceError>;

    /// Starred repositories of `username`, or of the authenticated identity when `None`
    async fn list_starred_repositories(
        &self,
        username: Option<&str>,
    ) -> Result<Vec<Repository>, SourceError>;

    /// Organization logins found through one discovery strategy
    async fn list_organizations(&self, strategy: &OrgDiscovery) -> Result<Vec<String>, SourceError>;

    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>, SourceError>;

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, SourceError>;

    /// All issues of a repository, open and closed, pull requests excluded,
    /// in source order
    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<Issue>, SourceError>;
}

fn host_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| {
        Regex::new(r"^(?:(?:https?://)?(?:www\.)?github\.com/|git@github\.com:)")
            .expect("static regex is valid")
    })
}

/// Normalize `owner/name`, `https://github.com/owner/name(.git)` or
/// `git@github.com:owner/name.git` into its owner and name
pub fn parse_repository_reference(reference: &str) -> Option<(String, String)> {
    let trimmed = reference.trim();
    let without_host = host_prefix().replace(trimmed, "");
    let path = without_host.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut segments = path.split('/');
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let name = segments.next().filter(|s| !s.is_empty())?;

    Some((owner.to_string(), name.to_string()))
}

/// Keep the first repository seen for every clone URL
pub fn dedup_by_clone_url(repositories: Vec<Repository>) -> Vec<Repository> {
    let mut seen = HashSet::new();
    repositories
        .into_iter()
        .filter(|repo| seen.insert(repo.clone_url.clone()))
        .collect()
}

/// Apply the case-insensitive organization allow/deny lists
pub fn filter_organizations(
    organizations: Vec<String>,
    include: &[String],
    exclude: &[String],
) -> Vec<String> {
    let include: Vec<String> = include.iter().map(|o| o.to_lowercase()).collect();
    let exclude: Vec<String> = exclude.iter().map(|o| o.to_lowercase()).collect();

    organizations
        .into_iter()
        .filter(|org| {
            let lower = org.to_lowercase();
            (include.is_empty() || include.contains(&lower)) && !exclude.contains(&lower)
        })
        .collect()
}

/// Organization discovery strategies, tried in order until one succeeds
pub fn org_discovery_strategies(scope: &GitHubConfig) -> Vec<OrgDiscovery> {
    if scope.use_specific_user {
        vec![OrgDiscovery::PublicMemberships(scope.username.clone())]
    } else {
        vec![
            OrgDiscovery::AuthenticatedUser,
            OrgDiscovery::PublicMemberships(scope.username.clone()),
        ]
    }
}

/// Collects repositories from every enabled mode
pub struct Collector<'a> {
    api: &'a dyn SourceApi,
    scope: &'a GitHubConfig,
    reporter: &'a dyn Reporter,
}

impl<'a> Collector<'a> {
    pub fn new(api: &'a dyn SourceApi, scope: &'a GitHubConfig, reporter: &'a dyn Reporter) -> Self {
        Self { api, scope, reporter }
    }

    /// Gather, de-duplicate and fork-filter the candidate repositories
    pub async fn collect(&self) -> Vec<Repository> {
        if let Some(reference) = &self.scope.single_repo {
            return self.collect_single(reference).await.into_iter().collect();
        }

        let mut all = Vec::new();

        all.extend(
            self.gather("public", self.api.list_user_repositories(&self.scope.username))
                .await,
        );

        if self.scope.private_repositories {
            let private = self
                .gather("private", self.api.list_private_repositories())
                .await;
            all.extend(private.into_iter().map(Repository::from_private_listing));
        }

        if self.scope.mirror_starred {
            let user = self
                .scope
                .use_specific_user
                .then_some(self.scope.username.as_str());
            let starred = self
                .gather("starred", self.api.list_starred_repositories(user))
                .await;
            all.extend(starred.into_iter().map(Repository::starred));
        }

        if self.scope.mirror_organizations {
            all.extend(self.collect_organizations().await);
        }

        let repositories = dedup_by_clone_url(all);

        if !self.scope.skip_forks {
            return repositories;
        }

        let before = repositories.len();
        let repositories = filter::without_forks(repositories);
        self.reporter.info(MirrorEvent::ForksSkipped {
            count: before - repositories.len(),
        });
        repositories
    }

    async fn collect_single(&self, reference: &str) -> Option<Repository> {
        let Some((owner, name)) = parse_repository_reference(reference) else {
            self.reporter.error(MirrorEvent::InvalidReference {
                reference: reference.to_string(),
            });
            return None;
        };

        match self.api.get_repository(&owner, &name).await {
            Ok(repo) => {
                self.reporter.info(MirrorEvent::Discovered {
                    source: "single".to_string(),
                    count: 1,
                });
                Some(repo)
            }
            Err(e) => {
                self.reporter.error(MirrorEvent::DiscoveryFailed {
                    source: format!("repository {}/{}", owner, name),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn collect_organizations(&self) -> Vec<Repository> {
        let Some(organizations) = self.discover_organizations().await else {
            return Vec::new();
        };

        let organizations = filter_organizations(
            organizations,
            &self.scope.include_orgs,
            &self.scope.exclude_orgs,
        );
        debug!("Mirroring organizations: {:?}", organizations);

        let mut repositories = Vec::new();
        for org in organizations {
            let found = self
                .gather(
                    &format!("organization {}", org),
                    self.api.list_organization_repositories(&org),
                )
                .await;

            if self.scope.preserve_org_structure {
                repositories.extend(found.into_iter().map(|repo| repo.in_organization(org.clone())));
            } else {
                repositories.extend(found);
            }
        }

        repositories
    }

    async fn discover_organizations(&self) -> Option<Vec<String>> {
        for strategy in org_discovery_strategies(self.scope) {
            match self.api.list_organizations(&strategy).await {
                Ok(organizations) => {
                    debug!("Found {} organizations via {}", organizations.len(), strategy);
                    return Some(organizations);
                }
                Err(e) => {
                    self.reporter.error(MirrorEvent::DiscoveryFailed {
                        source: strategy.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        None
    }

    async fn gather<F>(&self, source: &str, query: F) -> Vec<Repository>
    where
        F: std::future::Future<Output = Result<Vec<Repository>, SourceError>>,
    {
        match query.await {
            Ok(repositories) => {
                self.reporter.info(MirrorEvent::Discovered {
                    source: source.to_string(),
                    count: repositories.len(),
                });
                repositories
            }
            Err(e) => {
                self.reporter.error(MirrorEvent::DiscoveryFailed {
                    source: format!("{} repositories", source),
                    error: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}

/// Collect and name-filter: the full list of repositories a run will reconcile
pub async fn discover(
    api: &dyn SourceApi,
    config: &Config,
    reporter: &dyn Reporter,
) -> Vec<Repository> {
    let collected = Collector::new(api, &config.github, reporter).collect().await;
    let before = collected.len();

    let filtered = NameFilter::new(&config.include, &config.exclude).apply(collected);
    reporter.info(MirrorEvent::Filtered {
        before,
        after: filtered.len(),
    });

    filtered
}
