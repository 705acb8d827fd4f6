//! Target resolution
//!
//! Decides which Gitea namespace owns the mirror of each repository:
//!
//! 1. the mirror of the repository's source organization (structure preservation),
//! 2. the starred-collection organization for starred repositories,
//! 3. the configured default organization,
//! 4. the authenticated user.
//!
//! Organizations are fetched, or created when missing, once per run. The cache
//! holds one `OnceCell` per organization name, so concurrent repositories
//! resolving the same new organization wait for a single creation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::gitea::{GiteaError, TargetApi, Visibility};
use crate::reporter::{MirrorEvent, Reporter};
use crate::repository::{MirrorTarget, Provenance, Repository};

/// Organization settings that drive resolution
#[derive(Debug, Clone, Default)]
pub struct TargetSettings {
    pub default_organization: Option<String>,
    pub starred_organization: Option<String>,
    pub visibility: Visibility,
    pub dry_run: bool,
}

/// Run-scoped resolver with memoized organizations
pub struct TargetResolver {
    api: Arc<dyn TargetApi>,
    reporter: Arc<dyn Reporter>,
    user: MirrorTarget,
    settings: TargetSettings,
    organizations: Mutex<HashMap<String, Arc<OnceCell<MirrorTarget>>>>,
}

impl TargetResolver {
    pub fn new(
        api: Arc<dyn TargetApi>,
        reporter: Arc<dyn Reporter>,
        user: MirrorTarget,
        settings: TargetSettings,
    ) -> Self {
        Self {
            api,
            reporter,
            user,
            settings,
            organizations: Mutex::new(HashMap::new()),
        }
    }

    pub fn user(&self) -> &MirrorTarget {
        &self.user
    }

    /// Name of the organization a repository belongs in, if any
    pub fn organization_for<'r>(&'r self, repository: &'r Repository) -> Option<&'r str> {
        match repository.provenance() {
            Provenance::OrgMember(org) => Some(org),
            Provenance::Starred if self.settings.starred_organization.is_some() => {
                self.settings.starred_organization.as_deref()
            }
            _ => self.settings.default_organization.as_deref(),
        }
    }

    /// Resolve the namespace for a repository. Never fails: resolution errors
    /// are reported and the user namespace is returned instead.
    pub async fn resolve_target(&self, repository: &Repository) -> MirrorTarget {
        let Some(organization) = self.organization_for(repository) else {
            return self.user.clone();
        };

        match self.resolve_organization(organization).await {
            Ok(target) => target,
            Err(e) => {
                self.reporter.error(MirrorEvent::TargetFallback {
                    repository: repository.full_name.clone(),
                    organization: organization.to_string(),
                    error: e.to_string(),
                });
                self.user.clone()
            }
        }
    }

    async fn resolve_organization(&self, name: &str) -> Result<MirrorTarget, GiteaError> {
        let cell = {
            let mut organizations = self.organizations.lock().await;
            organizations
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        // Failed initializations leave the cell empty so a later repository retries
        cell.get_or_try_init(|| self.fetch_or_create(name))
            .await
            .cloned()
    }

    async fn fetch_or_create(&self, name: &str) -> Result<MirrorTarget, GiteaError> {
        match self.api.get_organization(name).await {
            Ok(org) => {
                debug!("Using existing organization {} (id {})", org.name, org.id);
                return Ok(org);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if self.settings.dry_run {
            self.reporter.info(MirrorEvent::WouldCreateOrganization {
                organization: name.to_string(),
            });
            return Ok(MirrorTarget::organization(0, name));
        }

        match self.api.create_organization(name, self.settings.visibility).await {
            Ok(org) => {
                self.reporter.info(MirrorEvent::OrganizationCreated {
                    organization: name.to_string(),
                });
                Ok(org)
            }
            Err(e) if e.is_conflict() => {
                debug!("Organization {} was created concurrently, fetching it", name);
                self.api.get_organization(name).await
            }
            Err(e) => Err(e),
        }
    }
}
