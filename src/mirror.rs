//! Mirror reconciliation
//!
//! Brings one repository's mirror into the desired state: probe the target,
//! create a pull mirror when absent, star it when the source was starred and
//! copy issues on first creation. Errors never leave [`Reconciler::reconcile`];
//! they are reported and folded into the returned [`MirrorOutcome`].

use std::sync::Arc;
use tracing::debug;

use crate::discovery::SourceApi;
use crate::gitea::{MigrateRequest, TargetApi};
use crate::issues::IssueMirror;
use crate::reporter::{MirrorEvent, Reporter};
use crate::repository::{MirrorTarget, Repository};

/// What happened to one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// A new mirror was created; `starred` is whether starring it succeeded
    Mirrored { starred: bool },
    AlreadyMirrored,
    /// The mirror existed and was (re-)starred
    Starred,
    /// Nothing changed because of dry-run
    DryRun,
    Failed(String),
}

impl MirrorOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, MirrorOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileSettings {
    /// Token handed to the target so it can pull private sources
    pub github_token: Option<String>,
    pub mirror_issues: bool,
    pub skip_starred_issues: bool,
    pub dry_run: bool,
}

pub struct Reconciler {
    source: Arc<dyn SourceApi>,
    target: Arc<dyn TargetApi>,
    reporter: Arc<dyn Reporter>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn SourceApi>,
        target: Arc<dyn TargetApi>,
        reporter: Arc<dyn Reporter>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            source,
            target,
            reporter,
            settings,
        }
    }

    pub async fn reconcile(&self, repository: &Repository, mirror: &MirrorTarget) -> MirrorOutcome {
        let exists = match self
            .target
            .repository_exists(&mirror.name, &repository.name)
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                self.reporter.error(MirrorEvent::ProbeFailed {
                    repository: repository.full_name.clone(),
                    error: e.to_string(),
                });
                return MirrorOutcome::Failed(e.to_string());
            }
        };

        if exists {
            return self.reconcile_existing(repository, mirror).await;
        }

        if self.settings.dry_run {
            self.reporter.info(MirrorEvent::WouldMirror {
                repository: repository.full_name.clone(),
                target: mirror.name.clone(),
                star: repository.is_starred(),
            });
            return MirrorOutcome::DryRun;
        }

        if let Err(e) = self.target.migrate_repository(&self.migrate_request(repository, mirror)).await {
            self.reporter.error(MirrorEvent::MirrorFailed {
                repository: repository.full_name.clone(),
                error: e.to_string(),
            });
            return MirrorOutcome::Failed(e.to_string());
        }

        self.reporter.info(MirrorEvent::Mirrored {
            repository: repository.full_name.clone(),
            target: mirror.name.clone(),
        });

        let starred = repository.is_starred() && self.star(repository, mirror).await;

        if self.should_mirror_issues(repository) {
            IssueMirror::new(
                self.source.as_ref(),
                self.target.as_ref(),
                self.reporter.as_ref(),
                repository,
                mirror,
            )
            .run()
            .await;
        }

        MirrorOutcome::Mirrored { starred }
    }

    async fn reconcile_existing(&self, repository: &Repository, mirror: &MirrorTarget) -> MirrorOutcome {
        if !repository.is_starred() {
            self.reporter.info(MirrorEvent::AlreadyMirrored {
                repository: repository.full_name.clone(),
                target: mirror.name.clone(),
            });
            return MirrorOutcome::AlreadyMirrored;
        }

        if self.settings.dry_run {
            self.reporter.info(MirrorEvent::WouldStar {
                repository: repository.full_name.clone(),
                target: mirror.name.clone(),
            });
            return MirrorOutcome::DryRun;
        }

        if self.star(repository, mirror).await {
            MirrorOutcome::Starred
        } else {
            MirrorOutcome::AlreadyMirrored
        }
    }

    fn migrate_request(&self, repository: &Repository, mirror: &MirrorTarget) -> MigrateRequest {
        MigrateRequest {
            auth_token: self.settings.github_token.clone(),
            clone_addr: repository.clone_url.clone(),
            mirror: true,
            repo_name: repository.name.clone(),
            uid: mirror.id,
            private: repository.is_private,
        }
    }

    /// Star failures are reported but never fail the repository
    async fn star(&self, repository: &Repository, mirror: &MirrorTarget) -> bool {
        match self.target.star_repository(&mirror.name, &repository.name).await {
            Ok(()) => {
                self.reporter.info(MirrorEvent::Starred {
                    repository: repository.full_name.clone(),
                    target: mirror.name.clone(),
                });
                true
            }
            Err(e) => {
                self.reporter.error(MirrorEvent::StarFailed {
                    repository: repository.full_name.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn should_mirror_issues(&self, repository: &Repository) -> bool {
        let wanted = self.settings.mirror_issues
            && repository.has_issues
            && !self.settings.dry_run
            && !(repository.is_starred() && self.settings.skip_starred_issues);

        if !wanted {
            debug!("Skipping issues for {}", repository.full_name);
        }
        wanted
    }
}
