//! Run events and the sink they are reported to.
//!
//! Engine components never log their outcomes directly; they hand a
//! [`MirrorEvent`] to the injected [`Reporter`]. The binary wires in
//! [`TracingReporter`], tests use [`MemoryReporter`] to assert on what happened.

use std::fmt;
use std::sync::Mutex;

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// A discovery mode produced repositories
    Discovered { source: String, count: usize },
    /// A discovery query failed and contributed nothing
    DiscoveryFailed { source: String, error: String },
    /// The single-repository reference could not be parsed
    InvalidReference { reference: String },
    /// Forks dropped from the de-duplicated candidates
    ForksSkipped { count: usize },
    /// Result of include/exclude name filtering
    Filtered { before: usize, after: usize },
    OrganizationCreated { organization: String },
    WouldCreateOrganization { organization: String },
    /// Target organization could not be resolved, the user namespace is used
    TargetFallback { repository: String, organization: String, error: String },
    AlreadyMirrored { repository: String, target: String },
    WouldMirror { repository: String, target: String, star: bool },
    WouldStar { repository: String, target: String },
    Mirrored { repository: String, target: String },
    MirrorFailed { repository: String, error: String },
    /// The existence probe failed with something other than "not found"
    ProbeFailed { repository: String, error: String },
    Starred { repository: String, target: String },
    StarFailed { repository: String, error: String },
    IssuesFetchFailed { repository: String, error: String },
    IssueFailed { repository: String, number: u64, error: String },
    LabelFailed { repository: String, label: String, error: String },
    IssuesMirrored { repository: String, created: usize, failed: usize },
}

impl MirrorEvent {
    /// Short machine-friendly name, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorEvent::Discovered { .. } => "discovered",
            MirrorEvent::DiscoveryFailed { .. } => "discovery_failed",
            MirrorEvent::InvalidReference { .. } => "invalid_reference",
            MirrorEvent::ForksSkipped { .. } => "forks_skipped",
            MirrorEvent::Filtered { .. } => "filtered",
            MirrorEvent::OrganizationCreated { .. } => "organization_created",
            MirrorEvent::WouldCreateOrganization { .. } => "would_create_organization",
            MirrorEvent::TargetFallback { .. } => "target_fallback",
            MirrorEvent::AlreadyMirrored { .. } => "already_mirrored",
            MirrorEvent::WouldMirror { .. } => "would_mirror",
            MirrorEvent::WouldStar { .. } => "would_star",
            MirrorEvent::Mirrored { .. } => "mirrored",
            MirrorEvent::MirrorFailed { .. } => "mirror_failed",
            MirrorEvent::ProbeFailed { .. } => "probe_failed",
            MirrorEvent::Starred { .. } => "starred",
            MirrorEvent::StarFailed { .. } => "star_failed",
            MirrorEvent::IssuesFetchFailed { .. } => "issues_fetch_failed",
            MirrorEvent::IssueFailed { .. } => "issue_failed",
            MirrorEvent::LabelFailed { .. } => "label_failed",
            MirrorEvent::IssuesMirrored { .. } => "issues_mirrored",
        }
    }
}

impl fmt::Display for MirrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorEvent::Discovered { source, count } => {
                write!(f, "Found {} {} repositories on GitHub", count, source)
            }
            MirrorEvent::DiscoveryFailed { source, error } => {
                write!(f, "Failed to fetch {}: {}", source, error)
            }
            MirrorEvent::InvalidReference { reference } => {
                write!(f, "Invalid repository reference '{}', expected owner/name or a GitHub URL", reference)
            }
            MirrorEvent::ForksSkipped { count } => write!(f, "Skipped {} forks", count),
            MirrorEvent::Filtered { before, after } => {
                write!(f, "Filtered {} repositories down to {}", before, after)
            }
            MirrorEvent::OrganizationCreated { organization } => {
                write!(f, "Created organization {} on Gitea", organization)
            }
            MirrorEvent::WouldCreateOrganization { organization } => {
                write!(f, "DRY RUN: Would create organization {} on Gitea", organization)
            }
            MirrorEvent::TargetFallback { repository, organization, error } => write!(
                f,
                "Could not resolve organization {} for {}, mirroring to user instead: {}",
                organization, repository, error
            ),
            MirrorEvent::AlreadyMirrored { repository, target } => {
                write!(f, "Repository {} is already mirrored to {}; doing nothing", repository, target)
            }
            MirrorEvent::WouldMirror { repository, target, star } => {
                if *star {
                    write!(f, "DRY RUN: Would mirror and star repository {} in {}", repository, target)
                } else {
                    write!(f, "DRY RUN: Would mirror repository {} to {}", repository, target)
                }
            }
            MirrorEvent::WouldStar { repository, target } => {
                write!(f, "DRY RUN: Would star repository {} in {}", repository, target)
            }
            MirrorEvent::Mirrored { repository, target } => {
                write!(f, "Mirrored repository {} to {}", repository, target)
            }
            MirrorEvent::MirrorFailed { repository, error } => {
                write!(f, "Failed to mirror repository {}: {}", repository, error)
            }
            MirrorEvent::ProbeFailed { repository, error } => write!(
                f,
                "Could not check whether {} is already mirrored, skipping this run: {}",
                repository, error
            ),
            MirrorEvent::Starred { repository, target } => {
                write!(f, "Starred repository {} in {}", repository, target)
            }
            MirrorEvent::StarFailed { repository, error } => {
                write!(f, "Failed to star repository {}: {}", repository, error)
            }
            MirrorEvent::IssuesFetchFailed { repository, error } => {
                write!(f, "Failed to fetch issues for {}: {}", repository, error)
            }
            MirrorEvent::IssueFailed { repository, number, error } => {
                write!(f, "Failed to mirror issue #{} of {}: {}", number, repository, error)
            }
            MirrorEvent::LabelFailed { repository, label, error } => {
                write!(f, "Failed to apply label '{}' in {}: {}", label, repository, error)
            }
            MirrorEvent::IssuesMirrored { repository, created, failed } => write!(
                f,
                "Mirrored {} issues for {} ({} failed)",
                created, repository, failed
            ),
        }
    }
}

/// Sink for run events
pub trait Reporter: Send + Sync {
    fn info(&self, event: MirrorEvent);
    fn error(&self, event: MirrorEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, event: MirrorEvent) {
        tracing::info!(event = event.kind(), "{}", event);
    }

    fn error(&self, event: MirrorEvent) {
        tracing::error!(event = event.kind(), "{}", event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<(Level, MirrorEvent)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Level, MirrorEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<MirrorEvent> {
        self.events()
            .into_iter()
            .filter(|(level, _)| *level == Level::Error)
            .map(|(_, event)| event)
            .collect()
    }

    /// Number of recorded events with the given [`MirrorEvent::kind`]
    pub fn count(&self, kind: &str) -> usize {
        self.events()
            .iter()
            .filter(|(_, event)| event.kind() == kind)
            .count()
    }

    fn push(&self, level: Level, event: MirrorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((level, event));
        }
    }
}

impl Reporter for MemoryReporter {
    fn info(&self, event: MirrorEvent) {
        self.push(Level::Info, event);
    }

    fn error(&self, event: MirrorEvent) {
        self.push(Level::Error, event);
    }
}
