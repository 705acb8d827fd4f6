//! Value types shared by discovery, target resolution and mirroring.
//!
//! Everything here is constructed once per run and never mutated afterwards.
//! Discovery tags are applied with consuming builder methods at construction
//! time, so a [`Repository`] that has left the collector is immutable.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A source repository as seen by the mirroring engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    /// Repository name, unique within its owner
    pub name: String,

    /// HTTPS clone URL; the identity used for de-duplication
    pub clone_url: String,

    pub is_private: bool,

    pub is_fork: bool,

    /// Login of the owning account or organization on GitHub
    pub owner: String,

    /// `owner/name`
    pub full_name: String,

    /// Whether the issue tracker is enabled on the source
    pub has_issues: bool,

    organization: Option<String>,
    starred: bool,
    from_private_listing: bool,
}

/// Where a repository came from, as far as target resolution cares.
///
/// Organization membership wins over starring, starring over the private
/// listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance<'a> {
    Owned,
    Private,
    Starred,
    OrgMember(&'a str),
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            full_name: format!("{}/{}", owner, name),
            name,
            clone_url: clone_url.into(),
            is_private: false,
            is_fork: false,
            owner,
            has_issues: false,
            organization: None,
            starred: false,
            from_private_listing: false,
        }
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn fork(mut self, is_fork: bool) -> Self {
        self.is_fork = is_fork;
        self
    }

    pub fn with_issues(mut self, has_issues: bool) -> Self {
        self.has_issues = has_issues;
        self
    }

    /// Tag the repository with the source organization it was discovered under
    pub fn in_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Tag the repository as discovered through the starred listing
    pub fn starred(mut self) -> Self {
        self.starred = true;
        self
    }

    /// Tag the repository as discovered through the authenticated private listing
    pub fn from_private_listing(mut self) -> Self {
        self.from_private_listing = true;
        self
    }

    /// Source organization, present only when structure preservation is active
    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn is_starred(&self) -> bool {
        self.starred
    }

    pub fn provenance(&self) -> Provenance<'_> {
        match (&self.organization, self.starred, self.from_private_listing) {
            (Some(org), _, _) => Provenance::OrgMember(org),
            (None, true, _) => Provenance::Starred,
            (None, false, true) => Provenance::Private,
            (None, false, false) => Provenance::Owned,
        }
    }
}

/// Kind of namespace that owns a mirror on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    User,
    Organization,
}

/// Destination namespace on the Gitea instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorTarget {
    /// Gitea-assigned id, sent as `uid` when migrating
    pub id: i64,

    /// User login or organization name
    pub name: String,

    pub kind: TargetKind,
}

impl MirrorTarget {
    pub fn user(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: TargetKind::User,
        }
    }

    pub fn organization(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: TargetKind::Organization,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// A source issue being copied to the mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub author_login: String,
}
