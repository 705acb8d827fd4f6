//! Issue replication
//!
//! Copies every source issue of a freshly created mirror, in source order,
//! with an attribution line prepended to the body. Labels are created on the
//! mirror on demand and attached after each issue is created. Every issue and
//! label is best-effort: a failure is reported and the next item continues.

use std::collections::HashMap;
use tracing::debug;

use crate::discovery::SourceApi;
use crate::gitea::{CreateIssue, TargetApi};
use crate::reporter::{MirrorEvent, Reporter};
use crate::repository::{Issue, IssueState, MirrorTarget, Repository};

/// Color for labels created on the mirror
pub const LABEL_COLOR: &str = "#ededed";

/// Counts for one repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueReport {
    pub created: usize,
    pub failed: usize,
}

/// Issue body with original author and date attribution
pub fn format_issue_body(issue: &Issue) -> String {
    let attribution = format!(
        "*Originally created by @{} on {}*",
        issue.author_login,
        issue.created_at.format("%Y-%m-%d")
    );

    if issue.body.trim().is_empty() {
        attribution
    } else {
        format!("{}\n\n{}", attribution, issue.body)
    }
}

pub fn to_create_issue(issue: &Issue) -> CreateIssue {
    CreateIssue {
        title: issue.title.clone(),
        body: format_issue_body(issue),
        state: issue.state,
        closed: issue.state == IssueState::Closed,
    }
}

/// Replicates issues of one repository into its mirror
pub struct IssueMirror<'a> {
    source: &'a dyn SourceApi,
    target: &'a dyn TargetApi,
    reporter: &'a dyn Reporter,
    repository: &'a Repository,
    owner: &'a str,
    /// Label name to id on the mirror
    labels: HashMap<String, i64>,
}

impl<'a> IssueMirror<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        target: &'a dyn TargetApi,
        reporter: &'a dyn Reporter,
        repository: &'a Repository,
        mirror: &'a MirrorTarget,
    ) -> Self {
        Self {
            source,
            target,
            reporter,
            repository,
            owner: &mirror.name,
            labels: HashMap::new(),
        }
    }

    pub async fn run(mut self) -> IssueReport {
        let mut report = IssueReport::default();

        let issues = match self
            .source
            .list_issues(&self.repository.owner, &self.repository.name)
            .await
        {
            Ok(issues) => issues,
            Err(e) => {
                self.reporter.error(MirrorEvent::IssuesFetchFailed {
                    repository: self.repository.full_name.clone(),
                    error: e.to_string(),
                });
                return report;
            }
        };

        if issues.is_empty() {
            debug!("No issues to mirror for {}", self.repository.full_name);
            return report;
        }

        self.load_labels().await;

        for issue in &issues {
            if self.mirror_issue(issue).await {
                report.created += 1;
            } else {
                report.failed += 1;
            }
        }

        self.reporter.info(MirrorEvent::IssuesMirrored {
            repository: self.repository.full_name.clone(),
            created: report.created,
            failed: report.failed,
        });

        report
    }

    async fn load_labels(&mut self) {
        match self.target.list_labels(self.owner, &self.repository.name).await {
            Ok(labels) => {
                self.labels = labels.into_iter().map(|l| (l.name, l.id)).collect();
            }
            Err(e) => debug!(
                "Could not list labels of {}/{}: {}",
                self.owner, self.repository.name, e
            ),
        }
    }

    async fn mirror_issue(&mut self, issue: &Issue) -> bool {
        let number = match self
            .target
            .create_issue(self.owner, &self.repository.name, &to_create_issue(issue))
            .await
        {
            Ok(number) => number,
            Err(e) => {
                self.reporter.error(MirrorEvent::IssueFailed {
                    repository: self.repository.full_name.clone(),
                    number: issue.number,
                    error: e.to_string(),
                });
                return false;
            }
        };

        let mut label_ids = Vec::with_capacity(issue.labels.len());
        for name in &issue.labels {
            if let Some(id) = self.ensure_label(name).await {
                label_ids.push(id);
            }
        }

        if !label_ids.is_empty() {
            if let Err(e) = self
                .target
                .add_issue_labels(self.owner, &self.repository.name, number, &label_ids)
                .await
            {
                self.reporter.error(MirrorEvent::LabelFailed {
                    repository: self.repository.full_name.clone(),
                    label: issue.labels.join(", "),
                    error: e.to_string(),
                });
            }
        }

        true
    }

    /// Id of the label on the mirror, creating it when unknown
    async fn ensure_label(&mut self, name: &str) -> Option<i64> {
        if let Some(id) = self.labels.get(name) {
            return Some(*id);
        }

        let result = self
            .target
            .create_label(self.owner, &self.repository.name, name, LABEL_COLOR)
            .await;

        match result {
            Ok(label) => {
                self.labels.insert(label.name, label.id);
                Some(label.id)
            }
            Err(e) if e.is_conflict() => {
                self.load_labels().await;
                let id = self.labels.get(name).copied();
                if id.is_none() {
                    self.report_label_failure(name, &e.to_string());
                }
                id
            }
            Err(e) => {
                self.report_label_failure(name, &e.to_string());
                None
            }
        }
    }

    fn report_label_failure(&self, label: &str, error: &str) {
        self.reporter.error(MirrorEvent::LabelFailed {
            repository: self.repository.full_name.clone(),
            label: label.to_string(),
            error: error.to_string(),
        });
    }
}
