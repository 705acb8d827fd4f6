//! In-memory GitHub and Gitea doubles for unit tests

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::discovery::{OrgDiscovery, SourceApi, SourceError};
use crate::gitea::{CreateIssue, GiteaError, Label, MigrateRequest, TargetApi, Visibility};
use crate::repository::{Issue, IssueState, MirrorTarget, Repository};

pub fn repo(owner: &str, name: &str) -> Repository {
    Repository::new(owner, name, format!("https://github.com/{}/{}.git", owner, name))
}

pub fn issue(number: u64, title: &str, state: IssueState, labels: &[&str]) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: String::new(),
        state,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        created_at: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
        author_login: "octocat".to_string(),
    }
}

fn status(status: u16) -> GiteaError {
    GiteaError::Status {
        status,
        message: format!("status {}", status),
    }
}

#[derive(Default)]
pub struct FakeSource {
    user_repos: Vec<Repository>,
    private_repos: Vec<Repository>,
    starred_repos: Vec<Repository>,
    organizations: Vec<String>,
    failing_authenticated_orgs: bool,
    org_repos: HashMap<String, Vec<Repository>>,
    single: Option<Repository>,
    issues: HashMap<String, Vec<Issue>>,
    failing_issues: bool,
    calls: Mutex<Vec<String>>,
    strategies: Mutex<Vec<OrgDiscovery>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_repos(mut self, repos: Vec<Repository>) -> Self {
        self.user_repos = repos;
        self
    }

    pub fn with_private_repos(mut self, repos: Vec<Repository>) -> Self {
        self.private_repos = repos;
        self
    }

    pub fn with_starred_repos(mut self, repos: Vec<Repository>) -> Self {
        self.starred_repos = repos;
        self
    }

    pub fn with_organizations(mut self, organizations: Vec<&str>) -> Self {
        self.organizations = organizations.into_iter().map(String::from).collect();
        self
    }

    pub fn failing_authenticated_orgs(mut self) -> Self {
        self.failing_authenticated_orgs = true;
        self
    }

    pub fn with_org_repos(mut self, org: &str, repos: Vec<Repository>) -> Self {
        self.org_repos.insert(org.to_string(), repos);
        self
    }

    pub fn with_single(mut self, repository: Repository) -> Self {
        self.single = Some(repository);
        self
    }

    pub fn with_issues(mut self, full_name: &str, issues: Vec<Issue>) -> Self {
        self.issues.insert(full_name.to_string(), issues);
        self
    }

    pub fn failing_issues(mut self) -> Self {
        self.failing_issues = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn org_strategies_tried(&self) -> Vec<OrgDiscovery> {
        self.strategies.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn list_user_repositories(&self, username: &str) -> Result<Vec<Repository>, SourceError> {
        self.record(format!("list_user_repositories {}", username));
        Ok(self.user_repos.clone())
    }

    async fn list_private_repositories(&self) -> Result<Vec<Repository>, SourceError> {
        self.record("list_private_repositories".to_string());
        Ok(self.private_repos.clone())
    }

    async fn list_starred_repositories(
        &self,
        username: Option<&str>,
    ) -> Result<Vec<Repository>, SourceError> {
        self.record(format!("list_starred_repositories {:?}", username));
        Ok(self.starred_repos.clone())
    }

    async fn list_organizations(&self, strategy: &OrgDiscovery) -> Result<Vec<String>, SourceError> {
        self.record(format!("list_organizations {}", strategy));
        self.strategies.lock().unwrap().push(strategy.clone());

        if self.failing_authenticated_orgs && *strategy == OrgDiscovery::AuthenticatedUser {
            return Err(SourceError::Forbidden("resource not accessible".to_string()));
        }
        Ok(self.organizations.clone())
    }

    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>, SourceError> {
        self.record(format!("list_organization_repositories {}", org));
        self.org_repos
            .get(org)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("organization {}", org)))
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, SourceError> {
        self.record(format!("get_repository {}/{}", owner, name));
        self.single
            .clone()
            .filter(|r| r.owner == owner && r.name == name)
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", owner, name)))
    }

    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<Issue>, SourceError> {
        let full_name = format!("{}/{}", owner, name);
        self.record(format!("list_issues {}", full_name));

        if self.failing_issues {
            return Err(SourceError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(self.issues.get(&full_name).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct TargetState {
    /// Namespace id to name, users and organizations alike
    owners: HashMap<i64, String>,
    organizations: HashMap<String, i64>,
    conflicting_orgs: HashMap<String, i64>,
    failing_orgs: HashSet<String>,
    existing: HashSet<String>,
    labels: HashMap<String, Vec<Label>>,
    concurrent_labels: HashMap<(String, String), i64>,
    issue_numbers: HashMap<String, u64>,
    next_id: i64,
}

/// Stateful Gitea double: migrations make repositories exist, created
/// organizations and labels are remembered
pub struct FakeTarget {
    state: Mutex<TargetState>,
    failing_probe: HashSet<String>,
    failing_migrate: HashSet<String>,
    failing_star: bool,
    failing_issues: HashSet<String>,
    failing_current_user: bool,
    probe_delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeTarget {
    fn default() -> Self {
        let mut state = TargetState {
            next_id: 100,
            ..Default::default()
        };
        state.owners.insert(1, "mirror-bot".to_string());

        Self {
            state: Mutex::new(state),
            failing_probe: HashSet::new(),
            failing_migrate: HashSet::new(),
            failing_star: false,
            failing_issues: HashSet::new(),
            failing_current_user: false,
            probe_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(self, name: &str, id: i64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.organizations.insert(name.to_string(), id);
            state.owners.insert(id, name.to_string());
        }
        self
    }

    /// The organization is missing on lookup but creating it reports a conflict
    pub fn conflict_on_create(self, name: &str, id: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .conflicting_orgs
            .insert(name.to_string(), id);
        self
    }

    pub fn failing_organization(self, name: &str) -> Self {
        self.state.lock().unwrap().failing_orgs.insert(name.to_string());
        self
    }

    pub fn with_existing_repo(self, owner: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .existing
            .insert(format!("{}/{}", owner, name));
        self
    }

    pub fn with_label(self, repository: &str, name: &str, id: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .labels
            .entry(repository.to_string())
            .or_default()
            .push(Label {
                id,
                name: name.to_string(),
            });
        self
    }

    /// Creating the label conflicts, and the label then shows up in listings
    pub fn label_created_concurrently(self, repository: &str, name: &str, id: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .concurrent_labels
            .insert((repository.to_string(), name.to_string()), id);
        self
    }

    pub fn failing_probe(mut self, repository: &str) -> Self {
        self.failing_probe.insert(repository.to_string());
        self
    }

    pub fn failing_migrate(mut self, repo_name: &str) -> Self {
        self.failing_migrate.insert(repo_name.to_string());
        self
    }

    pub fn failing_star(mut self) -> Self {
        self.failing_star = true;
        self
    }

    pub fn failing_issue(mut self, title: &str) -> Self {
        self.failing_issues.insert(title.to_string());
        self
    }

    pub fn failing_current_user(mut self) -> Self {
        self.failing_current_user = true;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    /// Calls that would change the target instance
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c.starts_with("create_")
                    || c.starts_with("migrate ")
                    || c.starts_with("star ")
                    || c.starts_with("add_")
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TargetApi for FakeTarget {
    async fn current_user(&self) -> Result<MirrorTarget, GiteaError> {
        self.record("current_user".to_string());
        if self.failing_current_user {
            return Err(status(401));
        }
        Ok(MirrorTarget::user(1, "mirror-bot"))
    }

    async fn get_organization(&self, name: &str) -> Result<MirrorTarget, GiteaError> {
        self.record(format!("get_organization {}", name));
        let state = self.state.lock().unwrap();
        if state.failing_orgs.contains(name) {
            return Err(status(500));
        }
        state
            .organizations
            .get(name)
            .map(|id| MirrorTarget::organization(*id, name))
            .ok_or_else(|| status(404))
    }

    async fn create_organization(
        &self,
        name: &str,
        _visibility: Visibility,
    ) -> Result<MirrorTarget, GiteaError> {
        self.record(format!("create_organization {}", name));
        let mut state = self.state.lock().unwrap();

        if let Some(id) = state.conflicting_orgs.remove(name) {
            state.organizations.insert(name.to_string(), id);
            state.owners.insert(id, name.to_string());
            return Err(status(422));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.organizations.insert(name.to_string(), id);
        state.owners.insert(id, name.to_string());
        Ok(MirrorTarget::organization(id, name))
    }

    async fn repository_exists(&self, owner: &str, repo: &str) -> Result<bool, GiteaError> {
        let full_name = format!("{}/{}", owner, repo);
        self.record(format!("repository_exists {}", full_name));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_probe.contains(&full_name) {
            return Err(status(500));
        }
        Ok(self.state.lock().unwrap().existing.contains(&full_name))
    }

    async fn migrate_repository(&self, request: &MigrateRequest) -> Result<(), GiteaError> {
        self.record(format!("migrate {} uid={}", request.repo_name, request.uid));
        if self.failing_migrate.contains(&request.repo_name) {
            return Err(status(500));
        }

        let mut state = self.state.lock().unwrap();
        let owner = state.owners.get(&request.uid).cloned().unwrap_or_default();
        state
            .existing
            .insert(format!("{}/{}", owner, request.repo_name));
        Ok(())
    }

    async fn star_repository(&self, owner: &str, repo: &str) -> Result<(), GiteaError> {
        self.record(format!("star {}/{}", owner, repo));
        if self.failing_star {
            return Err(status(500));
        }
        Ok(())
    }

    async fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, GiteaError> {
        let full_name = format!("{}/{}", owner, repo);
        self.record(format!("list_labels {}", full_name));
        Ok(self
            .state
            .lock()
            .unwrap()
            .labels
            .get(&full_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_label(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        _color: &str,
    ) -> Result<Label, GiteaError> {
        let full_name = format!("{}/{}", owner, repo);
        self.record(format!("create_label {} {}", full_name, name));
        let mut state = self.state.lock().unwrap();

        let key = (full_name.clone(), name.to_string());
        if let Some(id) = state.concurrent_labels.remove(&key) {
            state.labels.entry(full_name).or_default().push(Label {
                id,
                name: name.to_string(),
            });
            return Err(status(409));
        }

        let label = Label {
            id: state.next_id,
            name: name.to_string(),
        };
        state.next_id += 1;
        state.labels.entry(full_name).or_default().push(label.clone());
        Ok(label)
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &CreateIssue,
    ) -> Result<u64, GiteaError> {
        let full_name = format!("{}/{}", owner, repo);
        self.record(format!("create_issue {} {}", full_name, issue.title));
        if self.failing_issues.contains(&issue.title) {
            return Err(status(500));
        }

        let mut state = self.state.lock().unwrap();
        let number = state.issue_numbers.entry(full_name).or_insert(0);
        *number += 1;
        Ok(*number)
    }

    async fn add_issue_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label_ids: &[i64],
    ) -> Result<(), GiteaError> {
        self.record(format!(
            "add_issue_labels {}/{}#{} {:?}",
            owner, repo, number, label_ids
        ));
        Ok(())
    }
}
