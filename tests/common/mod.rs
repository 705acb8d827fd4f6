//! Common test utilities and helpers for giteamirror tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

use giteamirror::discovery::OrgDiscovery;
use giteamirror::gitea::{CreateIssue, Label, MigrateRequest};
use giteamirror::{
    Config, GiteaError, Issue, IssueState, MirrorTarget, Repository, SourceApi, SourceError,
    TargetApi, Visibility,
};

/// Temporary home for configuration files
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("giteamirror");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        Self {
            temp_dir,
            config_dir,
        }
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.config_dir.join("config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }
}

/// Configuration with every mandatory value set
pub fn base_config() -> Config {
    let mut config = Config::default();
    config.github.username = "octocat".to_string();
    config.github.token = Some("ghp_test".to_string());
    config.gitea.url = "https://gitea.example.com".to_string();
    config.gitea.token = "gitea_test".to_string();
    config
}

pub fn repo(owner: &str, name: &str) -> Repository {
    Repository::new(owner, name, format!("https://github.com/{}/{}.git", owner, name))
}

pub fn issue(number: u64, title: &str, state: IssueState, labels: &[&str]) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: format!("Body of {}", title),
        state,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        created_at: Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap(),
        author_login: "hubot".to_string(),
    }
}

/// A GitHub account as seen through the API
#[derive(Default)]
pub struct GitHubWorld {
    pub owned: Vec<Repository>,
    pub private: Vec<Repository>,
    pub starred: Vec<Repository>,
    pub organizations: HashMap<String, Vec<Repository>>,
    pub issues: HashMap<String, Vec<Issue>>,
}

#[async_trait]
impl SourceApi for GitHubWorld {
    async fn list_user_repositories(&self, _username: &str) -> Result<Vec<Repository>, SourceError> {
        Ok(self.owned.clone())
    }

    async fn list_private_repositories(&self) -> Result<Vec<Repository>, SourceError> {
        Ok(self.private.clone())
    }

    async fn list_starred_repositories(
        &self,
        _username: Option<&str>,
    ) -> Result<Vec<Repository>, SourceError> {
        Ok(self.starred.clone())
    }

    async fn list_organizations(&self, _strategy: &OrgDiscovery) -> Result<Vec<String>, SourceError> {
        let mut names: Vec<String> = self.organizations.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>, SourceError> {
        self.organizations
            .get(org)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(org.to_string()))
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, SourceError> {
        self.owned
            .iter()
            .chain(self.starred.iter())
            .find(|r| r.owner == owner && r.name == name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", owner, name)))
    }

    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<Issue>, SourceError> {
        Ok(self
            .issues
            .get(&format!("{}/{}", owner, name))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct GiteaState {
    namespaces: HashMap<i64, String>,
    organizations: HashMap<String, i64>,
    repositories: HashSet<String>,
    labels: HashMap<String, Vec<Label>>,
    issues: HashMap<String, Vec<CreateIssue>>,
    next_id: i64,
}

/// A Gitea instance kept in memory; every mutating call is logged
pub struct GiteaWorld {
    state: Mutex<GiteaState>,
    mutations: Mutex<Vec<String>>,
}

impl GiteaWorld {
    pub fn new() -> Self {
        let mut state = GiteaState {
            next_id: 1000,
            ..Default::default()
        };
        state.namespaces.insert(1, "mirror-bot".to_string());

        Self {
            state: Mutex::new(state),
            mutations: Mutex::new(Vec::new()),
        }
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn has_repository(&self, full_name: &str) -> bool {
        self.state.lock().unwrap().repositories.contains(full_name)
    }

    pub fn has_organization(&self, name: &str) -> bool {
        self.state.lock().unwrap().organizations.contains_key(name)
    }

    pub fn issues_of(&self, full_name: &str) -> Vec<CreateIssue> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(full_name)
            .cloned()
            .unwrap_or_default()
    }

    fn mutate(&self, call: String) {
        self.mutations.lock().unwrap().push(call);
    }
}

fn not_found() -> GiteaError {
    GiteaError::Status {
        status: 404,
        message: "not found".to_string(),
    }
}

#[async_trait]
impl TargetApi for GiteaWorld {
    async fn current_user(&self) -> Result<MirrorTarget, GiteaError> {
        Ok(MirrorTarget::user(1, "mirror-bot"))
    }

    async fn get_organization(&self, name: &str) -> Result<MirrorTarget, GiteaError> {
        self.state
            .lock()
            .unwrap()
            .organizations
            .get(name)
            .map(|id| MirrorTarget::organization(*id, name))
            .ok_or_else(not_found)
    }

    async fn create_organization(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<MirrorTarget, GiteaError> {
        self.mutate(format!("create_organization {} {}", name, visibility));
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.organizations.insert(name.to_string(), id);
        state.namespaces.insert(id, name.to_string());
        Ok(MirrorTarget::organization(id, name))
    }

    async fn repository_exists(&self, owner: &str, repo: &str) -> Result<bool, GiteaError> {
        Ok(self.has_repository(&format!("{}/{}", owner, repo)))
    }

    async fn migrate_repository(&self, request: &MigrateRequest) -> Result<(), GiteaError> {
        let mut state = self.state.lock().unwrap();
        let owner = state
            .namespaces
            .get(&request.uid)
            .cloned()
            .ok_or_else(not_found)?;
        let full_name = format!("{}/{}", owner, request.repo_name);
        self.mutate(format!("migrate {}", full_name));
        state.repositories.insert(full_name);
        Ok(())
    }

    async fn star_repository(&self, owner: &str, repo: &str) -> Result<(), GiteaError> {
        self.mutate(format!("star {}/{}", owner, repo));
        Ok(())
    }

    async fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, GiteaError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .labels
            .get(&format!("{}/{}", owner, repo))
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
        self.mutate(format!("create_label {} {}", full_name, name));
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let label = Label {
            id: state.next_id,
            name: name.to_string(),
        };
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
        self.mutate(format!("create_issue {} {}", full_name, issue.title));
        let mut state = self.state.lock().unwrap();
        let issues = state.issues.entry(full_name).or_default();
        issues.push(issue.clone());
        Ok(issues.len() as u64)
    }

    async fn add_issue_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label_ids: &[i64],
    ) -> Result<(), GiteaError> {
        self.mutate(format!("add_issue_labels {}/{}#{} {:?}", owner, repo, number, label_ids));
        Ok(())
    }
}

/// Assertion helper for CLI output
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
