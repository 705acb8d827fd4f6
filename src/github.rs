use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::models::issues::Issue as GitHubIssue;
use octocrab::models::orgs::Organization;
use octocrab::models::Repository as GitHubRepository;
use octocrab::{Octocrab, Page};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::GitHubConfig;
use crate::discovery::{OrgDiscovery, SourceApi, SourceError};
use crate::repository::{Issue, IssueState, Repository};

const PER_PAGE: &str = "100";

/// GitHub client wrapper
pub struct GitHubClient {
    client: Octocrab,
    username: String,
}

impl From<octocrab::Error> for SourceError {
    fn from(error: octocrab::Error) -> Self {
        match &error {
            octocrab::Error::GitHub { source, .. } => {
                let message = source.message.clone();
                match source.status_code.as_u16() {
                    404 => SourceError::NotFound(message),
                    403 => SourceError::Forbidden(message),
                    status => SourceError::Api { status, message },
                }
            }
            _ => SourceError::Other(error.to_string()),
        }
    }
}

impl GitHubClient {
    /// Create a new GitHub client. Without a token requests are anonymous and
    /// only public data is reachable.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Client against another API root, such as GitHub Enterprise
    pub fn with_base_uri(config: &GitHubConfig, base_uri: &str) -> Result<Self> {
        Self::build(config, Some(base_uri))
    }

    fn build(config: &GitHubConfig, base_uri: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(uri) = base_uri {
            builder = builder
                .base_uri(uri)
                .with_context(|| format!("Invalid GitHub API URL: {}", uri))?;
        }
        if let Some(token) = config.token.as_ref().filter(|t| !t.is_empty()) {
            builder = builder.personal_token(token.clone());
        }

        let client = builder.build().context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            username: config.username.clone(),
        })
    }

    /// Get the configured username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login of the identity behind the token
    pub async fn authenticated_login(&self) -> Result<String> {
        let user = self
            .client
            .current()
            .user()
            .await
            .context("Failed to get current user information. Check your GitHub token.")?;
        Ok(user.login)
    }

    /// Fetch every page of a list endpoint
    async fn paginate<T: DeserializeOwned>(
        &self,
        route: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, SourceError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("per_page", PER_PAGE));

        debug!("Fetching {} {:?}", route, params);
        let first: Page<T> = self.client.get(route, Some(&query)).await?;
        let items = self.client.all_pages(first).await?;

        debug!("{} returned {} items", route, items.len());
        Ok(items)
    }

    async fn list_repositories(
        &self,
        route: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Repository>, SourceError> {
        let repositories: Vec<GitHubRepository> = self.paginate(route, params).await?;
        Ok(repositories.into_iter().filter_map(to_repository).collect())
    }
}

/// Convert an octocrab repository, dropping entries without a clone URL
fn to_repository(repo: GitHubRepository) -> Option<Repository> {
    let clone_url = repo.clone_url.as_ref()?.to_string();
    let owner = repo
        .owner
        .as_ref()
        .map(|o| o.login.clone())
        .unwrap_or_default();

    let mut converted = Repository::new(owner, repo.name, clone_url)
        .private(repo.private.unwrap_or(false))
        .fork(repo.fork.unwrap_or(false))
        .with_issues(repo.has_issues.unwrap_or(false));

    if let Some(full_name) = repo.full_name {
        converted.full_name = full_name;
    }

    Some(converted)
}

/// Convert an octocrab issue; pull requests come back from the issues
/// endpoint too and are skipped
fn to_issue(issue: GitHubIssue) -> Option<Issue> {
    if issue.pull_request.is_some() {
        return None;
    }

    let state = match issue.state {
        octocrab::models::IssueState::Closed => IssueState::Closed,
        _ => IssueState::Open,
    };

    Some(Issue {
        number: issue.number,
        title: issue.title,
        body: issue.body.unwrap_or_default(),
        state,
        labels: issue.labels.into_iter().map(|label| label.name).collect(),
        created_at: issue.created_at,
        author_login: issue.user.login,
    })
}

#[async_trait]
impl SourceApi for GitHubClient {
    async fn list_user_repositories(&self, username: &str) -> Result<Vec<Repository>, SourceError> {
        let repositories = self
            .list_repositories(&format!("/users/{}/repos", username), &[])
            .await?;
        info!("Found {} public repositories for {}", repositories.len(), username);
        Ok(repositories)
    }

    async fn list_private_repositories(&self) -> Result<Vec<Repository>, SourceError> {
        self.list_repositories(
            "/user/repos",
            &[("affiliation", "owner"), ("visibility", "private")],
        )
        .await
    }

    async fn list_starred_repositories(
        &self,
        username: Option<&str>,
    ) -> Result<Vec<Repository>, SourceError> {
        match username {
            Some(user) => {
                self.list_repositories(&format!("/users/{}/starred", user), &[])
                    .await
            }
            None => self.list_repositories("/user/starred", &[]).await,
        }
    }

    async fn list_organizations(&self, strategy: &OrgDiscovery) -> Result<Vec<String>, SourceError> {
        let route = match strategy {
            OrgDiscovery::AuthenticatedUser => "/user/orgs".to_string(),
            OrgDiscovery::PublicMemberships(user) => format!("/users/{}/orgs", user),
        };

        let organizations: Vec<Organization> = self.paginate(&route, &[]).await?;
        let names: Vec<String> = organizations.into_iter().map(|org| org.login).collect();

        info!("Found {} organizations: {:?}", names.len(), names);
        Ok(names)
    }

    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>, SourceError> {
        self.list_repositories(&format!("/orgs/{}/repos", org), &[("type", "all")])
            .await
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, SourceError> {
        let repo = self.client.repos(owner, name).get().await?;
        to_repository(repo).ok_or_else(|| {
            SourceError::Other(format!("repository {}/{} has no clone URL", owner, name))
        })
    }

    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<Issue>, SourceError> {
        let issues: Vec<GitHubIssue> = self
            .paginate(
                &format!("/repos/{}/{}/issues", owner, name),
                &[("state", "all"), ("sort", "created"), ("direction", "asc")],
            )
            .await?;

        Ok(issues.into_iter().filter_map(to_issue).collect())
    }
}
