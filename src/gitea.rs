//! Gitea API integration
//!
//! [`TargetApi`] is the set of calls the mirroring engine makes against the
//! target instance. [`GiteaClient`] implements it over `reqwest` against the
//! `/api/v1` REST API, authenticating with `Authorization: token <token>`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigError;
use crate::repository::{IssueState, MirrorTarget};

/// Gitea caps list responses at `MAX_RESPONSE_ITEMS`, 50 by default
const LABEL_PAGE_SIZE: usize = 50;

/// Errors returned by the Gitea API
#[derive(Debug, Error)]
pub enum GiteaError {
    #[error("Gitea API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gitea client configuration error: {0}")]
    Config(String),
}

impl GiteaError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GiteaError::Status { status, .. } => Some(*status),
            GiteaError::Http(e) => e.status().map(|s| s.as_u16()),
            GiteaError::Config(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// The resource already exists (Gitea answers 409 or 422 depending on the endpoint)
    pub fn is_conflict(&self) -> bool {
        matches!(self.status(), Some(409) | Some(422))
    }
}

/// Visibility of organizations created on Gitea
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Limited,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Limited => "limited",
            Visibility::Private => "private",
        };
        f.write_str(s)
    }
}

impl FromStr for Visibility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "limited" => Ok(Visibility::Limited),
            "private" => Ok(Visibility::Private),
            _ => Err(ConfigError::InvalidVisibility(s.to_string())),
        }
    }
}

/// Body of `POST /repos/migrate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrateRequest {
    pub auth_token: Option<String>,
    pub clone_addr: String,
    pub mirror: bool,
    pub repo_name: String,
    pub uid: i64,
    pub private: bool,
}

/// Body of `POST /repos/{owner}/{repo}/issues`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateIssue {
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub closed: bool,
}

/// A label defined in a Gitea repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: i64,
    login: Option<String>,
    username: Option<String>,
    name: Option<String>,
}

impl Account {
    fn into_name(self) -> (i64, String) {
        let name = self
            .username
            .or(self.login)
            .or(self.name)
            .unwrap_or_default();
        (self.id, name)
    }
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
}

/// Operations the mirroring engine needs from the target instance
#[async_trait]
pub trait TargetApi: Send + Sync {
    /// The account the token belongs to
    async fn current_user(&self) -> Result<MirrorTarget, GiteaError>;

    async fn get_organization(&self, name: &str) -> Result<MirrorTarget, GiteaError>;

    async fn create_organization(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<MirrorTarget, GiteaError>;

    /// `Ok(false)` only for a confirmed 404; any other failure is an error
    async fn repository_exists(&self, owner: &str, repo: &str) -> Result<bool, GiteaError>;

    async fn migrate_repository(&self, request: &MigrateRequest) -> Result<(), GiteaError>;

    async fn star_repository(&self, owner: &str, repo: &str) -> Result<(), GiteaError>;

    async fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, GiteaError>;

    async fn create_label(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        color: &str,
    ) -> Result<Label, GiteaError>;

    /// Returns the number of the created issue
    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &CreateIssue,
    ) -> Result<u64, GiteaError>;

    async fn add_issue_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label_ids: &[i64],
    ) -> Result<(), GiteaError>;
}

/// Gitea REST client
#[derive(Clone)]
pub struct GiteaClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GiteaClient {
    /// Create a new Gitea client.
    ///
    /// No request is made until the first API call.
    pub fn new(base_url: &str, token: &str) -> Result<Self, GiteaError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("giteamirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GiteaError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/json")
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.http.post(self.url(path)))
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.authorized(self.http.put(self.url(path)))
    }

    /// Send a request and turn non-2xx answers into [`GiteaError::Status`]
    async fn send(&self, builder: RequestBuilder) -> Result<Response, GiteaError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        debug!("Gitea answered {}: {}", status, message);
        Err(GiteaError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, GiteaError> {
        Ok(self.send(builder).await?.json::<T>().await?)
    }
}

#[async_trait]
impl TargetApi for GiteaClient {
    async fn current_user(&self) -> Result<MirrorTarget, GiteaError> {
        let account: Account = self.send_json(self.get("/user")).await?;
        let (id, name) = account.into_name();
        Ok(MirrorTarget::user(id, name))
    }

    async fn get_organization(&self, name: &str) -> Result<MirrorTarget, GiteaError> {
        let account: Account = self.send_json(self.get(&format!("/orgs/{}", name))).await?;
        let (id, login) = account.into_name();
        Ok(MirrorTarget::organization(id, login))
    }

    async fn create_organization(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<MirrorTarget, GiteaError> {
        let body = serde_json::json!({
            "username": name,
            "visibility": visibility,
        });
        let account: Account = self.send_json(self.post("/orgs").json(&body)).await?;
        let (id, login) = account.into_name();
        Ok(MirrorTarget::organization(id, login))
    }

    async fn repository_exists(&self, owner: &str, repo: &str) -> Result<bool, GiteaError> {
        let response = self
            .get(&format!("/repos/{}/{}", owner, repo))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(GiteaError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn migrate_repository(&self, request: &MigrateRequest) -> Result<(), GiteaError> {
        self.send(self.post("/repos/migrate").json(request)).await?;
        Ok(())
    }

    async fn star_repository(&self, owner: &str, repo: &str) -> Result<(), GiteaError> {
        self.send(self.put(&format!("/user/starred/{}/{}", owner, repo)))
            .await?;
        Ok(())
    }

    async fn list_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>, GiteaError> {
        let path = format!("/repos/{}/{}/labels", owner, repo);
        let limit = LABEL_PAGE_SIZE.to_string();
        let mut labels = Vec::new();

        // The server may cap the page below our limit, so only an empty page ends the listing
        for page in 1u32.. {
            let page = page.to_string();
            let batch: Vec<Label> = self
                .send_json(
                    self.get(&path)
                        .query(&[("limit", limit.as_str()), ("page", page.as_str())]),
                )
                .await?;
            if batch.is_empty() {
                break;
            }
            labels.extend(batch);
        }

        debug!("{}/{} has {} labels", owner, repo, labels.len());
        Ok(labels)
    }

    async fn create_label(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        color: &str,
    ) -> Result<Label, GiteaError> {
        let body = serde_json::json!({ "name": name, "color": color });
        self.send_json(
            self.post(&format!("/repos/{}/{}/labels", owner, repo))
                .json(&body),
        )
        .await
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &CreateIssue,
    ) -> Result<u64, GiteaError> {
        let created: CreatedIssue = self
            .send_json(
                self.post(&format!("/repos/{}/{}/issues", owner, repo))
                    .json(issue),
            )
            .await?;
        Ok(created.number)
    }

    async fn add_issue_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        label_ids: &[i64],
    ) -> Result<(), GiteaError> {
        let body = serde_json::json!({ "labels": label_ids });
        self.send(
            self.post(&format!("/repos/{}/{}/issues/{}/labels", owner, repo, number))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
