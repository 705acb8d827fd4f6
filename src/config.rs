use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gitea::Visibility;

/// Main configuration structure for giteamirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// GitHub scope and credentials
    #[serde(default)]
    pub github: GitHubConfig,

    /// Gitea connection and target settings
    #[serde(default)]
    pub gitea: GiteaConfig,

    /// Log intended actions without calling any mutating Gitea endpoint
    #[serde(default)]
    pub dry_run: bool,

    /// Repository name globs to mirror
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Repository name globs to skip
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Scheduling behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GitHubConfig {
    /// User whose repositories are mirrored
    #[serde(default)]
    pub username: String,

    /// Personal access token; required for private, starred, organization,
    /// single-repository and issue mirroring
    pub token: Option<String>,

    #[serde(default)]
    pub skip_forks: bool,

    #[serde(default)]
    pub private_repositories: bool,

    #[serde(default)]
    pub mirror_issues: bool,

    #[serde(default)]
    pub mirror_starred: bool,

    #[serde(default)]
    pub mirror_organizations: bool,

    /// Query starred repositories and organizations of `username` instead of
    /// the token's identity
    #[serde(default)]
    pub use_specific_user: bool,

    /// Mirror only this repository (`owner/name` or a GitHub URL)
    pub single_repo: Option<String>,

    /// Organizations to mirror; empty means all
    #[serde(default)]
    pub include_orgs: Vec<String>,

    /// Organizations to skip
    #[serde(default)]
    pub exclude_orgs: Vec<String>,

    /// Create one Gitea organization per GitHub organization
    #[serde(default)]
    pub preserve_org_structure: bool,

    /// Do not copy issues of starred repositories
    #[serde(default)]
    pub skip_starred_issues: bool,
}

/// Gitea configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GiteaConfig {
    /// Base URL of the Gitea instance
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub token: String,

    /// Organization that receives all mirrors
    pub organization: Option<String>,

    /// Visibility for organizations created by the mirror
    #[serde(default)]
    pub visibility: Visibility,

    /// Organization collecting mirrors of starred repositories
    #[serde(default = "default_starred_organization")]
    pub starred_organization: Option<String>,
}

/// Scheduling configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum repositories reconciled at the same time
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Pause between runs, e.g. "3600", "30m", "1h"
    #[serde(default = "default_delay")]
    pub delay: String,

    /// Exit after the first run
    #[serde(default)]
    pub single_run: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact" or "json"
}

/// Problems that make a configuration unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration, please provide {0}")]
    Missing(&'static str),

    #[error("invalid configuration, {0} requires setting GITHUB_TOKEN")]
    RequiresGitHubToken(&'static str),

    #[error("invalid configuration, unknown visibility '{0}' (expected public, limited or private)")]
    InvalidVisibility(String),

    #[error("invalid configuration, {0} must be a positive number")]
    InvalidNumber(&'static str),

    #[error("invalid configuration, cannot parse delay '{0}'")]
    InvalidDelay(String),
}

// Default value functions
fn default_include() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_starred_organization() -> Option<String> {
    Some("github".to_string())
}
fn default_max_parallel() -> usize {
    4
}
fn default_delay() -> String {
    "3600".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for GiteaConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            organization: None,
            visibility: Visibility::default(),
            starred_organization: default_starred_organization(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            delay: default_delay(),
            single_run: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            gitea: GiteaConfig::default(),
            dry_run: false,
            include: default_include(),
            exclude: Vec::new(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn read_bool(value: &str) -> bool {
    matches!(value, "true" | "1")
}

fn read_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

impl Config {
    /// Build the effective configuration: optional YAML file, then environment
    /// overrides, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default()?,
        };

        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from the default location, or defaults if there is no file
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration file at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_values()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("giteamirror").join("config.yml"))
    }

    /// Expand `${VAR}` references in credentials and URLs
    pub fn expand_values(&mut self) -> Result<()> {
        self.gitea.url = shellexpand::env(&self.gitea.url)
            .context("Failed to expand gitea.url")?
            .into_owned();

        self.gitea.token = shellexpand::env(&self.gitea.token)
            .context("Failed to expand gitea.token")?
            .into_owned();

        if let Some(token) = &self.github.token {
            self.github.token = Some(
                shellexpand::env(token)
                    .context("Failed to expand github.token")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Overlay environment variables. Unset or empty variables leave the
    /// current value alone.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(v) = read("GITHUB_USERNAME") {
            self.github.username = v;
        }
        if let Some(v) = read("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }
        if let Some(v) = read("SKIP_FORKS") {
            self.github.skip_forks = read_bool(&v);
        }
        if let Some(v) = read("MIRROR_PRIVATE_REPOSITORIES") {
            self.github.private_repositories = read_bool(&v);
        }
        if let Some(v) = read("MIRROR_ISSUES") {
            self.github.mirror_issues = read_bool(&v);
        }
        if let Some(v) = read("MIRROR_STARRED") {
            self.github.mirror_starred = read_bool(&v);
        }
        if let Some(v) = read("MIRROR_ORGANIZATIONS") {
            self.github.mirror_organizations = read_bool(&v);
        }
        if let Some(v) = read("USE_SPECIFIC_USER") {
            self.github.use_specific_user = read_bool(&v);
        }
        if let Some(v) = read("SINGLE_REPO") {
            self.github.single_repo = Some(v);
        }
        if let Some(v) = read("INCLUDE_ORGS") {
            self.github.include_orgs = read_list(&v);
        }
        if let Some(v) = read("EXCLUDE_ORGS") {
            self.github.exclude_orgs = read_list(&v);
        }
        if let Some(v) = read("PRESERVE_ORG_STRUCTURE") {
            self.github.preserve_org_structure = read_bool(&v);
        }
        if let Some(v) = read("SKIP_STARRED_ISSUES") {
            self.github.skip_starred_issues = read_bool(&v);
        }

        if let Some(v) = read("GITEA_URL") {
            self.gitea.url = v;
        }
        if let Some(v) = read("GITEA_TOKEN") {
            self.gitea.token = v;
        }
        if let Some(v) = read("GITEA_ORGANIZATION") {
            self.gitea.organization = Some(v);
        }
        if let Some(v) = read("GITEA_ORG_VISIBILITY") {
            self.gitea.visibility = v.parse()?;
        }
        if let Some(v) = read("GITEA_STARRED_ORGANIZATION") {
            self.gitea.starred_organization = Some(v);
        }

        if let Some(v) = read("DRY_RUN") {
            self.dry_run = read_bool(&v);
        }
        if let Some(v) = read("INCLUDE") {
            self.include = read_list(&v);
        }
        if let Some(v) = read("EXCLUDE") {
            self.exclude = read_list(&v);
        }
        if let Some(v) = read("DELAY") {
            self.sync.delay = v;
        }
        if let Some(v) = read("SINGLE_RUN") {
            self.sync.single_run = read_bool(&v);
        }
        if let Some(v) = read("MAX_PARALLEL") {
            self.sync.max_parallel = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("MAX_PARALLEL"))?;
        }

        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.username.is_empty() {
            return Err(ConfigError::Missing("GITHUB_USERNAME"));
        }
        if self.gitea.url.is_empty() {
            return Err(ConfigError::Missing("GITEA_URL"));
        }
        if self.gitea.token.is_empty() {
            return Err(ConfigError::Missing("GITEA_TOKEN"));
        }

        let has_token = self
            .github
            .token
            .as_ref()
            .map(|token| !token.is_empty())
            .unwrap_or(false);

        if !has_token {
            if self.github.private_repositories {
                return Err(ConfigError::RequiresGitHubToken("mirroring private repositories"));
            }
            if self.github.mirror_issues
                || self.github.mirror_starred
                || self.github.mirror_organizations
                || self.github.single_repo.is_some()
            {
                return Err(ConfigError::RequiresGitHubToken(
                    "mirroring issues, starred repositories, organizations, or a single repo",
                ));
            }
        }

        if self.sync.max_parallel == 0 {
            return Err(ConfigError::InvalidNumber("max_parallel"));
        }

        self.delay()?;

        Ok(())
    }

    /// Pause between runs
    pub fn delay(&self) -> Result<std::time::Duration, ConfigError> {
        crate::daemon::parse_duration(&self.sync.delay)
            .map(std::time::Duration::from_secs)
            .ok_or_else(|| ConfigError::InvalidDelay(self.sync.delay.clone()))
    }

    /// Copy with both tokens masked, for logging
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.github.token.is_some() {
            copy.github.token = Some("****".to_string());
        }
        if !copy.gitea.token.is_empty() {
            copy.gitea.token = "****".to_string();
        }
        copy
    }
}
