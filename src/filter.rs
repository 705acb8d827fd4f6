//! Include/exclude name filtering
//!
//! Patterns are shell globs (`*`, `?`, `[...]`) matched case-sensitively
//! against the repository name. A repository passes when it matches at least
//! one include pattern and no exclude pattern.

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::repository::Repository;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Check whether `name` matches a single glob pattern.
///
/// Invalid patterns never match.
pub fn matches(name: &str, pattern: &str) -> bool {
    Pattern::new(pattern)
        .map(|compiled| compiled.matches_with(name, MATCH_OPTIONS))
        .unwrap_or(false)
}

/// Compiled include/exclude pattern sets
#[derive(Debug, Clone)]
pub struct NameFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl NameFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: compile(include),
            exclude: compile(exclude),
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.include.iter().any(|p| p.matches_with(name, MATCH_OPTIONS))
            && !self.exclude.iter().any(|p| p.matches_with(name, MATCH_OPTIONS))
    }

    pub fn apply(&self, repositories: Vec<Repository>) -> Vec<Repository> {
        repositories
            .into_iter()
            .filter(|repo| {
                let keep = self.accepts(&repo.name);
                if !keep {
                    debug!("Excluding repository due to name filter: {}", repo.full_name);
                }
                keep
            })
            .collect()
    }
}

fn compile(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|pattern| match Pattern::new(pattern) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!("Ignoring invalid name pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Keep repositories whose name passes the include and exclude patterns
pub fn filter(repositories: Vec<Repository>, include: &[String], exclude: &[String]) -> Vec<Repository> {
    NameFilter::new(include, exclude).apply(repositories)
}

/// Drop forked repositories
pub fn without_forks(repositories: Vec<Repository>) -> Vec<Repository> {
    repositories.into_iter().filter(|repo| !repo.is_fork).collect()
}
