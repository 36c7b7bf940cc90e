//! Project aliases: named variant/task selectors for patch and
//! commit-queue routing.
//!
//! An alias selects variants either by regular expression or by tags, and
//! within matching variants selects tasks the same way. Tag criteria are
//! OR-ed: the selector matches when any listed tag is present, and a `!`
//! prefix inverts a single criterion.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which routing surface an alias belongs to. Only affects diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    /// Routes commit-queue merge tests.
    CommitQueue,
    /// Routes GitHub pull request patches.
    GithubPr,
    /// Routes GitHub check runs.
    GithubChecks,
    /// Routes git-tag-triggered builds.
    GitTag,
    /// A user-defined patch alias.
    Patch,
}

impl AliasKind {
    /// Human-readable label used as the first component of coverage warnings.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::CommitQueue => "Commit queue alias",
            Self::GithubPr => "GitHub PR alias",
            Self::GithubChecks => "GitHub check alias",
            Self::GitTag => "Git tag alias",
            Self::Patch => "Patch alias",
        }
    }
}

/// A named variant/task selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAlias {
    /// Stable identifier, used to key coverage results.
    pub id: String,
    /// Routing surface this alias belongs to.
    pub kind: AliasKind,
    /// Variant-matching regular expression; ignored when `variant_tags` is set.
    #[serde(default)]
    pub variant: String,
    /// Variant tag criteria; takes precedence over `variant`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variant_tags: Vec<String>,
    /// Task-matching regular expression; ignored when `task_tags` is set.
    #[serde(default)]
    pub task: String,
    /// Task tag criteria; takes precedence over `task`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_tags: Vec<String>,
}

impl ProjectAlias {
    /// Whether the alias matches the named variant.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error for a malformed variant pattern.
    pub fn has_matching_variant(&self, name: &str, tags: &[String]) -> Result<bool, regex::Error> {
        if !self.variant_tags.is_empty() {
            return Ok(tags_match(&self.variant_tags, tags));
        }
        let re = Regex::new(&self.variant)?;
        Ok(re.is_match(name))
    }

    /// Whether the alias matches the named task.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error for a malformed task pattern.
    pub fn has_matching_task(&self, name: &str, tags: &[String]) -> Result<bool, regex::Error> {
        if !self.task_tags.is_empty() {
            return Ok(tags_match(&self.task_tags, tags));
        }
        let re = Regex::new(&self.task)?;
        Ok(re.is_match(name))
    }
}

fn tags_match(criteria: &[String], tags: &[String]) -> bool {
    criteria.iter().any(|criterion| {
        if let Some(negated) = criterion.strip_prefix('!') {
            !tags.iter().any(|t| t == negated)
        } else {
            tags.iter().any(|t| t == criterion)
        }
    })
}
