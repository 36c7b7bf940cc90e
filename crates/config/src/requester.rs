//! Requester types: the build triggers a task unit may run under.

use serde::{Deserialize, Serialize};

/// What caused a build to be requested.
///
/// The conditional reachability engine checks ordering contracts against
/// every requester type, because run-condition flags can exclude a task
/// from some of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    /// A manually submitted patch build.
    Patch,
    /// A patch build created from a GitHub pull request.
    GithubPr,
    /// A commit-queue merge test.
    CommitQueue,
    /// A build triggered by pushing a git tag.
    GitTag,
    /// A build triggered by another project's completion.
    Trigger,
    /// An ad hoc build requested through the API.
    AdHoc,
    /// A mainline commit picked up by the repository tracker.
    RepoTracker,
}

impl Requester {
    /// Every requester type, in a stable order.
    pub const ALL: [Self; 7] = [
        Self::Patch,
        Self::GithubPr,
        Self::CommitQueue,
        Self::GitTag,
        Self::Trigger,
        Self::AdHoc,
        Self::RepoTracker,
    ];

    /// Whether builds under this requester are patch builds.
    #[must_use]
    pub fn is_patch(self) -> bool {
        matches!(self, Self::Patch | Self::GithubPr | Self::CommitQueue)
    }

    /// Whether builds under this requester are git-tag builds.
    #[must_use]
    pub fn is_git_tag(self) -> bool {
        matches!(self, Self::GitTag)
    }
}
