//! Normalized project configuration model for the trellis validation engine.
//!
//! These types are the in-process input contract: the YAML/JSON parser and
//! schema layer (an external collaborator) produces a [`Project`] with names
//! already resolved and unset fields defaulted. Nothing in this crate reads
//! configuration text.
//!
//! # Key Types
//!
//! - [`Project`]: one configuration snapshot (variants, tasks, groups, functions)
//! - [`BuildVariant`] / [`BuildVariantTask`]: the task×variant product space
//! - [`DependsOn`]: a declared dependency, possibly using wildcard selectors
//! - [`ProjectAlias`]: a named variant/task selector for patch and commit-queue routing

mod alias;
mod project;
mod requester;

pub use alias::{AliasKind, ProjectAlias};
pub use project::{
    BuildVariant, BuildVariantTask, Container, DependencyStatus, DependsOn, PluginCommand,
    Project, ProjectSettings, ProjectTask, TaskGroup,
};
pub use requester::Requester;

/// Wildcard naming every other dependency within the dependent's variant.
pub const ALL_DEPENDENCIES: &str = "*";

/// Wildcard naming every variant that defines the depended-on task.
pub const ALL_VARIANTS: &str = "*";

/// Command that uploads a task's artifact set for later tasks to pull.
pub const ARTIFACT_PUSH_COMMAND: &str = "s3.push";

/// Command that downloads the artifact set uploaded by a push task.
pub const ARTIFACT_PULL_COMMAND: &str = "s3.pull";

/// Command that provisions an ephemeral host from within a task.
pub const HOST_CREATE_COMMAND: &str = "host.create";

/// Command that dynamically generates tasks at runtime.
pub const GENERATE_TASKS_COMMAND: &str = "generate.tasks";
