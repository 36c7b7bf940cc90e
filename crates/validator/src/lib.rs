//! Configuration validation engine for the trellis CI platform.
//!
//! Given an in-memory, already-parsed [`Project`] snapshot, the engine
//! proves it internally consistent before anything is scheduled: no
//! dependency cycles, no dangling references, and the ordering contracts
//! the scheduler relies on (artifact pull after push) provable across
//! every build-type permutation.
//!
//! The engine only reports. Every validator is total: all problems in a
//! snapshot are collected in one pass, and the caller decides accept or
//! reject policy from the [`ValidationLevel`] partition.
//!
//! # Entry points
//!
//! - [`check_project_errors`]: the blocking checks (plus the ordering
//!   contracts, gated by a cost ceiling unless `include_long` is set)
//! - [`check_project_warnings`]: the advisory checks
//! - [`check_alias_warnings`]: alias/selector coverage

mod alias;
mod batchtime;
mod graph_builder;
mod index;
mod ordering;
mod structural;

pub use batchtime::{CronError, validate_cron};
pub use graph_builder::{DependencyEdge, build_dependency_graph};
pub use index::{TaskUnit, tv_to_task_unit};
pub use ordering::{
    EdgePolicy, MAX_PULL_COMMANDS_FOR_DEPENDENCY_CHECK, OrderingViolation,
    validate_tv_depends_on_tv,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use trellis_config::{Project, ProjectAlias, ProjectSettings};

/// Severity of one diagnostic. A warning never blocks acceptance of a
/// configuration; an error does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Blocks acceptance.
    Error,
    /// Informational only.
    Warning,
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
        }
    }
}

/// One diagnostic produced by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Severity.
    pub level: ValidationLevel,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ValidationError {
    /// An error-level diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Error,
            message: message.into(),
        }
    }

    /// A warning-level diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

/// The ordered diagnostics for one validation pass.
///
/// Ordering is stable within one validator but callers must not rely on
/// cross-validator ordering, only on level-based filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// An empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// The diagnostics matching the given level.
    #[must_use]
    pub fn at_level(&self, level: ValidationLevel) -> Self {
        Self(
            self.0
                .iter()
                .filter(|e| e.level == level)
                .cloned()
                .collect(),
        )
    }

    /// Whether any diagnostic is error-level.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.iter().any(|e| e.level == ValidationLevel::Error)
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the diagnostics in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errs: Vec<ValidationError>) -> Self {
        Self(errs)
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{err}")?;
        }
        Ok(())
    }
}

type ProjectValidator = fn(&Project) -> Vec<ValidationError>;

/// The blocking checks, in reporting order.
const ERROR_VALIDATORS: &[ProjectValidator] = &[
    structural::validate_build_variant_fields,
    graph_builder::validate_dependency_graph,
    structural::validate_task_dependencies,
    structural::validate_task_names,
    structural::validate_build_variant_names,
    batchtime::validate_batch_times,
    structural::validate_build_variant_task_names,
    structural::validate_all_dependencies_spec,
    structural::validate_project_task_names,
    structural::validate_task_ids_and_tags,
    structural::validate_task_groups,
    structural::validate_host_creates,
    structural::validate_duplicate_variant_tasks,
    structural::validate_generate_tasks,
];

/// The advisory checks, in reporting order.
const WARNING_VALIDATORS: &[ProjectValidator] = &[
    structural::check_task_groups,
    structural::check_task_runs,
    structural::check_tasks,
    structural::check_build_variants,
];

/// Run every blocking check against the configuration.
///
/// Validators are independent and fan out across the rayon thread pool;
/// results are concatenated in validator-list order, so repeated runs on
/// the same snapshot produce identical diagnostics. `include_long` forces
/// the exhaustive ordering-contract verification past its cost ceiling.
#[must_use]
pub fn check_project_errors(
    project: &Project,
    settings: &ProjectSettings,
    include_long: bool,
) -> ValidationErrors {
    debug!(project = %project.identifier, include_long, "running error validators");
    let mut all: Vec<ValidationError> = ERROR_VALIDATORS
        .par_iter()
        .map(|validator| validator(project))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();
    all.extend(ordering::validate_artifact_sync_commands(
        project,
        include_long,
    ));
    all.extend(ordering::validate_artifact_sync_settings(project, settings));
    all.extend(structural::ensure_referential_integrity(project, settings));
    ValidationErrors(all)
}

/// Run every advisory check against the configuration.
#[must_use]
pub fn check_project_warnings(project: &Project) -> ValidationErrors {
    debug!(project = %project.identifier, "running warning validators");
    let all: Vec<ValidationError> = WARNING_VALIDATORS
        .par_iter()
        .map(|validator| validator(project))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();
    ValidationErrors(all)
}

/// Check that every alias matches something in the configuration.
#[must_use]
pub fn check_alias_warnings(project: &Project, aliases: &[ProjectAlias]) -> ValidationErrors {
    ValidationErrors(alias::validate_alias_coverage(project, aliases))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        let errs = ValidationErrors(vec![
            ValidationError::error("broken"),
            ValidationError::warning("questionable"),
        ]);
        assert!(errs.has_error());
        assert_eq!(errs.at_level(ValidationLevel::Error).len(), 1);
        assert_eq!(errs.at_level(ValidationLevel::Warning).len(), 1);
        assert!(!errs.at_level(ValidationLevel::Warning).has_error());
    }

    #[test]
    fn test_display_renders_level_prefix() {
        let errs = ValidationErrors(vec![ValidationError::error("broken")]);
        assert_eq!(errs.to_string(), "ERROR: broken\n");
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let err = ValidationError::warning("w");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"warning\""));
    }
}
