//! Ordering-contract verification.
//!
//! The scheduler assumes an artifact pull runs only after the push it
//! names has completed. That assumption is proven here, at validation
//! time, with a predicate-gated depth-first search over the dependency
//! graph: an edge counts toward the proof only if it survives every
//! build-type permutation the dependent task can run under.

use crate::ValidationError;
use crate::graph_builder::{DependencyEdge, build_graph_from_units};
use crate::index::{TaskUnit, tv_to_task_unit};
use std::collections::BTreeMap;
use tracing::debug;
use trellis_config::{
    ARTIFACT_PULL_COMMAND, ARTIFACT_PUSH_COMMAND, DependencyStatus, PluginCommand, Project,
    ProjectSettings, Requester,
};
use trellis_task_graph::{EdgeCrossing, TaskNode};

/// Above this many pull commands the exhaustive dependency check is
/// skipped unless the caller asks for the long pass.
pub const MAX_PULL_COMMANDS_FOR_DEPENDENCY_CHECK: usize = 300;

/// An ordering contract that could not be proven.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct OrderingViolation {
    message: String,
}

/// The edge-eligibility policy for one reachability query.
///
/// Injectable so future ordering contracts can reuse the same search with
/// different rules; the artifact push/pull pair uses the full set.
pub struct EdgePolicy<'a> {
    units: &'a BTreeMap<TaskNode, TaskUnit>,
    target: &'a TaskNode,
    statuses: &'a [Option<DependencyStatus>],
}

impl<'a> EdgePolicy<'a> {
    /// Build a policy over the given task-unit index.
    #[must_use]
    pub fn new(
        units: &'a BTreeMap<TaskNode, TaskUnit>,
        target: &'a TaskNode,
        statuses: &'a [Option<DependencyStatus>],
    ) -> Self {
        Self {
            units,
            target,
            statuses,
        }
    }

    /// Whether the search may cross this edge.
    ///
    /// Three rules, all of which must hold:
    /// 1. A patch-optional edge is crossable only when the dependent unit
    ///    is itself excluded from patch builds, since otherwise a patch
    ///    build could skip the dependency at runtime.
    /// 2. Every requester type the dependent unit runs under must also be
    ///    run under by the depended-on unit, or the edge vanishes for that
    ///    requester.
    /// 3. An edge arriving at the target must carry a required status in
    ///    the accepted set.
    #[must_use]
    pub fn traversable(&self, crossing: EdgeCrossing<'_, DependencyEdge>) -> bool {
        let default = TaskUnit::default();
        let from = self.units.get(crossing.from).unwrap_or(&default);
        let to = self.units.get(crossing.to).unwrap_or(&default);

        if crossing.weight.patch_optional
            && !(from.skip_on_patch_build() || from.skip_on_non_git_tag_build())
        {
            return false;
        }

        for requester in Requester::ALL {
            if !from.skip_on_requester(requester) && to.skip_on_requester(requester) {
                return false;
            }
        }

        if !self.statuses.is_empty() && crossing.to == self.target {
            return self.statuses.contains(&crossing.weight.required_status);
        }
        true
    }
}

/// Prove that `dependent` always transitively depends on `depended_on`
/// with a qualifying status, across every build-type permutation.
///
/// # Errors
///
/// Returns an [`OrderingViolation`] naming both task-variant pairs and the
/// build types the dependent runs under when no eligible path exists.
pub fn validate_tv_depends_on_tv(
    dependent: &TaskNode,
    depended_on: &TaskNode,
    statuses: &[Option<DependencyStatus>],
    project: &Project,
) -> Result<(), OrderingViolation> {
    let units = tv_to_task_unit(project);
    let graph = build_graph_from_units(&units);
    let policy = EdgePolicy::new(&units, depended_on, statuses);

    if graph.depth_first_search(dependent, depended_on, |crossing| policy.traversable(crossing)) {
        return Ok(());
    }

    let default = TaskUnit::default();
    let unit = units.get(dependent).unwrap_or(&default);
    let runs_on_patches = !(unit.skip_on_patch_build() || unit.skip_on_non_git_tag_build());
    let runs_on_non_patches = !(unit.skip_on_non_patch_build() || unit.skip_on_non_git_tag_build());
    let runs_on_git_tag = !(unit.skip_on_non_patch_build() || unit.skip_on_git_tag_build());

    let mut message = format!("task {dependent} must depend on task {depended_on} completing");
    if runs_on_patches && runs_on_non_patches {
        message.push_str(" for both patches and non-patches");
    } else if runs_on_patches {
        message.push_str(" for patches");
    } else if runs_on_non_patches {
        message.push_str(" for non-patches");
    } else if runs_on_git_tag {
        message.push_str(" for git-tag builds");
    }
    if !statuses.is_empty() {
        let labels: Vec<&str> = statuses.iter().map(|s| status_label(*s)).collect();
        message.push_str(&format!(" with status in [{}]", labels.join(", ")));
    }
    Err(OrderingViolation { message })
}

fn status_label(status: Option<DependencyStatus>) -> &'static str {
    match status {
        None => "",
        Some(DependencyStatus::Success) => "success",
        Some(DependencyStatus::Failed) => "failed",
        Some(DependencyStatus::Any) => "*",
    }
}

/// Validate the artifact push/pull ordering contracts.
///
/// Push must be called at most once per task; every pull must name a task
/// that actually pushes, and must be proven to transitively depend on it
/// completing successfully. With more pull commands than the cost ceiling
/// allows and `include_long` unset, the dependency proof is skipped and a
/// warning records that verification was incomplete.
pub(crate) fn validate_artifact_sync_commands(
    project: &Project,
    include_long: bool,
) -> Vec<ValidationError> {
    let mut errs = Vec::new();

    let push_calls = project.tasks_that_call_command(ARTIFACT_PUSH_COMMAND);
    errs.extend(crate::structural::times_called_per_task(
        project,
        &push_calls,
        ARTIFACT_PUSH_COMMAND,
        1,
        crate::ValidationLevel::Warning,
    ));

    let (pulls, command_count, collection_errs) = pull_commands_by_variant(project);
    errs.extend(collection_errs);

    let check_dependencies = command_count <= MAX_PULL_COMMANDS_FOR_DEPENDENCY_CHECK || include_long;
    if !check_dependencies {
        debug!(command_count, "skipping pull dependency verification");
        errs.push(ValidationError::warning(format!(
            "too many commands using '{ARTIFACT_PULL_COMMAND}' to check dependencies by default"
        )));
    }

    for (variant, task, commands) in pulls {
        for command in commands {
            let (push_task, push_variant) = match parse_pull_parameters(command) {
                Ok(parsed) => parsed,
                Err(err) => {
                    errs.push(ValidationError::error(format!(
                        "could not parse parameters for command '{ARTIFACT_PULL_COMMAND}': {err}"
                    )));
                    continue;
                }
            };
            // An unstated variant means the pull task's own variant.
            let push_variant = push_variant.unwrap_or_else(|| variant.clone());
            let push_node = TaskNode::new(push_task.clone(), push_variant.clone());

            if check_dependencies {
                let pull_node = TaskNode::new(task.clone(), variant.clone());
                let statuses = [None, Some(DependencyStatus::Success)];
                if let Err(err) =
                    validate_tv_depends_on_tv(&pull_node, &push_node, &statuses, project)
                {
                    errs.push(ValidationError::error(format!(
                        "problem validating that task running command '{ARTIFACT_PULL_COMMAND}' \
                         depends on task running command '{ARTIFACT_PUSH_COMMAND}': {err}"
                    )));
                }
            }

            if project.find_task(&push_task).is_none() {
                errs.push(ValidationError::error(format!(
                    "problem validating that task '{push_task}' runs command \
                     '{ARTIFACT_PUSH_COMMAND}': task '{push_task}' does not exist"
                )));
            } else if project
                .commands_run_on_tv(&push_task, &push_variant, ARTIFACT_PUSH_COMMAND)
                .is_empty()
            {
                errs.push(ValidationError::error(format!(
                    "task '{push_task}' in build variant '{push_variant}' does not run command \
                     '{ARTIFACT_PUSH_COMMAND}'"
                )));
            }
        }
    }
    errs
}

/// The artifact sync commands require the project-level feature flag.
pub(crate) fn validate_artifact_sync_settings(
    project: &Project,
    settings: &ProjectSettings,
) -> Vec<ValidationError> {
    if settings.artifact_sync_enabled {
        return Vec::new();
    }
    let mut errs = Vec::new();
    for command in [ARTIFACT_PUSH_COMMAND, ARTIFACT_PULL_COMMAND] {
        if !project.tasks_that_call_command(command).is_empty() {
            errs.push(ValidationError::error(format!(
                "cannot use {command} command in project config when it is disabled by project \
                 '{}' settings",
                project.identifier
            )));
        }
    }
    errs
}

type PullsByVariant<'a> = Vec<(String, String, Vec<&'a PluginCommand>)>;

/// Collect, per (variant, task), the pull commands that would run there.
/// Project-level pre/post hooks apply to every task outside a group; group
/// members get the group's setup/teardown hooks instead. Dangling task
/// references become errors but never stop collection.
fn pull_commands_by_variant(project: &Project) -> (PullsByVariant<'_>, usize, Vec<ValidationError>) {
    let mut pulls = Vec::new();
    let mut command_count = 0;
    let mut errs = Vec::new();

    for bv in &project.build_variants {
        let project_hooks: Vec<&PluginCommand> = [&project.pre, &project.post]
            .into_iter()
            .flat_map(|list| project.expand_commands(list))
            .filter(|c| {
                c.command.as_deref() == Some(ARTIFACT_PULL_COMMAND) && c.runs_on_variant(&bv.name)
            })
            .collect();
        for entry in &bv.tasks {
            if let Some(group) = project.find_task_group(&entry.name) {
                let hook_lists = [
                    &group.setup_group,
                    &group.setup_task,
                    &group.teardown_group,
                    &group.teardown_task,
                ];
                let hook_cmds: Vec<&PluginCommand> = hook_lists
                    .into_iter()
                    .flat_map(|list| project.expand_commands(list))
                    .filter(|c| {
                        c.command.as_deref() == Some(ARTIFACT_PULL_COMMAND)
                            && c.runs_on_variant(&bv.name)
                    })
                    .collect();
                for member in &group.tasks {
                    if project.find_task(member).is_none() {
                        errs.push(ValidationError::error(format!(
                            "cannot find definition of task '{member}' used in task group '{}'",
                            group.name
                        )));
                        continue;
                    }
                    let mut commands = hook_cmds.clone();
                    commands.extend(project.commands_run_on_tv(
                        member,
                        &bv.name,
                        ARTIFACT_PULL_COMMAND,
                    ));
                    command_count += commands.len();
                    if !commands.is_empty() {
                        pulls.push((bv.name.clone(), member.clone(), commands));
                    }
                }
            } else {
                if project.find_task(&entry.name).is_none() {
                    errs.push(ValidationError::error(format!(
                        "cannot find definition of task '{}'",
                        entry.name
                    )));
                    continue;
                }
                let mut commands = project_hooks.clone();
                commands.extend(project.commands_run_on_tv(
                    &entry.name,
                    &bv.name,
                    ARTIFACT_PULL_COMMAND,
                ));
                command_count += commands.len();
                if !commands.is_empty() {
                    pulls.push((bv.name.clone(), entry.name.clone(), commands));
                }
            }
        }
    }
    (pulls, command_count, errs)
}

/// Extract the push task name and optional source variant from a pull
/// command's parameters.
fn parse_pull_parameters(command: &PluginCommand) -> Result<(String, Option<String>), String> {
    if command.params.is_empty() {
        return Err(format!(
            "command '{ARTIFACT_PULL_COMMAND}' has no parameters"
        ));
    }
    let task = match command.params.get("task") {
        None => {
            return Err(format!(
                "command '{ARTIFACT_PULL_COMMAND}' needs parameter 'task' defined"
            ));
        }
        Some(value) => value.as_str().map(ToString::to_string).ok_or_else(|| {
            format!("command '{ARTIFACT_PULL_COMMAND}' parameter 'task' is not a string argument")
        })?,
    };
    let variant = match command.params.get("from_build_variant") {
        None => None,
        Some(value) => Some(value.as_str().map(ToString::to_string).ok_or_else(|| {
            format!(
                "command '{ARTIFACT_PULL_COMMAND}' parameter 'from_build_variant' is not a \
                 string argument"
            )
        })?),
    };
    Ok((task, variant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_config::{BuildVariant, BuildVariantTask, DependsOn, ProjectTask};

    fn command(name: &str, params: &[(&str, serde_json::Value)]) -> PluginCommand {
        PluginCommand {
            command: Some(name.to_string()),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            ..Default::default()
        }
    }

    fn variant(name: &str, tasks: &[&str]) -> BuildVariant {
        BuildVariant {
            name: name.to_string(),
            tasks: tasks
                .iter()
                .map(|t| BuildVariantTask {
                    name: (*t).to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    /// push runs s3.push, pull runs s3.pull naming push. Whether pull
    /// declares the dependency is up to the caller.
    fn sync_project(with_dependency: bool) -> Project {
        let mut pull = ProjectTask {
            name: "pull".to_string(),
            commands: vec![command(
                ARTIFACT_PULL_COMMAND,
                &[("task", json!("push"))],
            )],
            ..Default::default()
        };
        if with_dependency {
            pull.depends_on = vec![DependsOn {
                name: "push".to_string(),
                status: Some(DependencyStatus::Success),
                ..Default::default()
            }];
        }
        Project {
            identifier: "artifact-demo".to_string(),
            tasks: vec![
                ProjectTask {
                    name: "push".to_string(),
                    commands: vec![command(ARTIFACT_PUSH_COMMAND, &[])],
                    ..Default::default()
                },
                pull,
            ],
            build_variants: vec![variant("linux", &["push", "pull"])],
            ..Default::default()
        }
    }

    #[test]
    fn test_declared_dependency_satisfies_contract() {
        let errs = validate_artifact_sync_commands(&sync_project(true), false);
        assert!(errs.is_empty(), "unexpected: {errs:?}");
    }

    #[test]
    fn test_missing_dependency_is_an_ordering_violation() {
        let errs = validate_artifact_sync_commands(&sync_project(false), false);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("'pull' in build variant 'linux'"));
        assert!(errs[0].message.contains("'push' in build variant 'linux'"));
        assert!(errs[0].message.contains("with status in [, success]"));
    }

    #[test]
    fn test_patch_optional_dependency_does_not_satisfy_contract() {
        let mut project = sync_project(true);
        project.tasks[1].depends_on[0].patch_optional = true;
        let errs = validate_artifact_sync_commands(&project, false);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("must depend on"));
    }

    #[test]
    fn test_requester_mismatch_blocks_the_edge() {
        // pull runs everywhere but push is patch-only, so non-patch builds
        // would lose the ordering guarantee.
        let mut project = sync_project(true);
        project.tasks[0].patch_only = Some(true);
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(!errs.is_empty());
    }

    #[test]
    fn test_push_task_must_run_push_command() {
        let mut project = sync_project(true);
        project.tasks[0].commands.clear();
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.iter().any(|e| {
            e.message
                .contains("does not run command 's3.push'")
        }));
    }

    #[test]
    fn test_pull_without_task_parameter() {
        let mut project = sync_project(true);
        project.tasks[1].commands = vec![command(ARTIFACT_PULL_COMMAND, &[("foo", json!(1))])];
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.iter().any(|e| e.message.contains("needs parameter 'task'")));
    }

    #[test]
    fn test_multiple_push_calls_warn() {
        let mut project = sync_project(true);
        let push_cmd = command(ARTIFACT_PUSH_COMMAND, &[]);
        project.tasks[0].commands.push(push_cmd);
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.iter().any(|e| {
            e.level == crate::ValidationLevel::Warning && e.message.contains("may only call")
        }));
    }

    #[test]
    fn test_cost_ceiling_skips_verification() {
        let mut project = sync_project(false);
        let pull_cmd = project.tasks[1].commands[0].clone();
        project.tasks[1].commands =
            vec![pull_cmd; MAX_PULL_COMMANDS_FOR_DEPENDENCY_CHECK + 1];
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.iter().any(|e| {
            e.level == crate::ValidationLevel::Warning
                && e.message.contains("too many commands using 's3.pull'")
        }));
        assert!(!errs.iter().any(|e| e.message.contains("must depend on")));

        // The long pass still verifies and finds the missing dependency.
        let errs = validate_artifact_sync_commands(&project, true);
        assert!(errs.iter().any(|e| e.message.contains("must depend on")));
    }

    #[test]
    fn test_settings_gate_artifact_sync() {
        let project = sync_project(true);
        let disabled = ProjectSettings::default();
        let errs = validate_artifact_sync_settings(&project, &disabled);
        assert_eq!(errs.len(), 2);
        assert!(errs[0].message.contains("artifact-demo"));

        let enabled = ProjectSettings {
            artifact_sync_enabled: true,
            ..Default::default()
        };
        assert!(validate_artifact_sync_settings(&project, &enabled).is_empty());
    }

    #[test]
    fn test_from_build_variant_parameter() {
        let mut project = sync_project(true);
        project.build_variants.push(variant("windows", &["push"]));
        project.tasks[1].commands = vec![command(
            ARTIFACT_PULL_COMMAND,
            &[("task", json!("push")), ("from_build_variant", json!("windows"))],
        )];
        project.tasks[1].depends_on = vec![DependsOn {
            name: "push".to_string(),
            variant: Some("windows".to_string()),
            status: Some(DependencyStatus::Success),
            ..Default::default()
        }];
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.is_empty(), "unexpected: {errs:?}");
    }

    /// A pull in the project-level pre hook runs for every non-group task
    /// in the variant, so each of those tasks needs the dependency proof.
    #[test]
    fn test_pull_in_pre_hook_requires_dependency_proof() {
        let mut pre_pull = command(
            ARTIFACT_PULL_COMMAND,
            &[("task", json!("push")), ("from_build_variant", json!("windows"))],
        );
        pre_pull.variants = vec!["linux".to_string()];
        let mut project = Project {
            identifier: "hooked".to_string(),
            pre: vec![pre_pull],
            tasks: vec![
                ProjectTask {
                    name: "push".to_string(),
                    commands: vec![command(ARTIFACT_PUSH_COMMAND, &[])],
                    ..Default::default()
                },
                ProjectTask {
                    name: "worker".to_string(),
                    ..Default::default()
                },
            ],
            build_variants: vec![variant("linux", &["worker"]), variant("windows", &["push"])],
            ..Default::default()
        };

        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.iter().any(|e| {
            e.message.contains("'worker' in build variant 'linux'")
                && e.message.contains("'push' in build variant 'windows'")
        }));

        project.tasks[1].depends_on = vec![DependsOn {
            name: "push".to_string(),
            variant: Some("windows".to_string()),
            status: Some(DependencyStatus::Success),
            ..Default::default()
        }];
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.is_empty(), "unexpected: {errs:?}");
    }

    /// Group members run the group's own hooks, not the project pre/post.
    #[test]
    fn test_group_members_do_not_inherit_project_hooks() {
        use trellis_config::TaskGroup;

        let project = Project {
            identifier: "grouped".to_string(),
            pre: vec![command(ARTIFACT_PULL_COMMAND, &[("task", json!("push"))])],
            tasks: vec![ProjectTask {
                name: "member".to_string(),
                ..Default::default()
            }],
            task_groups: vec![TaskGroup {
                name: "group".to_string(),
                tasks: vec!["member".to_string()],
                ..Default::default()
            }],
            build_variants: vec![variant("linux", &["group"])],
            ..Default::default()
        };
        let errs = validate_artifact_sync_commands(&project, false);
        assert!(errs.is_empty(), "unexpected: {errs:?}");
    }
}
