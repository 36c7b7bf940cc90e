//! Structural validators: independent, stateless rules over the raw
//! configuration. None of these traverse the dependency graph; they share
//! only the diagnostics contract with the graph components.

use crate::index::tv_to_task_unit;
use crate::{ValidationError, ValidationLevel};
use std::collections::{BTreeMap, BTreeSet};
use trellis_config::{
    ALL_DEPENDENCIES, ALL_VARIANTS, GENERATE_TASKS_COMMAND, HOST_CREATE_COMMAND, Project,
    ProjectSettings,
};

/// Characters forbidden in task and variant names.
const UNAUTHORIZED_CHARACTERS: &str = "|";

/// Name characters that would collide with selector syntax when leading.
const INVALID_LEADING_CHARACTERS: &[char] = &['.', '!'];

/// Per-task call ceiling for `host.create`.
pub const HOST_CREATE_LIMIT_PER_TASK: usize = 3;

/// Project-wide `host.create` ceiling for EC2 hosts.
pub const EC2_HOST_CREATE_TOTAL_LIMIT: usize = 1000;

/// Project-wide `host.create` ceiling for Docker hosts.
pub const DOCKER_HOST_CREATE_TOTAL_LIMIT: usize = 200;

/// Every variant needs a name, at least one task, and a resolvable run
/// target for each task.
pub(crate) fn validate_build_variant_fields(project: &Project) -> Vec<ValidationError> {
    if project.build_variants.is_empty() {
        return vec![ValidationError::error(
            "must specify at least one buildvariant",
        )];
    }
    let mut errs = Vec::new();
    for bv in &project.build_variants {
        if bv.name.is_empty() {
            errs.push(ValidationError::error("all buildvariants must have a name"));
        }
        if bv.tasks.is_empty() {
            errs.push(ValidationError::error(format!(
                "buildvariant '{}' must have at least one task",
                bv.name
            )));
        }
        if bv.run_on.iter().any(|r| !r.is_empty()) {
            continue;
        }
        for entry in &bv.tasks {
            let mut has_run_on = entry.run_on.iter().any(|r| !r.is_empty());
            if !has_run_on {
                if let Some(group) = project.find_task_group(&entry.name) {
                    has_run_on = group.tasks.iter().any(|member| {
                        project
                            .find_task(member)
                            .is_some_and(|t| t.run_on.iter().any(|r| !r.is_empty()))
                    });
                } else if let Some(task) = project.find_task(&entry.name) {
                    has_run_on = task.run_on.iter().any(|r| !r.is_empty());
                }
            }
            if !has_run_on {
                errs.push(ValidationError::error(format!(
                    "buildvariant '{}' must either specify run_on field or have every task \
                     specify run_on",
                    bv.name
                )));
                break;
            }
        }
    }
    errs
}

/// Dependency fields must be unique per task and reference defined names.
pub(crate) fn validate_task_dependencies(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for task in &project.tasks {
        let mut seen = BTreeSet::new();
        for dep in &task.depends_on {
            let pair = (dep.name.clone(), dep.variant.clone());
            if !seen.insert(pair) {
                errs.push(ValidationError::error(format!(
                    "duplicate dependency '{}' specified for task '{}'",
                    dep.name, task.name
                )));
            }
            if dep.name != ALL_DEPENDENCIES && project.find_task(&dep.name).is_none() {
                errs.push(ValidationError::error(format!(
                    "non-existent task name '{}' in dependencies for task '{}'",
                    dep.name, task.name
                )));
            }
            if let Some(variant) = &dep.variant {
                if variant != ALL_VARIANTS && project.find_build_variant(variant).is_none() {
                    errs.push(ValidationError::error(format!(
                        "non-existent variant name '{variant}' in dependencies for task '{}'",
                        task.name
                    )));
                }
            }
        }
    }
    errs
}

pub(crate) fn validate_task_names(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for task in &project.tasks {
        if task
            .name
            .contains(|c: char| UNAUTHORIZED_CHARACTERS.contains(c) || c == ' ')
        {
            errs.push(ValidationError::error(format!(
                "task name '{}' contains unauthorized characters ('{UNAUTHORIZED_CHARACTERS} ')",
                task.name
            )));
        }
    }
    errs
}

/// Variant names must be unique, displayable, and free of reserved
/// characters.
pub(crate) fn validate_build_variant_names(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    let mut seen = BTreeSet::new();
    for bv in &project.build_variants {
        if !seen.insert(bv.name.clone()) {
            errs.push(ValidationError::error(format!(
                "buildvariant '{}' already exists",
                bv.name
            )));
        }
        if bv.display_name.is_empty() {
            errs.push(ValidationError::error(format!(
                "buildvariant '{}' does not have a display name",
                bv.name
            )));
        }
        if bv.name.contains(|c: char| UNAUTHORIZED_CHARACTERS.contains(c)) {
            errs.push(ValidationError::error(format!(
                "buildvariant name '{}' contains unauthorized characters \
                 ({UNAUTHORIZED_CHARACTERS})",
                bv.name
            )));
        }
    }
    errs
}

/// A task name may appear at most once per variant entry list.
pub(crate) fn validate_build_variant_task_names(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for bv in &project.build_variants {
        let mut seen = BTreeSet::new();
        for entry in &bv.tasks {
            if !seen.insert(entry.name.clone()) {
                errs.push(ValidationError::error(format!(
                    "task '{}' in buildvariant '{}' already exists",
                    entry.name, bv.name
                )));
            }
        }
    }
    errs
}

/// The all-dependencies wildcard must not co-occur with other explicit
/// dependencies covering the same variant.
pub(crate) fn validate_all_dependencies_spec(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for task in &project.tasks {
        if task.depends_on.len() <= 1 {
            continue;
        }
        let mut covered = BTreeSet::new();
        for dep in &task.depends_on {
            if dep.name != ALL_DEPENDENCIES {
                continue;
            }
            let variant = dep.variant.clone().unwrap_or_default();
            if variant.is_empty() || covered.contains(&variant) {
                errs.push(ValidationError::error(format!(
                    "task '{}' contains the all dependencies ({ALL_DEPENDENCIES})' specification \
                     and other explicit dependencies or duplicate variants",
                    task.name
                )));
            }
            covered.insert(variant);
        }
    }
    errs
}

pub(crate) fn validate_project_task_names(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    let mut seen = BTreeSet::new();
    for task in &project.tasks {
        if !seen.insert(task.name.clone()) {
            errs.push(ValidationError::error(format!(
                "task '{}' already exists",
                task.name
            )));
        }
    }
    errs
}

/// Task names and tags must not collide with selector syntax.
pub(crate) fn validate_task_ids_and_tags(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for task in &project.tasks {
        if task.name.starts_with(INVALID_LEADING_CHARACTERS) {
            errs.push(ValidationError::error(format!(
                "task '{}' has invalid name: starts with invalid character '{}'",
                task.name,
                task.name.chars().next().unwrap_or_default()
            )));
        }
        for tag in &task.tags {
            if tag.starts_with(INVALID_LEADING_CHARACTERS) {
                errs.push(ValidationError::error(format!(
                    "task '{}' has invalid tag '{tag}': starts with invalid character '{}'",
                    task.name,
                    tag.chars().next().unwrap_or_default()
                )));
            }
            if tag.contains(char::is_whitespace) {
                errs.push(ValidationError::error(format!(
                    "task '{}' has invalid tag '{tag}': tag contains white space",
                    task.name
                )));
            }
        }
    }
    errs
}

/// Task groups must be non-empty, uniquely named against tasks, and free
/// of duplicate members.
pub(crate) fn validate_task_groups(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for group in &project.task_groups {
        if group.tasks.is_empty() {
            errs.push(ValidationError::error(format!(
                "task group {} must have at least 1 task",
                group.name
            )));
        }
        if project.find_task(&group.name).is_some() {
            errs.push(ValidationError::error(format!(
                "{} is used as a name for both a task and task group",
                group.name
            )));
        }
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for member in &group.tasks {
            *counts.entry(member.as_str()).or_default() += 1;
        }
        for (member, count) in counts {
            if count > 1 {
                errs.push(ValidationError::error(format!(
                    "{member} is listed in task group {} {count} times",
                    group.name
                )));
            }
        }
    }
    errs
}

/// Per-task and per-provider ceilings on `host.create`.
pub(crate) fn validate_host_creates(project: &Project) -> Vec<ValidationError> {
    let counts = host_create_counts(project);
    let mut errs = times_called_per_task(
        project,
        &counts.all,
        HOST_CREATE_COMMAND,
        HOST_CREATE_LIMIT_PER_TASK,
        ValidationLevel::Error,
    );

    let mut ec2_total = 0;
    let mut docker_total = 0;
    for bv in &project.build_variants {
        for entry in &bv.tasks {
            ec2_total += counts.ec2.get(&entry.name).copied().unwrap_or(0);
            docker_total += counts.docker.get(&entry.name).copied().unwrap_or(0);
        }
    }
    if ec2_total > EC2_HOST_CREATE_TOTAL_LIMIT {
        errs.push(ValidationError::error(format!(
            "project config may only call ec2 {HOST_CREATE_COMMAND} \
             {EC2_HOST_CREATE_TOTAL_LIMIT} time(s) but it is called {ec2_total} time(s)"
        )));
    }
    if docker_total > DOCKER_HOST_CREATE_TOTAL_LIMIT {
        errs.push(ValidationError::error(format!(
            "project config may only call docker {HOST_CREATE_COMMAND} \
             {DOCKER_HOST_CREATE_TOTAL_LIMIT} time(s) but it is called {docker_total} time(s)"
        )));
    }
    errs
}

struct HostCreateCounts {
    ec2: BTreeMap<String, usize>,
    docker: BTreeMap<String, usize>,
    all: BTreeMap<String, usize>,
}

fn host_create_counts(project: &Project) -> HostCreateCounts {
    let mut counts = HostCreateCounts {
        ec2: BTreeMap::new(),
        docker: BTreeMap::new(),
        all: BTreeMap::new(),
    };
    for task in &project.tasks {
        for command in project.expand_commands(&task.commands) {
            if command.command.as_deref() != Some(HOST_CREATE_COMMAND) {
                continue;
            }
            let is_docker = command
                .params
                .get("provider")
                .and_then(serde_json::Value::as_str)
                == Some("docker");
            let provider_counts = if is_docker {
                &mut counts.docker
            } else {
                &mut counts.ec2
            };
            *provider_counts.entry(task.name.clone()).or_default() += 1;
            *counts.all.entry(task.name.clone()).or_default() += 1;
        }
    }
    counts
}

/// Flag tasks whose per-variant call count for a command exceeds the
/// ceiling.
pub(crate) fn times_called_per_task(
    project: &Project,
    counts: &BTreeMap<String, usize>,
    command: &str,
    times: usize,
    level: ValidationLevel,
) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for bv in &project.build_variants {
        for entry in &bv.tasks {
            if let Some(&count) = counts.get(&entry.name) {
                if count > times {
                    errs.push(ValidationError {
                        level,
                        message: format!(
                            "build variant '{}' with task '{}' may only call {command} {times} \
                             time(s) but calls it {count} time(s)",
                            bv.name, entry.name
                        ),
                    });
                }
            }
        }
    }
    errs
}

/// A task may appear only once per variant after task-group expansion.
pub(crate) fn validate_duplicate_variant_tasks(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for bv in &project.build_variants {
        let mut seen = BTreeSet::new();
        for entry in &bv.tasks {
            let names: Vec<&String> = match project.find_task_group(&entry.name) {
                Some(group) => group.tasks.iter().collect(),
                None => vec![&entry.name],
            };
            for name in names {
                if !seen.insert(name.clone()) {
                    errs.push(ValidationError::error(format!(
                        "task '{name}' in '{}' is listed more than once, likely through a task \
                         group",
                        bv.name
                    )));
                }
            }
        }
    }
    errs
}

/// `generate.tasks` is nooped by the server past the first call.
pub(crate) fn validate_generate_tasks(project: &Project) -> Vec<ValidationError> {
    let counts = project.tasks_that_call_command(GENERATE_TASKS_COMMAND);
    times_called_per_task(project, &counts, GENERATE_TASKS_COMMAND, 1, ValidationLevel::Error)
}

/// Every name that references another entity must resolve: variant task
/// entries against tasks and groups, `run_on` against known distros and
/// containers.
pub(crate) fn ensure_referential_integrity(
    project: &Project,
    settings: &ProjectSettings,
) -> Vec<ValidationError> {
    let mut errs = Vec::new();

    let mut all_task_names = BTreeSet::new();
    let mut task_group_members: BTreeMap<&str, &str> = BTreeMap::new();
    for task in &project.tasks {
        all_task_names.insert(task.name.as_str());
    }
    for group in &project.task_groups {
        all_task_names.insert(group.name.as_str());
        for member in &group.tasks {
            task_group_members.insert(member.as_str(), group.name.as_str());
        }
    }
    let container_names: BTreeSet<&str> = project
        .containers
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    let check_target = |errs: &mut Vec<ValidationError>, run_on: &[String], describe: &str| {
        let mut has_distro = false;
        let mut has_container = false;
        for name in run_on {
            let is_distro = settings.distro_ids.iter().any(|d| d == name)
                || settings.distro_aliases.iter().any(|d| d == name);
            let is_container = container_names.contains(name.as_str());
            if !is_distro && !is_container {
                errs.push(ValidationError::warning(format!(
                    "{describe} references a nonexistent distro or container named '{name}'"
                )));
            } else if settings.distro_ids.iter().any(|d| d == name) && is_container {
                errs.push(ValidationError::warning(format!(
                    "{describe} references a container name overlapping with an existing distro \
                     '{name}', the container configuration will override the distro"
                )));
            }
            has_distro = has_distro || is_distro;
            has_container = has_container || is_container;
        }
        if has_distro && has_container {
            errs.push(ValidationError::error(
                "run_on cannot contain a mixture of containers and distros",
            ));
        } else if has_container && run_on.len() > 1 {
            errs.push(ValidationError::warning(
                "only one container can be used from run_on; the first container in the list \
                 will be used",
            ));
        }
    };

    for bv in &project.build_variants {
        for entry in &bv.tasks {
            let mut referenced = vec![entry.name.as_str()];
            if let Some(group) = project.find_task_group(&entry.name) {
                referenced.extend(group.tasks.iter().map(String::as_str));
            }
            for name in referenced {
                if all_task_names.contains(name) {
                    continue;
                }
                if name.is_empty() {
                    errs.push(ValidationError::error(format!(
                        "tasks for buildvariant '{}' must each have a name field",
                        bv.name
                    )));
                } else {
                    errs.push(ValidationError::error(format!(
                        "buildvariant '{}' references a non-existent task '{name}'",
                        bv.name
                    )));
                }
            }
            if let Some(group) = task_group_members.get(entry.name.as_str()) {
                errs.push(ValidationError::warning(format!(
                    "task '{}' in build variant '{}' is already referenced in task group \
                     '{group}'",
                    entry.name, bv.name
                )));
            }
            check_target(
                &mut errs,
                &entry.run_on,
                &format!("task '{}' in buildvariant '{}'", entry.name, bv.name),
            );
        }
        check_target(&mut errs, &bv.run_on, &format!("buildvariant '{}'", bv.name));
    }
    errs
}

// ---------------------------------------------------------------------------
// Warning-level checks
// ---------------------------------------------------------------------------

/// Duplicate group definitions and questionable host fan-out settings.
pub(crate) fn check_task_groups(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    let mut seen = BTreeSet::new();
    for group in &project.task_groups {
        if !seen.insert(group.name.clone()) {
            errs.push(ValidationError::warning(format!(
                "task group '{}' is defined multiple times; only the first will be used",
                group.name
            )));
        }
        if group.max_hosts < 1 {
            errs.push(ValidationError::warning(format!(
                "task group {} has number of hosts {} less than 1",
                group.name, group.max_hosts
            )));
        }
        if group.tasks.len() == 1 {
            continue;
        }
        if group.max_hosts > i64::try_from(group.tasks.len()).unwrap_or(i64::MAX) {
            errs.push(ValidationError::warning(format!(
                "task group {} has max number of hosts {} greater than the number of tasks {}",
                group.name,
                group.max_hosts,
                group.tasks.len()
            )));
        }
    }
    errs
}

/// Run-condition combinations that can never be scheduled.
pub(crate) fn check_task_runs(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for unit in tv_to_task_unit(project).values() {
        if unit.skip_on_patch_build() && unit.skip_on_non_patch_build() {
            errs.push(ValidationError::warning(format!(
                "task '{}' will never run because it skips both patch builds and non-patch builds",
                unit.name
            )));
        }
        if unit.skip_on_git_tag_build() && unit.skip_on_non_git_tag_build() {
            errs.push(ValidationError::warning(format!(
                "task '{}' will never run because it skips both git tag builds and non git tag \
                 builds",
                unit.name
            )));
        }
        // Git-tag-only builds cannot run in patches.
        if unit.skip_on_non_git_tag_build() && unit.skip_on_non_patch_build() {
            errs.push(ValidationError::warning(format!(
                "task '{}' will never run because it only runs for git tag builds but also is \
                 patch-only",
                unit.name
            )));
        }
        if unit.skip_on_non_git_tag_build() && unit.patchable == Some(true) {
            errs.push(ValidationError::warning(format!(
                "task '{}' cannot be patchable if it only runs for git tag builds",
                unit.name
            )));
        }
    }
    errs
}

/// Per-task warnings: empty command lists, surprising dependency
/// run-conditions, and name hygiene.
pub(crate) fn check_tasks(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for task in &project.tasks {
        if task.commands.is_empty() {
            errs.push(ValidationError::warning(format!(
                "task '{}' does not contain any commands",
                task.name
            )));
        }

        for dep in &task.depends_on {
            let Some(depended_on) = project.find_task(&dep.name) else {
                continue;
            };
            if depended_on.patch_only.unwrap_or(false) && !task.patch_only.unwrap_or(false) {
                errs.push(ValidationError::warning(format!(
                    "Task '{}' depends on patch-only task '{}'. Both will only run in patches",
                    task.name, dep.name
                )));
            }
            if !depended_on.patchable.unwrap_or(true) && task.patchable.unwrap_or(true) {
                errs.push(ValidationError::warning(format!(
                    "Task '{}' depends on non-patchable task '{}'. Neither will run in patches",
                    task.name, dep.name
                )));
            }
            if depended_on.git_tag_only.unwrap_or(false) && !task.git_tag_only.unwrap_or(false) {
                errs.push(ValidationError::warning(format!(
                    "Task '{}' depends on git-tag-only task '{}'. Both will only run when \
                     pushing git tags",
                    task.name, dep.name
                )));
            }
        }

        if task.name.contains(',') {
            errs.push(ValidationError::warning(format!(
                "task name '{}' should not contain commas",
                task.name
            )));
        }
        if task.name == ALL_DEPENDENCIES {
            errs.push(ValidationError::warning(
                "task should not be named '*' because it is ambiguous with the all-dependencies \
                 '*' specification",
            ));
        }
        if task.name == "all" {
            errs.push(ValidationError::warning(
                "task should not be named 'all' because it is ambiguous in task specifications \
                 for patches",
            ));
        }
    }
    errs
}

/// Per-variant warnings: empty variants, name hygiene, batch-time
/// contradictions, and shared display names.
pub(crate) fn check_build_variants(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    let mut display_names: BTreeMap<&str, usize> = BTreeMap::new();
    for bv in &project.build_variants {
        *display_names.entry(bv.display_name.as_str()).or_default() += 1;

        if bv.tasks.is_empty() {
            errs.push(ValidationError::warning(format!(
                "buildvariant '{}' contains no tasks",
                bv.name
            )));
        }
        if bv.name.contains(',') {
            errs.push(ValidationError::warning(format!(
                "buildvariant name '{}' should not contain commas",
                bv.name
            )));
        }
        if bv.name == ALL_VARIANTS {
            errs.push(ValidationError::warning(
                "buildvariant should not be named '*' because it is ambiguous with the \
                 all-variants '*' specification",
            ));
        }
        if bv.name == "all" {
            errs.push(ValidationError::warning(
                "buildvariant should not be named 'all' because it is ambiguous in buildvariant \
                 specifications for patches",
            ));
        }
        errs.extend(crate::batchtime::check_batch_times(bv));
    }
    for (display_name, count) in display_names {
        if count > 1 {
            errs.push(ValidationError::warning(format!(
                "{count} build variants share the same display name: '{display_name}'"
            )));
        }
    }
    errs
}
