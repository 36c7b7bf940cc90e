//! Project configuration types.
//!
//! A [`Project`] is one immutable configuration snapshot. All lookup helpers
//! are read-only; the validation engine never mutates a project after the
//! parser hands it over.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Completion status a dependency requires of the task it depends on.
///
/// An unset status on [`DependsOn`] means "success or failure" (the task
/// finished at all), which is distinct from [`DependencyStatus::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// The depended-on task must succeed.
    Success,
    /// The depended-on task must fail.
    Failed,
    /// Any outcome satisfies the dependency, including being deactivated.
    #[serde(rename = "*")]
    Any,
}

/// A declared dependency of one task on another.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DependsOn {
    /// Depended-on task name, or [`crate::ALL_DEPENDENCIES`].
    pub name: String,
    /// Depended-on variant. `None` means the dependent's own variant;
    /// [`crate::ALL_VARIANTS`] means every variant defining the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Required completion status; `None` means success-or-failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DependencyStatus>,
    /// When true the dependency is waived for patch builds.
    #[serde(default)]
    pub patch_optional: bool,
}

/// One command invocation in a task, function, or group hook.
///
/// Exactly one of `command` and `function` should be set; the structural
/// validators flag entries that set both or neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginCommand {
    /// Built-in command name, e.g. `"s3.pull"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Name of a project function to expand in place of a command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Command parameters, uninterpreted by the validation engine except
    /// where an ordering contract reads them (artifact pull).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
    /// Variant names this command is restricted to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}

impl PluginCommand {
    /// Whether this command runs for the given build variant.
    #[must_use]
    pub fn runs_on_variant(&self, variant: &str) -> bool {
        self.variants.is_empty() || self.variants.iter().any(|v| v == variant)
    }
}

/// A task definition at the project level, shared across variants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectTask {
    /// Task name; referenced by variants and dependencies.
    pub name: String,
    /// Tags used by alias selectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Project-level dependency list; variants may override it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependsOn>,
    /// When true the task runs only in patch builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_only: Option<bool>,
    /// When false the task never runs in patch builds. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patchable: Option<bool>,
    /// When true the task runs only for git-tag builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_tag_only: Option<bool>,
    /// When false the task never runs for git-tag builds. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_for_git_tag: Option<bool>,
    /// Default run targets (distro or container names).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_on: Vec<String>,
    /// Ordered command list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<PluginCommand>,
}

/// A named group of tasks sharing setup/teardown hooks and hosts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskGroup {
    /// Group name; usable wherever a task name is expected in a variant.
    pub name: String,
    /// Maximum hosts the group may fan out across.
    #[serde(default = "default_max_hosts")]
    pub max_hosts: i64,
    /// Member task names, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,
    /// Commands run once before the first member on a host.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup_group: Vec<PluginCommand>,
    /// Commands run once after the last member on a host.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown_group: Vec<PluginCommand>,
    /// Commands run before each member task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup_task: Vec<PluginCommand>,
    /// Commands run after each member task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown_task: Vec<PluginCommand>,
}

fn default_max_hosts() -> i64 {
    1
}

/// A task reference inside a build variant, with per-variant overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildVariantTask {
    /// Task or task-group name.
    pub name: String,
    /// True when `name` refers to a task group.
    #[serde(default)]
    pub is_group: bool,
    /// Overrides the project-level dependency list when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<DependsOn>>,
    /// See [`ProjectTask::patch_only`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_only: Option<bool>,
    /// See [`ProjectTask::patchable`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patchable: Option<bool>,
    /// See [`ProjectTask::git_tag_only`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_tag_only: Option<bool>,
    /// See [`ProjectTask::allow_for_git_tag`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_for_git_tag: Option<bool>,
    /// Run targets overriding the variant default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_on: Vec<String>,
    /// Fixed scheduling interval in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batchtime: Option<i64>,
    /// Cron expression controlling scheduling; exclusive with `batchtime`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_batchtime: Option<String>,
    /// Explicit activation flag; ignored when a batch time is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate: Option<bool>,
}

/// One build variant: a named configuration under which tasks run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildVariant {
    /// Variant name; half of every task-unit identity.
    pub name: String,
    /// Human-readable name shown in UIs.
    #[serde(default)]
    pub display_name: String,
    /// Tags used by alias selectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Default run targets for tasks in this variant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_on: Vec<String>,
    /// Tasks and task groups scheduled under this variant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<BuildVariantTask>,
    /// Fixed scheduling interval in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batchtime: Option<i64>,
    /// Cron expression controlling scheduling; exclusive with `batchtime`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_batchtime: Option<String>,
    /// Explicit activation flag; ignored when a batch time is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate: Option<bool>,
}

/// A container definition tasks may name in `run_on`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    /// Container name; collides with distro names at validation time.
    pub name: String,
}

/// One parsed, normalized project configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier, used only in diagnostics.
    #[serde(default)]
    pub identifier: String,
    /// All build variants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_variants: Vec<BuildVariant>,
    /// All project-level task definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<ProjectTask>,
    /// All task groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_groups: Vec<TaskGroup>,
    /// Commands run before every task outside a task group; groups use
    /// their own setup hooks instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<PluginCommand>,
    /// Commands run after every task outside a task group; groups use
    /// their own teardown hooks instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<PluginCommand>,
    /// Named command-list functions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, Vec<PluginCommand>>,
    /// Containers available as run targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
}

/// Project-level settings flags supplied alongside the configuration.
///
/// These come from project administration, not from the configuration file,
/// and parameterize the validators that need platform knowledge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Whether the artifact push/pull command pair is enabled for this project.
    #[serde(default)]
    pub artifact_sync_enabled: bool,
    /// Known distro identifiers, for `run_on` referential integrity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distro_ids: Vec<String>,
    /// Known distro aliases, also valid in `run_on`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distro_aliases: Vec<String>,
}

impl Project {
    /// Look up a project-level task definition by exact name.
    #[must_use]
    pub fn find_task(&self, name: &str) -> Option<&ProjectTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Look up a build variant by exact name.
    #[must_use]
    pub fn find_build_variant(&self, name: &str) -> Option<&BuildVariant> {
        self.build_variants.iter().find(|bv| bv.name == name)
    }

    /// Look up a task group by exact name.
    #[must_use]
    pub fn find_task_group(&self, name: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|tg| tg.name == name)
    }

    /// Resolve the display name and tags for a variant task entry.
    ///
    /// For a task-group entry the group's name is returned with no tags;
    /// member tasks carry their own tags and are resolved separately during
    /// group expansion. Returns `None` for a dangling reference.
    #[must_use]
    pub fn task_name_and_tags(&self, entry: &BuildVariantTask) -> Option<(&str, &[String])> {
        if entry.is_group || self.find_task_group(&entry.name).is_some() {
            self.find_task_group(&entry.name)
                .map(|tg| (tg.name.as_str(), &[] as &[String]))
        } else {
            self.find_task(&entry.name)
                .map(|t| (t.name.as_str(), t.tags.as_slice()))
        }
    }

    /// Expand a command list one level: function references are replaced by
    /// the referenced function's commands. Unknown functions expand to
    /// nothing; the structural validators report them.
    #[must_use]
    pub fn expand_commands<'a>(&'a self, commands: &'a [PluginCommand]) -> Vec<&'a PluginCommand> {
        let mut expanded = Vec::new();
        for cmd in commands {
            match &cmd.function {
                Some(func) => {
                    if let Some(list) = self.functions.get(func) {
                        expanded.extend(list.iter());
                    }
                }
                None => expanded.push(cmd),
            }
        }
        expanded
    }

    /// Count, per task name, how many times each task's expanded command
    /// list invokes the named command.
    #[must_use]
    pub fn tasks_that_call_command(&self, command: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for task in &self.tasks {
            let calls = self
                .expand_commands(&task.commands)
                .iter()
                .filter(|c| c.command.as_deref() == Some(command))
                .count();
            if calls > 0 {
                counts.insert(task.name.clone(), calls);
            }
        }
        counts
    }

    /// Collect the commands with the given name that the task would run
    /// under the given variant, honoring per-command variant restrictions.
    #[must_use]
    pub fn commands_run_on_tv(
        &self,
        task_name: &str,
        variant: &str,
        command: &str,
    ) -> Vec<&PluginCommand> {
        let Some(task) = self.find_task(task_name) else {
            return Vec::new();
        };
        self.expand_commands(&task.commands)
            .into_iter()
            .filter(|c| c.command.as_deref() == Some(command) && c.runs_on_variant(variant))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_command(name: &str) -> PluginCommand {
        PluginCommand {
            command: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_find_helpers_are_exact_and_case_sensitive() {
        let project = Project {
            tasks: vec![ProjectTask {
                name: "compile".to_string(),
                ..Default::default()
            }],
            build_variants: vec![BuildVariant {
                name: "ubuntu".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert!(project.find_task("compile").is_some());
        assert!(project.find_task("Compile").is_none());
        assert!(project.find_build_variant("ubuntu").is_some());
        assert!(project.find_build_variant("ubuntu ").is_none());
    }

    #[test]
    fn test_expand_commands_inlines_functions() {
        let mut functions = BTreeMap::new();
        functions.insert(
            "fetch".to_string(),
            vec![push_command("git.get_project"), push_command("s3.pull")],
        );
        let project = Project {
            functions,
            ..Default::default()
        };

        let commands = vec![
            PluginCommand {
                function: Some("fetch".to_string()),
                ..Default::default()
            },
            push_command("shell.exec"),
        ];
        let expanded = project.expand_commands(&commands);
        let names: Vec<_> = expanded
            .iter()
            .filter_map(|c| c.command.as_deref())
            .collect();
        assert_eq!(names, vec!["git.get_project", "s3.pull", "shell.exec"]);
    }

    #[test]
    fn test_tasks_that_call_command_counts_through_functions() {
        let mut functions = BTreeMap::new();
        functions.insert("make-host".to_string(), vec![push_command("host.create")]);
        let project = Project {
            functions,
            tasks: vec![ProjectTask {
                name: "spawn".to_string(),
                commands: vec![
                    PluginCommand {
                        function: Some("make-host".to_string()),
                        ..Default::default()
                    },
                    push_command("host.create"),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let counts = project.tasks_that_call_command("host.create");
        assert_eq!(counts.get("spawn"), Some(&2));
    }

    #[test]
    fn test_commands_run_on_tv_honors_variant_restriction() {
        let project = Project {
            tasks: vec![ProjectTask {
                name: "pull".to_string(),
                commands: vec![
                    PluginCommand {
                        command: Some("s3.pull".to_string()),
                        variants: vec!["arm".to_string()],
                        ..Default::default()
                    },
                    push_command("s3.pull"),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(project.commands_run_on_tv("pull", "arm", "s3.pull").len(), 2);
        assert_eq!(project.commands_run_on_tv("pull", "x86", "s3.pull").len(), 1);
        assert!(project.commands_run_on_tv("missing", "arm", "s3.pull").is_empty());
    }

    #[test]
    fn test_dependency_status_serialization() {
        let dep = DependsOn {
            name: "compile".to_string(),
            status: Some(DependencyStatus::Any),
            ..Default::default()
        };
        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains("\"*\""));

        let unset: DependsOn = serde_json::from_str("{\"name\":\"compile\"}").unwrap();
        assert_eq!(unset.status, None);
        assert!(!unset.patch_optional);
    }
}
