//! The task-unit index: the expanded, per-variant view of every task.
//!
//! Build variants reference tasks and task groups by name; the index
//! flattens both into one [`TaskUnit`] per (task, variant) pair, with
//! variant-level overrides merged over the project-level definition.
//! Everything downstream of the configuration model operates on this
//! index, never on raw variant entries.

use std::collections::BTreeMap;
use trellis_config::{BuildVariantTask, DependsOn, Project, Requester};
use trellis_task_graph::TaskNode;

/// The merged, per-variant view of one schedulable task.
///
/// Run-condition flags carry the variant entry's override when set and the
/// project-level task definition's value otherwise. A unit exists even for
/// a dangling task reference so validation can keep going; the structural
/// validators report the dangling name separately.
#[derive(Debug, Clone, Default)]
pub struct TaskUnit {
    /// Task name.
    pub name: String,
    /// Owning build variant.
    pub variant: String,
    /// Effective dependency list after variant overrides.
    pub depends_on: Vec<DependsOn>,
    /// When true the task runs only in patch builds.
    pub patch_only: Option<bool>,
    /// When false the task never runs in patch builds.
    pub patchable: Option<bool>,
    /// When true the task runs only for git-tag builds.
    pub git_tag_only: Option<bool>,
    /// When false the task never runs for git-tag builds.
    pub allow_for_git_tag: Option<bool>,
    /// Name of the task group this unit was expanded from, if any.
    pub task_group: Option<String>,
}

impl TaskUnit {
    /// The (task, variant) identity of this unit.
    #[must_use]
    pub fn node(&self) -> TaskNode {
        TaskNode::new(self.name.clone(), self.variant.clone())
    }

    /// Whether this unit is excluded from patch builds.
    #[must_use]
    pub fn skip_on_patch_build(&self) -> bool {
        !self.patchable.unwrap_or(true) || self.git_tag_only.unwrap_or(false)
    }

    /// Whether this unit is excluded from non-patch builds.
    #[must_use]
    pub fn skip_on_non_patch_build(&self) -> bool {
        self.patch_only.unwrap_or(false)
    }

    /// Whether this unit is excluded from git-tag builds.
    #[must_use]
    pub fn skip_on_git_tag_build(&self) -> bool {
        !self.allow_for_git_tag.unwrap_or(true)
    }

    /// Whether this unit is excluded from builds that are not git-tag builds.
    #[must_use]
    pub fn skip_on_non_git_tag_build(&self) -> bool {
        self.git_tag_only.unwrap_or(false)
    }

    /// Whether this unit is excluded from builds under the given requester.
    #[must_use]
    pub fn skip_on_requester(&self, requester: Requester) -> bool {
        (requester.is_patch() && self.skip_on_patch_build())
            || (!requester.is_patch() && self.skip_on_non_patch_build())
            || (requester.is_git_tag() && self.skip_on_git_tag_build())
            || (!requester.is_git_tag() && self.skip_on_non_git_tag_build())
    }
}

/// Build the task-unit index for one configuration snapshot.
///
/// Task-group references expand into one unit per member task, with the
/// group entry's overrides applied to every member. Later entries for the
/// same (task, variant) pair replace earlier ones, matching how the
/// scheduler resolves duplicates; the duplicate itself is reported by a
/// structural validator.
#[must_use]
pub fn tv_to_task_unit(project: &Project) -> BTreeMap<TaskNode, TaskUnit> {
    let mut units = BTreeMap::new();
    for bv in &project.build_variants {
        for entry in &bv.tasks {
            if let Some(group) = project.find_task_group(&entry.name) {
                for member in &group.tasks {
                    let unit = merge(project, &bv.name, member, entry, Some(group.name.clone()));
                    units.insert(unit.node(), unit);
                }
            } else {
                let unit = merge(project, &bv.name, &entry.name, entry, None);
                units.insert(unit.node(), unit);
            }
        }
    }
    units
}

fn merge(
    project: &Project,
    variant: &str,
    task_name: &str,
    entry: &BuildVariantTask,
    task_group: Option<String>,
) -> TaskUnit {
    let def = project.find_task(task_name);
    TaskUnit {
        name: task_name.to_string(),
        variant: variant.to_string(),
        depends_on: entry
            .depends_on
            .clone()
            .or_else(|| def.map(|d| d.depends_on.clone()))
            .unwrap_or_default(),
        patch_only: entry.patch_only.or_else(|| def.and_then(|d| d.patch_only)),
        patchable: entry.patchable.or_else(|| def.and_then(|d| d.patchable)),
        git_tag_only: entry
            .git_tag_only
            .or_else(|| def.and_then(|d| d.git_tag_only)),
        allow_for_git_tag: entry
            .allow_for_git_tag
            .or_else(|| def.and_then(|d| d.allow_for_git_tag)),
        task_group,
    }
}
