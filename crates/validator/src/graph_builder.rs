//! Dependency graph construction from the task-unit index.
//!
//! Wildcard selectors are resolved here, before any edge reaches the
//! graph: the finalized graph contains only concrete (task, variant)
//! endpoints. Construction is total; a dependency that resolves to
//! nothing produces no edge, and the dangling name is reported by the
//! structural validators instead.

use crate::ValidationError;
use crate::index::{TaskUnit, tv_to_task_unit};
use std::collections::BTreeMap;
use tracing::debug;
use trellis_config::{ALL_DEPENDENCIES, ALL_VARIANTS, DependencyStatus, DependsOn, Project};
use trellis_task_graph::{DependencyGraph, TaskNode};

/// Edge weight: the qualifiers a declared dependency carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Required completion status; `None` means success-or-failure.
    pub required_status: Option<DependencyStatus>,
    /// When true the dependency is waived for patch builds.
    pub patch_optional: bool,
}

/// Build the dependency graph for one configuration snapshot.
#[must_use]
pub fn build_dependency_graph(project: &Project) -> DependencyGraph<DependencyEdge> {
    build_graph_from_units(&tv_to_task_unit(project))
}

pub(crate) fn build_graph_from_units(
    units: &BTreeMap<TaskNode, TaskUnit>,
) -> DependencyGraph<DependencyEdge> {
    let mut graph = DependencyGraph::new();
    for node in units.keys() {
        graph.add_node(node.clone());
    }
    for (node, unit) in units {
        for dep in &unit.depends_on {
            let edge = DependencyEdge {
                required_status: dep.status,
                patch_optional: dep.patch_optional,
            };
            for target in resolve_dependency(units, node, dep) {
                if let Err(err) = graph.add_edge(node, &target, edge) {
                    debug!(%err, "skipped dependency edge");
                }
            }
        }
    }
    graph
}

/// Resolve one declared dependency into the concrete nodes it targets.
///
/// An unset variant means the dependent's own variant; the all-tasks
/// wildcard covers every task in the target variant except the dependent
/// itself; the all-variants wildcard covers every variant defining the
/// named task.
fn resolve_dependency(
    units: &BTreeMap<TaskNode, TaskUnit>,
    from: &TaskNode,
    dep: &DependsOn,
) -> Vec<TaskNode> {
    let variant = dep.variant.as_deref().unwrap_or(&from.variant);
    if dep.name == ALL_DEPENDENCIES {
        units
            .keys()
            .filter(|node| *node != from && (variant == ALL_VARIANTS || node.variant == variant))
            .cloned()
            .collect()
    } else if variant == ALL_VARIANTS {
        units
            .keys()
            .filter(|node| *node != from && node.name == dep.name)
            .cloned()
            .collect()
    } else {
        let target = TaskNode::new(dep.name.clone(), variant);
        if units.contains_key(&target) {
            vec![target]
        } else {
            Vec::new()
        }
    }
}

/// The structural gate: any dependency cycle blocks the configuration.
pub(crate) fn validate_dependency_graph(project: &Project) -> Vec<ValidationError> {
    let graph = build_dependency_graph(project);
    graph
        .cycles()
        .iter()
        .map(|cycle| {
            let nodes: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            ValidationError::error(format!(
                "tasks [{}] form a dependency cycle",
                nodes.join(", ")
            ))
        })
        .collect()
}
