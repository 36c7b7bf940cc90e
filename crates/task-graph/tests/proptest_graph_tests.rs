//! Property-based tests for dependency graph invariants.
//!
//! These tests verify the behavioral contracts of the graph:
//! - Acyclic graphs never report cycles
//! - Cyclic graphs report cycles whose chains close on themselves
//! - Predicate-gated search stays within the transitive closure

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use trellis_task_graph::{DependencyGraph, TaskNode};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate a valid task name (lowercase alphanumeric with underscores).
fn task_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,10}".prop_map(String::from)
}

/// Generate a DAG as (node, dependencies) pairs over a shared variant.
///
/// The strategy ensures no cycles by only allowing dependencies on nodes
/// with lower indices (nodes added earlier in the sequence).
fn dag_strategy(
    min_tasks: usize,
    max_tasks: usize,
) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (min_tasks..=max_tasks).prop_flat_map(|task_count| {
        proptest::collection::vec(task_name_strategy(), task_count).prop_flat_map(move |names| {
            // Deduplicate names by appending index
            let unique_names: Vec<String> = names
                .into_iter()
                .enumerate()
                .map(|(i, name)| format!("{name}_{i}"))
                .collect();

            let dep_strategies: Vec<_> = (0..task_count)
                .map(|i| {
                    if i == 0 {
                        Just(vec![]).boxed()
                    } else {
                        let earlier_names: Vec<String> = unique_names[..i].to_vec();
                        proptest::collection::vec(
                            proptest::sample::select(earlier_names),
                            0..=i.min(3), // Limit deps to avoid explosion
                        )
                        .prop_map(|deps| {
                            deps.into_iter()
                                .collect::<HashSet<_>>()
                                .into_iter()
                                .collect()
                        })
                        .boxed()
                    }
                })
                .collect();

            let names_clone = unique_names.clone();
            dep_strategies.prop_map(move |all_deps| {
                names_clone
                    .iter()
                    .cloned()
                    .zip(all_deps)
                    .collect::<Vec<_>>()
            })
        })
    })
}

/// Generate a graph that definitely contains a cycle: a chain of tasks
/// where the first depends on the last.
fn cyclic_graph_strategy() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (3..=6_usize).prop_flat_map(|task_count| {
        proptest::collection::vec(task_name_strategy(), task_count).prop_map(move |names| {
            let unique_names: Vec<String> = names
                .into_iter()
                .enumerate()
                .map(|(i, name)| format!("{name}_{i}"))
                .collect();

            (0..task_count)
                .map(|i| {
                    let deps = if i == 0 {
                        vec![unique_names[task_count - 1].clone()]
                    } else {
                        vec![unique_names[i - 1].clone()]
                    };
                    (unique_names[i].clone(), deps)
                })
                .collect()
        })
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

const VARIANT: &str = "linux";

/// Build a DependencyGraph from (name, dependencies) pairs.
fn build_graph(tasks: &[(String, Vec<String>)]) -> DependencyGraph<()> {
    let mut graph = DependencyGraph::new();
    for (name, _) in tasks {
        graph.add_node(TaskNode::new(name.clone(), VARIANT));
    }
    for (name, deps) in tasks {
        for dep in deps {
            graph
                .add_edge(
                    &TaskNode::new(name.clone(), VARIANT),
                    &TaskNode::new(dep.clone(), VARIANT),
                    (),
                )
                .unwrap();
        }
    }
    graph
}

/// Compute the transitive closure of a node by following declared deps.
fn closure_of(start: &str, tasks: &[(String, Vec<String>)]) -> HashSet<String> {
    let dep_map: HashMap<&str, &Vec<String>> = tasks
        .iter()
        .map(|(name, deps)| (name.as_str(), deps))
        .collect();
    let mut seen = HashSet::new();
    let mut frontier = vec![start.to_string()];
    while let Some(current) = frontier.pop() {
        if let Some(deps) = dep_map.get(current.as_str()) {
            for dep in *deps {
                if seen.insert(dep.clone()) {
                    frontier.push(dep.clone());
                }
            }
        }
    }
    seen
}

// =============================================================================
// Property Tests: Cycle Detection
// =============================================================================

proptest! {
    /// Contract: Acyclic graphs report no cycles.
    #[test]
    fn dags_report_no_cycles(tasks in dag_strategy(1, 15)) {
        let graph = build_graph(&tasks);
        prop_assert!(graph.cycles().is_empty(), "DAG should report no cycles");
    }

    /// Contract: Cyclic graphs report at least one cycle, and every
    /// reported chain closes: following one edge per step returns to the
    /// chain's first node.
    #[test]
    fn cyclic_graphs_report_closing_chains(tasks in cyclic_graph_strategy()) {
        let graph = build_graph(&tasks);
        let cycles = graph.cycles();
        prop_assert!(!cycles.is_empty(), "Cyclic graph should report a cycle");

        let dep_map: HashMap<String, HashSet<String>> = tasks
            .iter()
            .map(|(name, deps)| (name.clone(), deps.iter().cloned().collect()))
            .collect();

        for chain in &cycles {
            for (i, node) in chain.iter().enumerate() {
                let next = &chain[(i + 1) % chain.len()];
                prop_assert!(
                    dep_map[&node.name].contains(&next.name),
                    "Chain edge {} -> {} does not exist in the graph",
                    node.name, next.name
                );
            }
        }
    }

    /// Contract: Cycle reporting is deterministic for the same graph.
    #[test]
    fn cycle_reporting_is_deterministic(tasks in cyclic_graph_strategy()) {
        let cycles1 = build_graph(&tasks).cycles();
        let cycles2 = build_graph(&tasks).cycles();
        prop_assert_eq!(cycles1, cycles2);
    }
}

// =============================================================================
// Property Tests: Depth-First Search
// =============================================================================

proptest! {
    /// Contract: An unfiltered search succeeds exactly for targets in the
    /// start node's transitive closure.
    #[test]
    fn dfs_matches_transitive_closure(tasks in dag_strategy(2, 15)) {
        let graph = build_graph(&tasks);
        let (start, _) = &tasks[tasks.len() - 1];
        let closure = closure_of(start, &tasks);

        for (name, _) in &tasks {
            let reached = graph.depth_first_search(
                &TaskNode::new(start.clone(), VARIANT),
                &TaskNode::new(name.clone(), VARIANT),
                |_| true,
            );
            prop_assert_eq!(
                reached,
                closure.contains(name),
                "Reachability of '{}' from '{}' disagrees with closure",
                name, start
            );
        }
    }

    /// Contract: A search that rejects every edge reaches nothing.
    #[test]
    fn dfs_with_closed_filter_reaches_nothing(tasks in dag_strategy(2, 10)) {
        let graph = build_graph(&tasks);
        let (start, _) = &tasks[tasks.len() - 1];

        for (name, _) in &tasks {
            prop_assert!(!graph.depth_first_search(
                &TaskNode::new(start.clone(), VARIANT),
                &TaskNode::new(name.clone(), VARIANT),
                |_| false,
            ));
        }
    }

    /// Contract: No node in a DAG is reachable from itself.
    #[test]
    fn dfs_never_trivially_self_reaches(tasks in dag_strategy(1, 15)) {
        let graph = build_graph(&tasks);
        for (name, _) in &tasks {
            let node = TaskNode::new(name.clone(), VARIANT);
            prop_assert!(
                !graph.depth_first_search(&node, &node, |_| true),
                "'{}' should not reach itself in a DAG",
                name
            );
        }
    }
}

// =============================================================================
// Property Tests: Construction
// =============================================================================

proptest! {
    /// Contract: Node count matches the number of unique nodes added.
    #[test]
    fn node_count_matches_input(tasks in dag_strategy(1, 20)) {
        let graph = build_graph(&tasks);
        prop_assert_eq!(graph.node_count(), tasks.len());
    }

    /// Contract: Edge count matches the number of declared dependencies.
    #[test]
    fn edge_count_matches_declarations(tasks in dag_strategy(1, 15)) {
        let graph = build_graph(&tasks);
        let declared: usize = tasks.iter().map(|(_, deps)| deps.len()).sum();
        prop_assert_eq!(graph.edge_count(), declared);
    }
}
