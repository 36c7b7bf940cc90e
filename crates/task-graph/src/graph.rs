//! The task-variant dependency graph.
//!
//! Built once per validation pass from the task-unit index, then queried
//! read-only: cycle enumeration for the structural gate and predicate-gated
//! depth-first search for ordering contracts.

use crate::{Error, Result};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// The (task, variant) identity of one schedulable unit of work.
///
/// Two nodes with equal fields are the same node; the graph deduplicates
/// on insertion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskNode {
    /// Task name.
    pub name: String,
    /// Build variant name.
    pub variant: String,
}

impl TaskNode {
    /// Create a node from a task and variant name.
    #[must_use]
    pub fn new(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' in build variant '{}'", self.name, self.variant)
    }
}

/// One edge as seen by a search predicate.
///
/// `from` is the dependent node, `to` the node it depends on.
#[derive(Debug, Clone, Copy)]
pub struct EdgeCrossing<'a, E> {
    /// The dependent node the search is leaving.
    pub from: &'a TaskNode,
    /// The depended-on node the edge points at.
    pub to: &'a TaskNode,
    /// The caller-supplied edge weight.
    pub weight: &'a E,
}

/// Directed dependency graph over task-variant pairs.
///
/// The edge weight type `E` carries whatever the builder needs a search
/// predicate to see (required status, patch optionality). The graph is
/// append-only during construction and immutable afterwards; none of the
/// query methods mutate it.
#[derive(Debug, Clone)]
pub struct DependencyGraph<E> {
    graph: DiGraph<TaskNode, E>,
    node_index: HashMap<TaskNode, NodeIndex>,
}

impl<E> DependencyGraph<E> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
        }
    }

    /// Add a node, returning its index. Adding the same (task, variant)
    /// pair twice returns the existing index.
    pub fn add_node(&mut self, node: TaskNode) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node) {
            return idx;
        }
        debug!(task = %node.name, variant = %node.variant, "added graph node");
        let idx = self.graph.add_node(node.clone());
        self.node_index.insert(node, idx);
        idx
    }

    /// Add a directed edge from the dependent node to the node it depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingEndpoint`] if either endpoint has not been
    /// added; wildcard selectors must be resolved to concrete nodes before
    /// edges are emitted.
    pub fn add_edge(&mut self, from: &TaskNode, to: &TaskNode, weight: E) -> Result<()> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        self.graph.add_edge(from_idx, to_idx, weight);
        Ok(())
    }

    fn index_of(&self, node: &TaskNode) -> Result<NodeIndex> {
        self.node_index
            .get(node)
            .copied()
            .ok_or_else(|| Error::MissingEndpoint {
                task: node.name.clone(),
                variant: node.variant.clone(),
            })
    }

    /// Whether the node set contains the given (task, variant) pair.
    #[must_use]
    pub fn contains(&self, node: &TaskNode) -> bool {
        self.node_index.contains_key(node)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges, counting duplicates between the same ordered pair.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph.node_weights()
    }

    /// Iterate over the outgoing edges of a node. Unknown nodes yield
    /// nothing.
    pub fn dependencies_of<'a>(
        &'a self,
        node: &TaskNode,
    ) -> impl Iterator<Item = (&'a TaskNode, &'a E)> {
        self.node_index
            .get(node)
            .into_iter()
            .flat_map(move |&idx| {
                self.graph
                    .edges_directed(idx, Direction::Outgoing)
                    .map(|e| (&self.graph[e.target()], e.weight()))
            })
    }

    /// Find all elementary cycles.
    ///
    /// Uses Tarjan's strongly-connected-component decomposition: every
    /// component with two or more nodes contributes one elementary cycle,
    /// rendered as an ordered node chain that returns to its first node,
    /// and a node with a self-loop edge is a one-node cycle. All disjoint
    /// cycles are reported in a single pass; an acyclic graph yields an
    /// empty set.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<TaskNode>> {
        let mut cycles = Vec::new();
        for component in tarjan_scc(&self.graph) {
            if component.len() > 1 {
                cycles.push(self.cycle_within(&component));
            } else if let Some(&only) = component.first() {
                if self.graph.find_edge(only, only).is_some() {
                    cycles.push(vec![self.graph[only].clone()]);
                }
            }
        }
        cycles
    }

    /// Extract one elementary cycle from a strongly connected component of
    /// two or more nodes by running a DFS restricted to the component and
    /// cutting the path at the first back edge.
    fn cycle_within(&self, component: &[NodeIndex]) -> Vec<TaskNode> {
        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let start = component[0];

        let mut path = vec![start];
        let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
        let mut visited = on_path.clone();
        let mut neighbor_stack = vec![self.graph.neighbors(start)];

        while let Some(neighbors) = neighbor_stack.last_mut() {
            match neighbors.next() {
                Some(next) if members.contains(&next) => {
                    if on_path.contains(&next) {
                        let pos = path.iter().position(|&p| p == next).unwrap_or(0);
                        return path[pos..].iter().map(|&i| self.graph[i].clone()).collect();
                    }
                    if visited.insert(next) {
                        on_path.insert(next);
                        path.push(next);
                        neighbor_stack.push(self.graph.neighbors(next));
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(done) = path.pop() {
                        on_path.remove(&done);
                    }
                    neighbor_stack.pop();
                }
            }
        }

        // A strongly connected component always closes a cycle through the
        // DFS above; this fallback is unreachable on a well-formed graph.
        component.iter().map(|&i| self.graph[i].clone()).collect()
    }

    /// Depth-first search from `start` toward `target`, following an edge
    /// only when `traversable` approves it.
    ///
    /// Returns true the first time `target` is reached over an approved
    /// edge. A node is not trivially reachable from itself: searching from
    /// a node to itself succeeds only through a self-loop or a longer
    /// cycle. Unknown start or target nodes are unreachable.
    pub fn depth_first_search<F>(&self, start: &TaskNode, target: &TaskNode, mut traversable: F) -> bool
    where
        F: FnMut(EdgeCrossing<'_, E>) -> bool,
    {
        let (Some(&start_idx), Some(&target_idx)) =
            (self.node_index.get(start), self.node_index.get(target))
        else {
            return false;
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        visited.insert(start_idx);
        let mut to_process = vec![start_idx];

        while let Some(current) = to_process.pop() {
            for edge in self.graph.edges_directed(current, Direction::Outgoing) {
                let crossing = EdgeCrossing {
                    from: &self.graph[current],
                    to: &self.graph[edge.target()],
                    weight: edge.weight(),
                };
                if !traversable(crossing) {
                    continue;
                }
                if edge.target() == target_idx {
                    return true;
                }
                if visited.insert(edge.target()) {
                    to_process.push(edge.target());
                }
            }
        }
        false
    }
}

impl<E> Default for DependencyGraph<E> {
    fn default() -> Self {
        Self::new()
    }
}
