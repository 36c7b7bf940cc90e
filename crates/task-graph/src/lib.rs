//! Dependency graph algorithms over the task×variant product space.
//!
//! This crate provides the directed graph the trellis validation engine
//! builds from a project configuration, using petgraph. Nodes are
//! (task, variant) pairs; edge weights are chosen by the caller so the
//! graph stays independent of the configuration model.
//!
//! # Key Types
//!
//! - [`TaskNode`]: the (task, variant) identity of one schedulable unit
//! - [`DependencyGraph`]: the graph itself, read-only once built
//! - [`EdgeCrossing`]: the view handed to a search predicate per edge
//!
//! # Example
//!
//! ```
//! use trellis_task_graph::{DependencyGraph, TaskNode};
//!
//! let mut graph: DependencyGraph<()> = DependencyGraph::new();
//! let compile = TaskNode::new("compile", "linux");
//! let test = TaskNode::new("test", "linux");
//! graph.add_node(compile.clone());
//! graph.add_node(test.clone());
//! graph.add_edge(&test, &compile, ()).unwrap();
//!
//! assert!(graph.cycles().is_empty());
//! assert!(graph.depth_first_search(&test, &compile, |_| true));
//! ```

mod error;
mod graph;

pub use error::{Error, Result};
pub use graph::{DependencyGraph, EdgeCrossing, TaskNode};
