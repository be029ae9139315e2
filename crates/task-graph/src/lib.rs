//! Target graph DAG algorithms and dependency closure for keel.
//!
//! This crate provides an arena-indexed directed graph for target
//! dependency resolution and execution ordering on top of petgraph.
//!
//! # Key Types
//!
//! - [`TargetGraph`]: The graph structure for building and querying target dependencies
//! - [`TargetNodeData`]: Trait that node payloads implement to expose their dependencies
//! - [`GraphNode`]: A node in the graph containing the target name and data
//!
//! # Example
//!
//! ```ignore
//! use keel_task_graph::{TargetGraph, TargetNodeData};
//!
//! struct Decl {
//!     depends_on: Vec<String>,
//! }
//!
//! impl TargetNodeData for Decl {
//!     fn dependency_names(&self) -> impl Iterator<Item = &str> {
//!         self.depends_on.iter().map(String::as_str)
//!     }
//! }
//!
//! let mut graph = TargetGraph::from_nodes([
//!     ("Restore".to_string(), Decl { depends_on: vec![] }),
//!     ("Build".to_string(), Decl { depends_on: vec!["Restore".to_string()] }),
//! ])?;
//! graph.add_dependency_edges()?;
//! let order = graph.topological_order()?;
//! ```

mod error;
mod graph;
mod traversal;

pub use error::{Error, Result};
pub use graph::{GraphNode, TargetGraph};
pub use petgraph::graph::NodeIndex;
pub use traversal::TopologicalOrder;

/// Trait for node payloads stored in a [`TargetGraph`].
pub trait TargetNodeData {
    /// Returns the names of the targets this node depends on.
    fn dependency_names(&self) -> impl Iterator<Item = &str>;
}
