//! Target graph builder using petgraph.
//!
//! The graph is an arena: every target lives at a [`NodeIndex`] and all
//! bookkeeping (dependency lists, traversal marks) is indexed by it.

use crate::{Error, Result, TargetNodeData};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::IntoNodeReferences;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A node in the target graph.
#[derive(Debug, Clone)]
pub struct GraphNode<T> {
    /// Name of the target.
    pub name: String,
    /// The node payload.
    pub data: T,
}

/// Target graph for dependency resolution and execution ordering.
///
/// Edges point from a dependent to its dependency. The ordered dependency
/// list of every node is kept alongside the petgraph arena so traversals
/// honour declaration order, which petgraph's neighbour iteration does not.
pub struct TargetGraph<T: TargetNodeData> {
    graph: DiGraph<GraphNode<T>, ()>,
    name_to_node: HashMap<String, NodeIndex>,
    dependencies: Vec<Vec<NodeIndex>>,
}

impl<T: TargetNodeData> TargetGraph<T> {
    /// Create a new empty target graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_node: HashMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Build a graph from every declared node.
    ///
    /// All duplicate names are collected before failing so a single error
    /// reports every offender.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTargets`] if any name occurs more than once.
    pub fn from_nodes(nodes: impl IntoIterator<Item = (String, T)>) -> Result<Self> {
        let mut graph = Self::new();
        let mut duplicates: Vec<String> = Vec::new();

        for (name, data) in nodes {
            if graph.name_to_node.contains_key(&name) {
                if !duplicates.contains(&name) {
                    duplicates.push(name);
                }
                continue;
            }
            graph.insert(name, data);
        }

        if duplicates.is_empty() {
            Ok(graph)
        } else {
            Err(Error::DuplicateTargets { names: duplicates })
        }
    }

    /// Add a single target to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTargets`] if the name is already present.
    pub fn add_target(&mut self, name: &str, data: T) -> Result<NodeIndex> {
        if self.name_to_node.contains_key(name) {
            return Err(Error::DuplicateTargets {
                names: vec![name.to_string()],
            });
        }
        Ok(self.insert(name.to_string(), data))
    }

    fn insert(&mut self, name: String, data: T) -> NodeIndex {
        debug!("Added target node '{}'", name);
        let index = self.graph.add_node(GraphNode {
            name: name.clone(),
            data,
        });
        self.name_to_node.insert(name, index);
        self.dependencies.push(Vec::new());
        index
    }

    /// Materialize dependency edges after all targets have been added.
    ///
    /// Repeated references to the same dependency collapse into one edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependencies`] listing every (target, dependency)
    /// pair whose dependency was never declared.
    pub fn add_dependency_edges(&mut self) -> Result<()> {
        let mut missing = Vec::new();
        let mut resolved: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();

        for (index, node) in self.graph.node_references() {
            let mut deps: Vec<NodeIndex> = Vec::new();
            for dep_name in node.data.dependency_names() {
                match self.name_to_node.get(dep_name) {
                    Some(&dep) => {
                        if !deps.contains(&dep) {
                            deps.push(dep);
                        }
                    }
                    None => missing.push((node.name.clone(), dep_name.to_string())),
                }
            }
            resolved.push((index, deps));
        }

        if !missing.is_empty() {
            return Err(Error::MissingDependencies { missing });
        }

        for (index, deps) in resolved {
            for &dep in &deps {
                self.graph.add_edge(index, dep, ());
            }
            self.dependencies[index.index()] = deps;
        }

        Ok(())
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Direct dependencies of a node, in declaration order.
    #[must_use]
    pub fn dependencies_of(&self, index: NodeIndex) -> &[NodeIndex] {
        self.dependencies
            .get(index.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Nodes that directly depend on the given node.
    #[must_use]
    pub fn dependents_of(&self, index: NodeIndex) -> HashSet<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .collect()
    }

    /// Get a node by index.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&GraphNode<T>> {
        self.graph.node_weight(index)
    }

    /// Get a node by name.
    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<&GraphNode<T>> {
        self.name_to_node
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Get the node index for a target by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.name_to_node.get(name).copied()
    }

    /// Check if a target exists in the graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// Number of targets in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph holds no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All node indices in insertion order.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Iterate over all nodes in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode<T>)> {
        self.graph.node_references()
    }

    /// Consume the graph, yielding every node with its resolved dependencies
    /// in insertion order (position `i` holds the node at `NodeIndex::new(i)`).
    #[must_use]
    pub fn into_nodes(self) -> Vec<(GraphNode<T>, Vec<NodeIndex>)> {
        let (nodes, _) = self.graph.into_nodes_edges();
        nodes
            .into_iter()
            .map(|node| node.weight)
            .zip(self.dependencies)
            .collect()
    }
}

impl<T: TargetNodeData> Default for TargetGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}
