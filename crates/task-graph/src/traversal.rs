//! Traversal algorithms for target graphs.
//!
//! Both algorithms work on the arena indices of [`TargetGraph`] and never
//! recurse, so graph depth is bounded only by memory.

use crate::{Error, Result, TargetGraph, TargetNodeData};
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Node indices ordered so that every dependency precedes its dependents.
pub type TopologicalOrder = Vec<NodeIndex>;

/// Traversal mark for the three-state depth-first search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl<T: TargetNodeData> TargetGraph<T> {
    /// Order all targets so dependencies come before dependents.
    ///
    /// Runs an explicit-stack depth-first search over dependency edges,
    /// starting from each node in insertion order and following each node's
    /// dependencies in declaration order. A node is emitted when all of its
    /// dependencies are done (post-order over dependency edges, which is the
    /// reverse post-order over dependent edges).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] with the cycle path in traversal
    /// order when a node still in progress is reached again.
    pub fn topological_order(&self) -> Result<TopologicalOrder> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut order = Vec::with_capacity(self.len());
        let mut stack: Vec<(NodeIndex, usize)> = Vec::new();

        for root in self.node_indices() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            marks[root.index()] = Mark::InProgress;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                if let Some(&dep) = self.dependencies_of(node).get(next) {
                    frame.1 += 1;
                    match marks[dep.index()] {
                        Mark::Unvisited => {
                            marks[dep.index()] = Mark::InProgress;
                            stack.push((dep, 0));
                        }
                        Mark::InProgress => return Err(self.cycle_error(&stack, dep)),
                        Mark::Done => {}
                    }
                } else {
                    marks[node.index()] = Mark::Done;
                    order.push(node);
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    fn cycle_error(&self, stack: &[(NodeIndex, usize)], reentered: NodeIndex) -> Error {
        let start = stack
            .iter()
            .position(|(node, _)| *node == reentered)
            .unwrap_or(0);
        let path = stack[start..]
            .iter()
            .map(|(node, _)| *node)
            .chain(std::iter::once(reentered))
            .filter_map(|node| self.node(node).map(|n| n.name.clone()))
            .collect();
        Error::CycleDetected { path }
    }

    /// Expand a seed set to include every transitive dependency.
    ///
    /// Repeatedly scans the included nodes and adds any dependency not yet
    /// included until a full pass adds nothing. Terminates because the set
    /// only grows and is bounded by the node count.
    #[must_use]
    pub fn dependency_closure(
        &self,
        seeds: impl IntoIterator<Item = NodeIndex>,
    ) -> HashSet<NodeIndex> {
        let mut included = vec![false; self.len()];
        for seed in seeds {
            if let Some(slot) = included.get_mut(seed.index()) {
                *slot = true;
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for node in self.node_indices() {
                if !included[node.index()] {
                    continue;
                }
                for &dep in self.dependencies_of(node) {
                    if !included[dep.index()] {
                        included[dep.index()] = true;
                        changed = true;
                    }
                }
            }
        }

        included
            .iter()
            .enumerate()
            .filter(|(_, inside)| **inside)
            .map(|(i, _)| NodeIndex::new(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct TestTarget(Vec<String>);

    impl TargetNodeData for TestTarget {
        fn dependency_names(&self) -> impl Iterator<Item = &str> {
            self.0.iter().map(String::as_str)
        }
    }

    fn graph(layout: &[(&str, &[&str])]) -> TargetGraph<TestTarget> {
        let mut graph = TargetGraph::from_nodes(layout.iter().map(|(name, deps)| {
            (
                (*name).to_string(),
                TestTarget(deps.iter().map(|d| (*d).to_string()).collect()),
            )
        }))
        .unwrap();
        graph.add_dependency_edges().unwrap();
        graph
    }

    fn names(graph: &TargetGraph<TestTarget>, order: &[NodeIndex]) -> Vec<String> {
        order
            .iter()
            .map(|&i| graph.node(i).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_order_is_dependencies_first() {
        let g = graph(&[
            ("Publish", &["Test"]),
            ("Test", &["Build"]),
            ("Build", &["Restore"]),
            ("Restore", &[]),
        ]);
        let order = g.topological_order().unwrap();
        assert_eq!(names(&g, &order), vec!["Restore", "Build", "Test", "Publish"]);
    }

    #[test]
    fn test_diamond_visits_shared_dependency_once() {
        let g = graph(&[
            ("root", &[]),
            ("left", &["root"]),
            ("right", &["root"]),
            ("join", &["left", "right"]),
        ]);
        let order = g.topological_order().unwrap();
        assert_eq!(names(&g, &order), vec!["root", "left", "right", "join"]);
    }

    #[test]
    fn test_direct_cycle_path() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        let err = g.topological_order().unwrap_err();
        assert_eq!(
            err,
            Error::CycleDetected {
                path: vec!["A".into(), "B".into(), "A".into()]
            }
        );
    }

    #[test]
    fn test_indirect_cycle_path_excludes_entry_prefix() {
        let g = graph(&[
            ("entry", &["x"]),
            ("x", &["y"]),
            ("y", &["z"]),
            ("z", &["x"]),
        ]);
        let err = g.topological_order().unwrap_err();
        assert_eq!(
            err,
            Error::CycleDetected {
                path: vec!["x".into(), "y".into(), "z".into(), "x".into()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let g = graph(&[("Loop", &["Loop"])]);
        let err = g.topological_order().unwrap_err();
        assert_eq!(
            err,
            Error::CycleDetected {
                path: vec!["Loop".into(), "Loop".into()]
            }
        );
    }

    #[test]
    fn test_closure_is_transitive() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let closure = g.dependency_closure([g.index_of("c").unwrap()]);
        let mut found = names(&g, &closure.into_iter().collect::<Vec<_>>());
        found.sort();
        assert_eq!(found, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_closure_of_nothing_is_empty() {
        let g = graph(&[("a", &[])]);
        assert!(g.dependency_closure([]).is_empty());
    }
}
