//! Topological leveling for plan and graph display.
//!
//! A depth-first walk assigns each logical id a pre-order index on first
//! visit, and a post-order index plus a level (`1 + max(level of dependencies)`)
//! on completion. Every node's post index is greater than those of its
//! dependencies, so listing by ascending post index is a valid execution
//! order. The result is advisory: reconciliation does not consult it.

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use std::cmp::Reverse;
use std::collections::HashMap;

use super::DependencyGraph;
use crate::core::StackError;

/// Position of a node in the leveled ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOrder {
    /// Length of the longest dependency chain ending at this node, counting itself
    pub level: usize,
    /// Pre-order index
    pub pre: usize,
    /// Post-order index
    pub post: usize,
}

/// Orders for every node of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leveling {
    nodes: IndexMap<String, NodeOrder>,
}

impl Leveling {
    /// The order assigned to a logical id.
    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<NodeOrder> {
        self.nodes.get(logical_id).copied()
    }

    /// All nodes by ascending post-order index.
    #[must_use]
    pub fn ordered(&self) -> Vec<(&str, NodeOrder)> {
        let mut nodes: Vec<(&str, NodeOrder)> =
            self.nodes.iter().map(|(id, order)| (id.as_str(), *order)).collect();
        nodes.sort_by_key(|(_, order)| order.post);
        nodes
    }

    /// Logical ids grouped by level, level 1 first; each group in post order.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<&str>> {
        let mut levels: Vec<Vec<&str>> = Vec::new();
        for (id, order) in self.ordered() {
            if levels.len() < order.level {
                levels.resize_with(order.level, Vec::new);
            }
            levels[order.level - 1].push(id);
        }
        levels
    }

    /// Number of leveled nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing was leveled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Level a graph.
///
/// With `improved` set, the walk runs a second time seeded by the first pass's
/// nodes in descending post order, which keeps each dependency close to its
/// dependents in the final listing.
pub fn level_graph(graph: &DependencyGraph, improved: bool) -> Result<Leveling, StackError> {
    let seed: Vec<NodeIndex> = graph.inner().node_indices().collect();
    let first = Walk::new(graph).run(&seed)?;
    if !improved {
        return Ok(first);
    }

    let mut reseeded = seed;
    reseeded.sort_by_key(|&idx| {
        Reverse(first.get(&graph.inner()[idx]).map_or(0, |order| order.post))
    });
    Walk::new(graph).run(&reseeded)
}

enum Mark {
    InProgress,
    Done(NodeOrder),
}

struct Walk<'a> {
    graph: &'a DependencyGraph,
    marks: HashMap<NodeIndex, Mark>,
    next_pre: usize,
    next_post: usize,
}

impl<'a> Walk<'a> {
    fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            marks: HashMap::with_capacity(graph.node_count()),
            next_pre: 0,
            next_post: 0,
        }
    }

    fn run(mut self, seed: &[NodeIndex]) -> Result<Leveling, StackError> {
        for &node in seed {
            self.visit(node)?;
        }
        let inner = self.graph.inner();
        let nodes = inner
            .node_indices()
            .filter_map(|idx| match self.marks.get(&idx) {
                Some(Mark::Done(order)) => Some((inner[idx].clone(), *order)),
                _ => None,
            })
            .collect();
        Ok(Leveling { nodes })
    }

    fn visit(&mut self, node: NodeIndex) -> Result<usize, StackError> {
        match self.marks.get(&node) {
            Some(Mark::Done(order)) => return Ok(order.level),
            Some(Mark::InProgress) => {
                return Err(StackError::CircularDependency {
                    logical_ids: self.graph.cyclic_nodes(),
                });
            }
            None => {}
        }

        self.marks.insert(node, Mark::InProgress);
        let pre = self.next_pre;
        self.next_pre += 1;

        let graph = self.graph;
        let inner = graph.inner();
        let mut dependencies: Vec<NodeIndex> = inner.neighbors(node).collect();
        dependencies.sort_by(|a, b| inner[*a].cmp(&inner[*b]));
        dependencies.dedup();

        let mut level = 1;
        for dependency in dependencies {
            level = level.max(self.visit(dependency)? + 1);
        }

        let post = self.next_post;
        self.next_post += 1;
        self.marks.insert(node, Mark::Done(NodeOrder { level, pre, post }));
        Ok(level)
    }
}
