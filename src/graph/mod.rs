//! Dependency graph construction and cycle detection.
//!
//! Edges point from a resource to the resources it depends on: an edge
//! `Queue -> Topic` means `Topic` must be reconciled before `Queue`. Edges come
//! from every reference inside a resource's properties (`Ref`, `Fn::GetAtt`,
//! `Fn::Sub` placeholders, through any nesting of other intrinsics) plus its
//! explicit `DependsOn` list. Parameters and pseudo-parameters never become
//! edges.

pub mod leveler;

use indexmap::IndexMap;
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};
use strsim::levenshtein;

use crate::core::StackError;
use crate::template::{Template, is_pseudo_parameter};

pub use leveler::{Leveling, NodeOrder, level_graph};

/// Maximum Levenshtein distance, as a percentage of the name length, for a
/// "did you mean" suggestion.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Directed graph of logical ids.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of a template and reject it if it contains a cycle.
    ///
    /// Fails with [`StackError::MissingReference`] if a resource references a
    /// name that is neither a resource, a parameter nor a pseudo-parameter, and
    /// with [`StackError::CircularDependency`] listing every logical id that
    /// sits on a cycle.
    pub fn from_template(template: &Template) -> Result<Self, StackError> {
        let graph = Self::build(template)?;
        graph.detect_cycles()?;
        tracing::debug!(
            "Built dependency graph: {} resource(s), {} edge(s)",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Build without the cycle check.
    pub fn build(template: &Template) -> Result<Self, StackError> {
        let mut graph = Self::new();
        for logical_id in template.resources.keys() {
            graph.ensure_node(logical_id);
        }

        for (logical_id, resource) in &template.resources {
            let mut targets: Vec<&str> = Vec::new();
            if let Some(properties) = &resource.properties {
                for reference in properties.references() {
                    let name = reference.name();
                    if is_pseudo_parameter(name) || template.is_parameter(name) {
                        continue;
                    }
                    targets.push(name);
                }
            }
            targets.extend(resource.depends_on.iter().map(String::as_str));

            for target in targets {
                if !template.is_resource(target) {
                    return Err(StackError::MissingReference {
                        logical_id: logical_id.clone(),
                        reference: target.to_string(),
                        suggestion: suggest(target, template),
                    });
                }
                graph.add_dependency(logical_id, target);
            }
        }
        Ok(graph)
    }

    fn ensure_node(&mut self, logical_id: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(logical_id) {
            index
        } else {
            let index = self.graph.add_node(logical_id.to_string());
            self.node_map.insert(logical_id.to_string(), index);
            index
        }
    }

    /// Record that `from` depends on `to`. Duplicate edges are collapsed.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Add a node with no edges.
    pub fn add_node(&mut self, logical_id: &str) {
        self.ensure_node(logical_id);
    }

    /// Every logical id that lies on a cycle, sorted.
    #[must_use]
    pub fn cyclic_nodes(&self) -> Vec<String> {
        let mut cyclic: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component.first().is_some_and(|&node| self.graph.contains_edge(node, node))
            })
            .flatten()
            .map(|node| self.graph[node].clone())
            .collect();
        cyclic.sort();
        cyclic
    }

    /// Fail if any cycle exists, naming every implicated logical id.
    pub fn detect_cycles(&self) -> Result<(), StackError> {
        let logical_ids = self.cyclic_nodes();
        if logical_ids.is_empty() {
            Ok(())
        } else {
            Err(StackError::CircularDependency { logical_ids })
        }
    }

    /// Logical ids ordered so that dependencies come first.
    pub fn topological_order(&self) -> Result<Vec<String>, StackError> {
        self.detect_cycles()?;
        let indices = toposort(&self.graph, None).map_err(|_| StackError::CircularDependency {
            logical_ids: self.cyclic_nodes(),
        })?;
        Ok(indices.into_iter().rev().map(|idx| self.graph[idx].clone()).collect())
    }

    /// Whether the logical id is a node.
    #[must_use]
    pub fn contains(&self, logical_id: &str) -> bool {
        self.node_map.contains_key(logical_id)
    }

    /// Direct dependencies of a logical id, sorted.
    #[must_use]
    pub fn dependencies(&self, logical_id: &str) -> Vec<&str> {
        self.neighbors(logical_id, Direction::Outgoing)
    }

    /// Logical ids that directly depend on this one, sorted.
    #[must_use]
    pub fn dependents(&self, logical_id: &str) -> Vec<&str> {
        self.neighbors(logical_id, Direction::Incoming)
    }

    fn neighbors(&self, logical_id: &str, direction: Direction) -> Vec<&str> {
        let Some(&index) = self.node_map.get(logical_id) else {
            return Vec::new();
        };
        let mut ids: Vec<&str> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|idx| self.graph[idx].as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Everything the logical id depends on, directly or indirectly.
    #[must_use]
    pub fn transitive_dependencies(&self, logical_id: &str) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        let mut queue = VecDeque::new();
        if let Some(&index) = self.node_map.get(logical_id) {
            queue.push_back(index);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors(current) {
                    if deps.insert(self.graph[neighbor].clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        deps
    }

    /// Logical ids in insertion order.
    #[must_use]
    pub fn logical_ids(&self) -> Vec<&str> {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str()).collect()
    }

    /// Adjacency map `logical id -> sorted dependencies`, in insertion order.
    #[must_use]
    pub fn adjacency(&self) -> IndexMap<String, Vec<String>> {
        self.logical_ids()
            .into_iter()
            .map(|id| {
                let deps = self.dependencies(id).into_iter().map(str::to_string).collect();
                (id.to_string(), deps)
            })
            .collect()
    }

    pub(crate) const fn inner(&self) -> &DiGraph<String, ()> {
        &self.graph
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// The closest declared resource or parameter name, if close enough.
fn suggest(target: &str, template: &Template) -> Option<String> {
    template
        .resources
        .keys()
        .chain(template.parameters.keys())
        .map(|name| (name, levenshtein(target, name)))
        .filter(|(_, distance)| *distance <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
        .min_by_key(|(_, distance)| *distance)
        .map(|(name, _)| name.clone())
}
