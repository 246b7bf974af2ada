use crate::error::{LineageError, Result};
use crate::lineage::result::LineageResult;
use crate::lineage::traversal::DepthWalker;
use crate::types::{LineageDirection, NodeId};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Petgraph view of a lineage result, used for derived statistics
pub struct LineageGraph {
    graph: DiGraph<NodeId, ()>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl LineageGraph {
    /// Edges run parent to child. Parent lists that mirror a child list add nothing.
    pub fn from_result(result: &LineageResult) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for id in result.nodes.keys() {
            let index = graph.add_node(id.clone());
            node_map.insert(id.clone(), index);
        }

        let mut seen: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        for node in result.nodes.values() {
            let Some(&own) = node_map.get(&node.id) else {
                continue;
            };
            let pairs = node
                .children
                .iter()
                .filter_map(|e| node_map.get(&e.target).map(|&child| (own, child)))
                .chain(
                    node.parents
                        .iter()
                        .filter_map(|e| node_map.get(&e.target).map(|&parent| (parent, own))),
                );
            for (from, to) in pairs {
                if seen.insert((from, to)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph, node_map }
    }

    /// Get the number of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn index(&self, node_id: &str) -> Result<NodeIndex> {
        self.node_map
            .get(node_id)
            .copied()
            .ok_or_else(|| LineageError::structural(format!("node {node_id} not found in graph")))
    }

    /// All nodes reachable from `node_id` in one direction, excluding itself
    pub fn reachable(&self, node_id: &str, direction: LineageDirection) -> Result<Vec<NodeId>> {
        let start = self.index(node_id)?;
        let petgraph_direction = match direction {
            LineageDirection::Children => Direction::Outgoing,
            LineageDirection::Parent => Direction::Incoming,
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(current, petgraph_direction) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                    found.push(self.graph[neighbor].clone());
                }
            }
        }

        debug!("Found {} {:?} nodes for {}", found.len(), direction, node_id);
        Ok(found)
    }

    /// Nodes with no outgoing edges
    pub fn get_leaf_nodes(&self) -> Vec<NodeId> {
        self.nodes_without(Direction::Outgoing)
    }

    /// Nodes with no incoming edges
    pub fn get_root_nodes(&self) -> Vec<NodeId> {
        self.nodes_without(Direction::Incoming)
    }

    fn nodes_without(&self, direction: Direction) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|&i| self.graph.neighbors_directed(i, direction).next().is_none())
            .map(|i| self.graph[i].clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Groups of nodes that derive from each other, largest first
    pub fn find_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&i| self.graph.contains_edge(i, i))
            })
            .map(|scc| {
                let mut ids: Vec<NodeId> = scc.into_iter().map(|i| self.graph[i].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        cycles
    }
}

/// Derived statistics stored alongside a cached lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub root_nodes: usize,
    pub leaf_nodes: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Generations above the seed
    pub parent_generations: usize,
    /// Generations below the seed
    pub child_generations: usize,
    /// Nodes the seed derives from
    pub ancestors: usize,
    /// Nodes derived from the seed
    pub descendants: usize,
    pub has_cycles: bool,
    pub cycles: Vec<Vec<NodeId>>,
}

impl LineageStatistics {
    pub fn compute(result: &LineageResult) -> Self {
        let graph = LineageGraph::from_result(result);

        let mut nodes_by_type = BTreeMap::new();
        for node in result.nodes.values() {
            *nodes_by_type.entry(node.node_type.clone()).or_insert(0) += 1;
        }

        let generations = |direction: LineageDirection| {
            DepthWalker::generation_depths(&result.nodes, &result.seed, direction, None)
                .values()
                .copied()
                .max()
                .unwrap_or(0)
        };

        // A filtered-out seed has no ancestors or descendants
        let reachable = |direction: LineageDirection| {
            graph
                .reachable(&result.seed, direction)
                .map(|ids| ids.len())
                .unwrap_or(0)
        };

        Self {
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
            root_nodes: graph.get_root_nodes().len(),
            leaf_nodes: graph.get_leaf_nodes().len(),
            nodes_by_type,
            parent_generations: generations(LineageDirection::Parent),
            child_generations: generations(LineageDirection::Children),
            ancestors: reachable(LineageDirection::Parent),
            descendants: reachable(LineageDirection::Children),
            has_cycles: graph.has_cycles(),
            cycles: graph.find_cycles(),
        }
    }
}
