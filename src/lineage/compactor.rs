use crate::error::{LineageError, Result};
use crate::lineage::options::{GenerationPolicy, GroupingOptions, LayoutOptions};
use crate::lineage::result::LineageResult;
use crate::lineage::vis::{BasicNode, CombinedNode, VisEdge, VisGraph, VisNode};
use crate::types::{LineageDirection, Node, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

pub const COMBINED_ID_PREFIX: &str = "combined:";

/// Turns a lineage result into the node/edge set drawn by the diagram renderer,
/// collapsing high fan-out groups into combined nodes.
#[derive(Debug, Clone, Default)]
pub struct GraphCompactor {
    grouping: GroupingOptions,
    layout: LayoutOptions,
}

impl GraphCompactor {
    pub fn new(grouping: GroupingOptions, layout: LayoutOptions) -> Self {
        Self { grouping, layout }
    }

    pub fn compact(&self, result: &LineageResult) -> Result<VisGraph> {
        self.grouping.validate()?;

        let mut starts: Vec<&str> = Vec::new();
        for seed in &result.merged_in {
            if !result.contains(seed) {
                debug!("Skipping merged seed {} missing from the filtered lineage", seed);
            } else if !starts.contains(&seed.as_str()) {
                starts.push(seed);
            }
        }

        let mut graph = GraphAccumulator::new(starts.iter().map(|s| s.to_string()).collect());

        for start in &starts {
            graph.add_basic(result.require_node(start)?);
            for direction in LineageDirection::both() {
                self.traverse(result, start, direction, &mut graph)?;
            }
        }

        let initial_selection = if result.contains(&result.seed) {
            graph.representatives(&result.seed)
        } else {
            Vec::new()
        };

        info!(
            "Compacted lineage of {} into {} nodes ({} combined) and {} edges",
            result.seed,
            graph.nodes.len(),
            graph.combined_count(),
            graph.edges.len()
        );

        Ok(graph.into_vis_graph(initial_selection, self.layout.clone()))
    }

    /// Breadth-first expansion from one start in one direction
    fn traverse(
        &self,
        result: &LineageResult,
        start: &str,
        direction: LineageDirection,
        graph: &mut GraphAccumulator,
    ) -> Result<()> {
        let mut context = TraversalContext::new(start, direction);
        let mut depth = 0;

        while depth < context.cohorts.len() {
            let cohort = context.cohorts[depth].clone();

            for id in cohort {
                if !context.processed.insert(id.clone()) {
                    continue;
                }
                if self.should_stop(&context, depth) {
                    continue;
                }

                let node = result.require_node(&id)?;
                let targets = distinct_targets(result, node, direction)?;
                if targets.is_empty() {
                    continue;
                }

                let (protected, combinable): (Vec<&Node>, Vec<&Node>) = targets
                    .iter()
                    .copied()
                    .partition(|t| graph.protected.contains(&t.id));

                match self.grouping.combine_size {
                    Some(size) if targets.len() >= size && combinable.len() > 1 => {
                        graph.combine(&id, &combinable, direction);
                        for target in protected {
                            graph.link_direct(&id, target, direction);
                        }
                    }
                    _ => {
                        for target in &targets {
                            graph.link_direct(&id, target, direction);
                        }
                    }
                }

                for target in targets {
                    context.discover(&target.id, depth + 1);
                }
            }

            depth += 1;
        }

        debug!(
            "Traversed {:?} from {}: {} generations, {} nodes processed",
            direction,
            start,
            context.cohorts.len(),
            context.processed.len()
        );
        Ok(())
    }

    /// Evaluated before a node's edges are expanded
    fn should_stop(&self, context: &TraversalContext, depth: usize) -> bool {
        match self.grouping.generations {
            GenerationPolicy::Nearest => depth + 1 > 1,
            GenerationPolicy::Specific => depth + 1 > self.grouping.depth_limit(context.direction),
            GenerationPolicy::Multi => depth > 0 && context.cohorts[depth - 1].len() > 1,
            GenerationPolicy::All => false,
        }
    }
}

fn distinct_targets<'a>(
    result: &'a LineageResult,
    node: &Node,
    direction: LineageDirection,
) -> Result<Vec<&'a Node>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for edge in node.edges(direction) {
        if seen.insert(edge.target.as_str()) {
            let target = result
                .node(&edge.target)
                .ok_or_else(|| LineageError::missing_node(&node.id, &edge.target))?;
            targets.push(target);
        }
    }
    Ok(targets)
}

/// State of one start/direction traversal
struct TraversalContext {
    direction: LineageDirection,
    processed: HashSet<NodeId>,
    seen: HashSet<NodeId>,
    /// Node ids first seen at each depth
    cohorts: Vec<Vec<NodeId>>,
}

impl TraversalContext {
    fn new(start: &str, direction: LineageDirection) -> Self {
        Self {
            direction,
            processed: HashSet::new(),
            seen: HashSet::from([start.to_string()]),
            cohorts: vec![vec![start.to_string()]],
        }
    }

    fn discover(&mut self, id: &str, depth: usize) {
        if !self.seen.insert(id.to_string()) {
            return;
        }
        if self.cohorts.len() <= depth {
            self.cohorts.resize_with(depth + 1, Vec::new);
        }
        self.cohorts[depth].push(id.to_string());
    }
}

/// Nodes and edges accumulated over every traversal of one compaction call
struct GraphAccumulator {
    nodes: BTreeMap<String, VisNode>,
    edges: BTreeMap<EdgeKey, VisEdge>,
    /// Rendered id -> keys of the edges touching it
    incident: HashMap<String, HashSet<EdgeKey>>,
    /// Absorbed node id -> combined nodes it has joined
    memberships: HashMap<NodeId, Vec<String>>,
    /// Start seeds, never absorbed
    protected: HashSet<NodeId>,
    next_combined: usize,
}

type EdgeKey = (String, String);

impl GraphAccumulator {
    fn new(protected: HashSet<NodeId>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            incident: HashMap::new(),
            memberships: HashMap::new(),
            protected,
            next_combined: 0,
        }
    }

    fn combined_count(&self) -> usize {
        self.nodes.values().filter(|n| n.as_combined().is_some()).count()
    }

    /// Rendered ids standing for `id`: its combined groups, or itself
    fn representatives(&self, id: &str) -> Vec<String> {
        match self.memberships.get(id) {
            Some(groups) if !groups.is_empty() => groups.clone(),
            _ => vec![id.to_string()],
        }
    }

    fn is_absorbed(&self, id: &str) -> bool {
        self.memberships.get(id).is_some_and(|groups| !groups.is_empty())
    }

    fn add_basic(&mut self, node: &Node) {
        if self.is_absorbed(&node.id) {
            return;
        }
        let is_seed = self.protected.contains(&node.id);
        self.nodes
            .entry(node.id.clone())
            .or_insert_with(|| VisNode::Basic(BasicNode::from_node(node, is_seed)));
    }

    /// Store an edge in parent-to-child orientation
    fn add_edge(&mut self, source: &str, target: &str, direction: LineageDirection) {
        let (from, to) = match direction {
            LineageDirection::Children => (source.to_string(), target.to_string()),
            LineageDirection::Parent => (target.to_string(), source.to_string()),
        };
        self.insert_edge(from, to, direction);
    }

    /// Duplicates and self loops are ignored
    fn insert_edge(&mut self, from: String, to: String, direction: LineageDirection) {
        if from == to {
            return;
        }
        let key = (from, to);
        if self.edges.contains_key(&key) {
            return;
        }
        self.incident.entry(key.0.clone()).or_default().insert(key.clone());
        self.incident.entry(key.1.clone()).or_default().insert(key.clone());
        self.edges.insert(key.clone(), VisEdge::new(key.0, key.1, direction));
    }

    fn remove_edge(&mut self, key: &EdgeKey) -> Option<VisEdge> {
        let edge = self.edges.remove(key)?;
        for end in [&key.0, &key.1] {
            if let Some(keys) = self.incident.get_mut(end) {
                keys.remove(key);
            }
        }
        Some(edge)
    }

    fn link_direct(&mut self, source: &str, target: &Node, direction: LineageDirection) {
        self.add_basic(target);
        for from in self.representatives(source) {
            for to in self.representatives(&target.id) {
                self.add_edge(&from, &to, direction);
            }
        }
    }

    fn combine(&mut self, source: &str, targets: &[&Node], direction: LineageDirection) {
        self.next_combined += 1;
        let combined_id = format!("{COMBINED_ID_PREFIX}{}", self.next_combined);

        // Groups a target already joined fold into the new one
        let mut superseded: Vec<String> = Vec::new();
        for target in targets {
            for group in self.memberships.get(&target.id).into_iter().flatten() {
                if !superseded.contains(group) {
                    superseded.push(group.clone());
                }
            }
        }

        let mut members: Vec<Node> = targets.iter().map(|t| (*t).clone()).collect();
        let mut member_ids: HashSet<NodeId> = members.iter().map(|m| m.id.clone()).collect();
        let mut replaced: HashSet<String> = superseded.iter().cloned().collect();

        for id in &superseded {
            if let Some(VisNode::Combined(group)) = self.nodes.remove(id) {
                for member in group.members {
                    if member_ids.insert(member.id.clone()) {
                        members.push(member);
                    }
                }
            }
        }
        for target in targets {
            if let Some(VisNode::Basic(_)) = self.nodes.get(&target.id) {
                self.nodes.remove(&target.id);
                replaced.insert(target.id.clone());
            }
        }

        self.repoint_edges(&replaced, &combined_id);

        for id in &member_ids {
            let groups = self.memberships.entry(id.clone()).or_default();
            groups.retain(|g| !superseded.contains(g));
            groups.push(combined_id.clone());
        }

        debug!(
            "Combined {} {:?} targets of {} into {} ({} members, superseding {})",
            targets.len(),
            direction,
            source,
            combined_id,
            members.len(),
            superseded.len()
        );

        let member_refs: Vec<&Node> = members.iter().collect();
        self.nodes.insert(
            combined_id.clone(),
            VisNode::Combined(CombinedNode::new(combined_id.clone(), direction, &member_refs)),
        );

        for from in self.representatives(source) {
            self.add_edge(&from, &combined_id, direction);
        }
    }

    /// Move every edge touching a replaced id onto `combined_id`
    fn repoint_edges(&mut self, replaced: &HashSet<String>, combined_id: &str) {
        let mut keys: BTreeSet<EdgeKey> = BTreeSet::new();
        for id in replaced {
            if let Some(incident) = self.incident.remove(id) {
                keys.extend(incident);
            }
        }

        for key in keys {
            let Some(edge) = self.remove_edge(&key) else {
                continue;
            };
            let (from, to) = key;
            let from = if replaced.contains(&from) { combined_id.to_string() } else { from };
            let to = if replaced.contains(&to) { combined_id.to_string() } else { to };
            self.insert_edge(from, to, edge.direction);
        }
    }

    fn into_vis_graph(self, initial_selection: Vec<String>, layout: LayoutOptions) -> VisGraph {
        VisGraph {
            nodes: self.nodes.into_values().collect(),
            edges: self.edges.into_values().collect(),
            initial_selection,
            layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edge, NodeMetadata};

    /// Build a lineage from child-direction pairs, mirroring every edge
    fn lineage(seed: &str, pairs: &[(&str, &str)]) -> LineageResult {
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        nodes.insert(seed.to_string(), Node::new(seed, "Sample"));
        for (parent, child) in pairs {
            nodes
                .entry(parent.to_string())
                .or_insert_with(|| Node::new(*parent, "Sample"))
                .children
                .push(Edge::new(*child));
            nodes
                .entry(child.to_string())
                .or_insert_with(|| Node::new(*child, "Sample"))
                .parents
                .push(Edge::new(*parent));
        }
        LineageResult::new(seed, nodes.into_values()).unwrap()
    }

    fn compactor(generations: GenerationPolicy, combine_size: Option<usize>) -> GraphCompactor {
        GraphCompactor::new(
            GroupingOptions {
                generations,
                parent_depth: 1,
                child_depth: 1,
                combine_size,
            },
            LayoutOptions::default(),
        )
    }

    fn node_ids(graph: &VisGraph) -> Vec<&str> {
        graph.nodes.iter().map(VisNode::id).collect()
    }

    #[test]
    fn test_below_combine_threshold_creates_direct_edges() {
        let result = lineage("S", &[("S", "A"), ("S", "B")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        assert_eq!(graph.combined_nodes().count(), 0);
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.edge("S", "A").is_some());
        assert!(graph.edge("S", "B").is_some());
    }

    #[test]
    fn test_combine_threshold_creates_one_combined_node() {
        let result = lineage("S", &[("S", "A"), ("S", "B"), ("S", "C")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        let combined: Vec<&CombinedNode> = graph.combined_nodes().collect();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].members.len(), 3);
        assert_eq!(combined[0].label, "3 items of type Sample");
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edge("S", &combined[0].id).is_some());
        assert_eq!(node_ids(&graph), vec!["S", "combined:1"]);
    }

    #[test]
    fn test_disabled_combining_keeps_every_edge() {
        let pairs: Vec<(String, String)> = (0..10).map(|i| ("S".to_string(), format!("C{i}"))).collect();
        let pairs: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let result = lineage("S", &pairs);

        let graph = compactor(GenerationPolicy::All, None).compact(&result).unwrap();
        assert_eq!(graph.edges.len(), 10);
        assert_eq!(graph.nodes.len(), 11);
    }

    #[test]
    fn test_parent_edges_use_child_direction_convention() {
        let result = lineage("S", &[("P", "S"), ("S", "C")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        let parent_edge = graph.edge("P", "S").unwrap();
        assert_eq!(parent_edge.direction, LineageDirection::Parent);
        assert_eq!(parent_edge.id, "P||S");
        assert!(graph.edge("S", "C").is_some());
        assert!(graph.edge("S", "P").is_none());
    }

    #[test]
    fn test_nearest_policy_stops_after_one_generation() {
        let result = lineage("S", &[("S", "A"), ("A", "B"), ("G", "S")]);
        let graph = compactor(GenerationPolicy::Nearest, Some(3)).compact(&result).unwrap();

        assert_eq!(node_ids(&graph), vec!["A", "G", "S"]);
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_specific_policy_uses_direction_limits() {
        let result = lineage("S", &[("S", "A"), ("A", "B"), ("B", "C"), ("P2", "P1"), ("P1", "S")]);
        let compactor = GraphCompactor::new(
            GroupingOptions {
                generations: GenerationPolicy::Specific,
                parent_depth: 1,
                child_depth: 2,
                combine_size: Some(3),
            },
            LayoutOptions::default(),
        );
        let graph = compactor.compact(&result).unwrap();

        assert_eq!(node_ids(&graph), vec!["A", "B", "P1", "S"]);
    }

    #[test]
    fn test_multi_policy_stops_after_wide_generation() {
        let result = lineage("S", &[("S", "A"), ("S", "B"), ("A", "C"), ("C", "D")]);
        let graph = compactor(GenerationPolicy::Multi, Some(5)).compact(&result).unwrap();

        assert_eq!(node_ids(&graph), vec!["A", "B", "C", "S"]);
        assert!(graph.edge("A", "C").is_some());
        assert!(graph.node("D").is_none());
    }

    #[test]
    fn test_cycles_terminate() {
        let result = lineage("S", &[("S", "A"), ("A", "B"), ("B", "S")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        assert_eq!(node_ids(&graph), vec!["A", "B", "S"]);
        assert_eq!(graph.edges.len(), 3);
    }

    #[test]
    fn test_combining_repoints_existing_edges() {
        // S -> {A, B}; A -> {B, D, E} absorbs the already drawn B
        let result = lineage("S", &[("S", "A"), ("S", "B"), ("A", "B"), ("A", "D"), ("A", "E")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        assert_eq!(node_ids(&graph), vec!["A", "S", "combined:1"]);
        assert!(graph.edge("S", "A").is_some());
        assert!(graph.edge("S", "combined:1").is_some());
        assert!(graph.edge("A", "combined:1").is_some());
        assert!(graph.edge("S", "B").is_none());
        assert_eq!(graph.edges.len(), 3);
    }

    #[test]
    fn test_edges_from_absorbed_source_start_at_its_group() {
        let result = lineage("S", &[("S", "A"), ("S", "B"), ("S", "C"), ("A", "D")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        assert!(graph.edge("combined:1", "D").is_some());
        assert!(graph.node("A").is_none());
        assert_eq!(node_ids(&graph), vec!["D", "S", "combined:1"]);
    }

    #[test]
    fn test_identical_groups_supersede_each_other() {
        let result = lineage(
            "S",
            &[
                ("S", "P1"),
                ("S", "P2"),
                ("P1", "G1"),
                ("P1", "G2"),
                ("P1", "G3"),
                ("P2", "G1"),
                ("P2", "G2"),
                ("P2", "G3"),
            ],
        );
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        let combined: Vec<&CombinedNode> = graph.combined_nodes().collect();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].id, "combined:2");
        assert!(graph.edge("P1", "combined:2").is_some());
        assert!(graph.edge("P2", "combined:2").is_some());
        assert!(graph.edges.iter().all(|e| graph.node(&e.from).is_some() && graph.node(&e.to).is_some()));
    }

    #[test]
    fn test_mixed_type_combined_label() {
        let mut result = lineage("S", &[("S", "A"), ("S", "B"), ("S", "C")]);
        result.nodes.get_mut("C").unwrap().node_type = "Data".to_string();
        result.nodes.get_mut("A").unwrap().meta = Some(NodeMetadata {
            icon: Some("sample_set".to_string()),
            ..Default::default()
        });

        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();
        let combined = graph.combined_nodes().next().unwrap();
        assert_eq!(combined.label, "3 items of different types");
        assert_eq!(combined.icon, crate::lineage::vis::DEFAULT_ICON);
    }

    #[test]
    fn test_seed_is_never_absorbed() {
        let result = lineage("S", &[("S", "A"), ("A", "S"), ("A", "B"), ("A", "C")]);
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        assert_eq!(graph.initial_selection, vec!["S"]);
        assert!(graph.node("S").is_some());
        assert!(graph.edge("A", "S").is_some());

        let combined: Vec<&CombinedNode> = graph.combined_nodes().collect();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].member_ids().collect::<Vec<_>>(), vec!["B", "C"]);
        assert!(graph.edge("A", "combined:1").is_some());
    }

    #[test]
    fn test_merged_seed_counts_towards_fan_out() {
        let first = lineage("S", &[("S", "X"), ("S", "A"), ("S", "B")]);
        let second = lineage("X", &[]);
        let merged = first.merge_lineage(&second);

        let graph = compactor(GenerationPolicy::Nearest, Some(3)).compact(&merged).unwrap();
        assert_eq!(graph.combined_nodes().count(), 1);
        assert_eq!(node_ids(&graph), vec!["S", "X", "combined:1"]);
        assert!(graph.edge("S", "X").is_some());
        assert!(graph.edge("S", "combined:1").is_some());
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_overlapping_groups_fold_into_latest() {
        let result = lineage(
            "S",
            &[
                ("S", "P1"),
                ("S", "P2"),
                ("P1", "G1"),
                ("P1", "G2"),
                ("P1", "G3"),
                ("P2", "G2"),
                ("P2", "G3"),
                ("P2", "G4"),
            ],
        );
        let graph = compactor(GenerationPolicy::All, Some(3)).compact(&result).unwrap();

        assert_eq!(node_ids(&graph), vec!["P1", "P2", "S", "combined:2"]);
        assert!(graph.edge("P1", "combined:1").is_none());
        assert!(graph.edge("P1", "combined:2").is_some());
        assert!(graph.edge("P2", "combined:2").is_some());
        assert_eq!(graph.edges.len(), 4);

        let combined = graph.node("combined:2").and_then(VisNode::as_combined).unwrap();
        let mut members: Vec<&str> = combined.member_ids().collect();
        members.sort();
        assert_eq!(members, vec!["G1", "G2", "G3", "G4"]);
        assert_eq!(combined.label, "4 items of type Sample");
    }

    #[test]
    fn test_every_merged_seed_is_expanded() {
        let first = lineage("S", &[("S", "A")]);
        let second = lineage("X", &[("X", "Y")]);
        let merged = first.merge_lineage(&second);

        let graph = compactor(GenerationPolicy::Nearest, Some(3)).compact(&merged).unwrap();
        assert_eq!(node_ids(&graph), vec!["A", "S", "X", "Y"]);
        assert_eq!(graph.initial_selection, vec!["S"]);
        let seeds: Vec<&str> = graph
            .nodes
            .iter()
            .filter_map(|n| match n {
                VisNode::Basic(b) if b.is_seed => Some(b.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(seeds, vec!["S", "X"]);
    }

    #[test]
    fn test_invalid_combine_size_is_rejected() {
        let result = lineage("S", &[("S", "A")]);
        let err = compactor(GenerationPolicy::All, Some(1)).compact(&result).unwrap_err();
        assert!(matches!(err, LineageError::InvalidOptions { .. }));
    }
}
