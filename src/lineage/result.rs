use crate::error::{LineageError, Result};
use crate::lineage::traversal::DepthWalker;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Snapshot of the provenance graph reachable from one seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageResult {
    pub seed: NodeId,
    pub nodes: BTreeMap<NodeId, Node>,
    /// Append-only log of every seed folded into this result, starting with `seed`
    pub merged_in: Vec<NodeId>,
}

/// Wire shape returned by the raw provenance fetch
#[derive(Debug, Clone, Deserialize)]
pub struct RawLineage {
    pub seed: NodeId,
    #[serde(default)]
    pub nodes: HashMap<NodeId, RawNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub cpas_type: Option<String>,
    #[serde(default)]
    pub parents: Vec<Edge>,
    #[serde(default)]
    pub children: Vec<Edge>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl LineageResult {
    /// Build a result, rejecting edges that point outside the node mapping
    pub fn new(seed: impl Into<NodeId>, nodes: impl IntoIterator<Item = Node>) -> Result<Self> {
        let seed = seed.into();
        let result = Self {
            merged_in: vec![seed.clone()],
            seed,
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        };
        result.validate()?;
        Ok(result)
    }

    /// Decode the raw fetch payload. Nodes beyond the fetch depth are absent,
    /// so edges pointing at them are dropped here.
    pub fn from_raw(raw: RawLineage) -> Result<Self> {
        if !raw.nodes.contains_key(&raw.seed) {
            return Err(LineageError::structural(format!(
                "seed {} missing from provenance response",
                raw.seed
            )));
        }

        let known: HashSet<NodeId> = raw.nodes.keys().cloned().collect();
        let mut dropped = 0;
        let mut nodes = BTreeMap::new();

        for (id, raw_node) in raw.nodes {
            let mut keep_known = |edges: Vec<Edge>| -> Vec<Edge> {
                let before = edges.len();
                let kept: Vec<Edge> = edges
                    .into_iter()
                    .filter(|e| known.contains(&e.target))
                    .collect();
                dropped += before - kept.len();
                kept
            };

            let node = Node {
                id: id.clone(),
                name: raw_node.name,
                node_type: raw_node.node_type.unwrap_or_default(),
                cpas_type: raw_node.cpas_type,
                meta: None,
                parents: keep_known(raw_node.parents),
                children: keep_known(raw_node.children),
                properties: raw_node.properties,
            };
            nodes.insert(id, node);
        }

        if dropped > 0 {
            debug!("Dropped {} edges to nodes beyond the fetch depth for seed {}", dropped, raw.seed);
        }

        Ok(Self {
            merged_in: vec![raw.seed.clone()],
            seed: raw.seed,
            nodes,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawLineage = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Check that every edge target exists in the node mapping
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes.values() {
            for direction in LineageDirection::both() {
                if let Some(edge) = node
                    .edges(direction)
                    .iter()
                    .find(|e| !self.nodes.contains_key(&e.target))
                {
                    return Err(LineageError::missing_node(&node.id, &edge.target));
                }
            }
        }
        Ok(())
    }

    /// The seed node. Absent when the seed was filtered out.
    pub fn seed_node(&self) -> Option<&Node> {
        self.nodes.get(&self.seed)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn require_node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| LineageError::structural(format!("node {id} is not part of the lineage of {}", self.seed)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of child-direction edges
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.children.len()).sum()
    }

    /// Restrict the result to nodes within `max_depth` generations of the seed
    /// in either direction, dropping edges that leave the kept set
    pub fn within_depth(&self, max_depth: usize) -> LineageResult {
        let mut kept: HashSet<NodeId> = HashSet::new();
        for direction in LineageDirection::both() {
            kept.extend(
                DepthWalker::generation_depths(&self.nodes, &self.seed, direction, Some(max_depth)).into_keys(),
            );
        }

        let nodes = self
            .nodes
            .values()
            .filter(|n| kept.contains(&n.id))
            .map(|n| {
                let mut node = n.clone();
                node.parents.retain(|e| kept.contains(&e.target));
                node.children.retain(|e| kept.contains(&e.target));
                (node.id.clone(), node)
            })
            .collect();

        LineageResult {
            seed: self.seed.clone(),
            nodes,
            merged_in: self.merged_in.clone(),
        }
    }

    /// Keep only nodes whose `field` matches `value`
    pub fn filter_in(&self, field: &str, value: &FilterValue) -> Result<LineageResult> {
        self.filter(field, value, true)
    }

    /// Keep only nodes whose `field` does not match `value`
    pub fn filter_out(&self, field: &str, value: &FilterValue) -> Result<LineageResult> {
        self.filter(field, value, false)
    }

    fn filter(&self, field: &str, value: &FilterValue, keep_matches: bool) -> Result<LineageResult> {
        if field.is_empty() {
            return Err(LineageError::structural("filter field must not be empty"));
        }

        let keep: HashSet<&str> = self
            .nodes
            .values()
            .filter(|node| value.matches(node.field(field).as_ref()) == keep_matches)
            .map(|node| node.id.as_str())
            .collect();

        let mut nodes = BTreeMap::new();
        for node in self.nodes.values().filter(|n| keep.contains(n.id.as_str())) {
            let mut pruned = node.clone();
            for direction in LineageDirection::both() {
                *pruned.edges_mut(direction) = self.prune_edges(node, direction, &keep)?;
            }
            nodes.insert(node.id.clone(), pruned);
        }

        debug!(
            "Filtered lineage of {} on {}: kept {} of {} nodes",
            self.seed,
            field,
            nodes.len(),
            self.nodes.len()
        );

        Ok(LineageResult {
            seed: self.seed.clone(),
            nodes,
            merged_in: self.merged_in.clone(),
        })
    }

    /// Replace each edge of `node` by the kept nodes reached by walking
    /// through dropped ones in the same direction. Edges to kept nodes are
    /// carried over unchanged. Output is deduplicated by target and role.
    fn prune_edges<'a>(
        &'a self,
        node: &'a Node,
        direction: LineageDirection,
        keep: &HashSet<&str>,
    ) -> Result<Vec<Edge>> {
        let mut pruned = Vec::new();
        let mut emitted: HashSet<(&str, Option<&str>)> = HashSet::new();

        for edge in node.edges(direction) {
            let reached = if keep.contains(edge.target.as_str()) {
                vec![edge]
            } else {
                self.splice(node, edge, direction, keep)?
            };
            for kept in reached {
                if emitted.insert((kept.target.as_str(), kept.role.as_deref())) {
                    pruned.push(kept.clone());
                }
            }
        }

        Ok(pruned)
    }

    /// Edges into kept nodes reached from one dropped edge target. The walked
    /// set belongs to this edge alone and only holds dropped nodes.
    fn splice<'a>(
        &'a self,
        node: &'a Node,
        edge: &'a Edge,
        direction: LineageDirection,
        keep: &HashSet<&str>,
    ) -> Result<Vec<&'a Edge>> {
        let mut walked: HashSet<&str> = HashSet::new();
        let mut reached = Vec::new();
        let mut stack: Vec<(&str, &Edge)> = vec![(node.id.as_str(), edge)];

        while let Some((owner, edge)) = stack.pop() {
            if keep.contains(edge.target.as_str()) {
                reached.push(edge);
                continue;
            }
            if !walked.insert(edge.target.as_str()) {
                continue;
            }

            let through = self
                .nodes
                .get(&edge.target)
                .ok_or_else(|| LineageError::missing_node(owner, &edge.target))?;
            stack.extend(
                through
                    .edges(direction)
                    .iter()
                    .rev()
                    .map(|e| (through.id.as_str(), e)),
            );
        }

        Ok(reached)
    }

    /// Fold `other` into a copy of this result. Shared nodes get the union of
    /// their edges, deduplicated by target and role.
    pub fn merge_lineage(&self, other: &LineageResult) -> LineageResult {
        let mut nodes = self.nodes.clone();

        for (id, other_node) in &other.nodes {
            match nodes.get_mut(id) {
                Some(existing) => {
                    for direction in LineageDirection::both() {
                        union_edges(existing.edges_mut(direction), other_node.edges(direction));
                    }
                }
                None => {
                    nodes.insert(id.clone(), other_node.clone());
                }
            }
        }

        let mut merged_in = self.merged_in.clone();
        merged_in.push(other.seed.clone());

        debug!(
            "Merged lineage of {} into {}: {} nodes",
            other.seed,
            self.seed,
            nodes.len()
        );

        LineageResult {
            seed: self.seed.clone(),
            nodes,
            merged_in,
        }
    }

    /// Apply display metadata from the enrichment fetch
    pub fn with_metadata(&self, metadata: &HashMap<NodeId, NodeMetadata>) -> LineageResult {
        let mut enriched = self.clone();
        for (id, meta) in metadata {
            match enriched.nodes.get_mut(id) {
                Some(node) => node.meta = Some(meta.clone()),
                None => debug!("Ignoring metadata for node {} outside the lineage", id),
            }
        }
        enriched
    }
}

fn union_edges(into: &mut Vec<Edge>, from: &[Edge]) {
    let mut seen: HashSet<(NodeId, Option<String>)> = HashSet::new();
    let combined: Vec<Edge> = into.drain(..).chain(from.iter().cloned()).collect();
    into.extend(
        combined
            .into_iter()
            .filter(|e| seen.insert((e.target.clone(), e.role.clone()))),
    );
}
