use crate::error::{LineageError, Result};
use crate::types::{LineageDirection, Node, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A node annotated with its distance from the walk's start.
/// The distance only means something for the list it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeAtDistance {
    pub node: Node,
    pub distance: usize,
}

/// Graph traversal utilities for lineage display
pub struct DepthWalker;

impl DepthWalker {
    /// Pre-order depth-first flattening. Nodes reachable over several paths
    /// appear once per path, each with that path's distance.
    pub fn get_depth_first_node_list(
        nodes: &BTreeMap<NodeId, Node>,
        start_id: &str,
        direction: LineageDirection,
        max_distance: usize,
    ) -> Result<Vec<NodeAtDistance>> {
        let start = nodes
            .get(start_id)
            .ok_or_else(|| LineageError::structural(format!("walk start {start_id} is not in the lineage")))?;

        let mut list = Vec::new();
        let mut stack: Vec<(&Node, usize)> = vec![(start, 0)];

        while let Some((node, distance)) = stack.pop() {
            list.push(NodeAtDistance {
                node: node.clone(),
                distance,
            });

            if distance >= max_distance {
                continue;
            }
            for edge in node.edges(direction).iter().rev() {
                let next = nodes
                    .get(&edge.target)
                    .ok_or_else(|| LineageError::missing_node(&node.id, &edge.target))?;
                stack.push((next, distance + 1));
            }
        }

        Ok(list)
    }

    /// Shortest generation distance of every node reachable from `start_id`
    pub fn generation_depths(
        nodes: &BTreeMap<NodeId, Node>,
        start_id: &str,
        direction: LineageDirection,
        max_depth: Option<usize>,
    ) -> HashMap<NodeId, usize> {
        let max_depth = max_depth.unwrap_or(usize::MAX);
        let mut depths = HashMap::new();
        let mut queue = VecDeque::new();

        if nodes.contains_key(start_id) {
            depths.insert(start_id.to_string(), 0);
            queue.push_back((start_id.to_string(), 0));
        }

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(node) = nodes.get(&current) else {
                continue;
            };
            for edge in node.edges(direction) {
                if nodes.contains_key(&edge.target) && !depths.contains_key(&edge.target) {
                    depths.insert(edge.target.clone(), depth + 1);
                    queue.push_back((edge.target.clone(), depth + 1));
                }
            }
        }

        depths
    }
}
