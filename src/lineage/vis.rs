use crate::lineage::options::LayoutOptions;
use crate::types::{LineageDirection, Node, NodeId};
use serde::Serialize;

pub const DEFAULT_ICON: &str = "default";

/// Node handed to the diagram renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VisNode {
    Basic(BasicNode),
    Combined(CombinedNode),
}

impl VisNode {
    pub fn id(&self) -> &str {
        match self {
            VisNode::Basic(node) => &node.id,
            VisNode::Combined(node) => &node.id,
        }
    }

    pub fn as_combined(&self) -> Option<&CombinedNode> {
        match self {
            VisNode::Combined(node) => Some(node),
            VisNode::Basic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicNode {
    pub id: NodeId,
    pub label: String,
    pub title: Option<String>,
    pub icon: String,
    pub is_seed: bool,
    pub node: Node,
}

impl BasicNode {
    pub fn from_node(node: &Node, is_seed: bool) -> Self {
        Self {
            id: node.id.clone(),
            label: node.display_name().to_string(),
            title: node.meta.as_ref().and_then(|m| m.description.clone()),
            icon: node.icon().unwrap_or(DEFAULT_ICON).to_string(),
            is_seed,
            node: node.clone(),
        }
    }
}

/// Synthetic stand-in for a group of same-direction siblings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedNode {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub direction: LineageDirection,
    pub members: Vec<Node>,
}

impl CombinedNode {
    pub fn new(id: String, direction: LineageDirection, members: &[&Node]) -> Self {
        let first = members.first();
        let shared_type = first
            .map(|n| n.node_type.as_str())
            .filter(|t| members.iter().all(|m| m.node_type == *t));

        let (label, icon) = match shared_type {
            Some(node_type) => (
                format!("{} items of type {}", members.len(), node_type),
                first.and_then(|n| n.icon()).unwrap_or(DEFAULT_ICON).to_string(),
            ),
            None => (
                format!("{} items of different types", members.len()),
                DEFAULT_ICON.to_string(),
            ),
        };

        Self {
            id,
            label,
            icon,
            direction,
            members: members.iter().map(|n| (*n).clone()).collect(),
        }
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.id.as_str())
    }
}

/// Renderer edge, always stored parent side first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Traversal direction that produced the edge
    pub direction: LineageDirection,
}

impl VisEdge {
    pub fn new(from: String, to: String, direction: LineageDirection) -> Self {
        Self {
            id: edge_id(&from, &to),
            from,
            to,
            direction,
        }
    }
}

pub fn edge_id(from: &str, to: &str) -> String {
    format!("{from}||{to}")
}

/// Renderer-ready graph. Carries no coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisGraph {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
    pub initial_selection: Vec<String>,
    pub layout: LayoutOptions,
}

impl VisGraph {
    pub fn node(&self, id: &str) -> Option<&VisNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&VisEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn combined_nodes(&self) -> impl Iterator<Item = &CombinedNode> {
        self.nodes.iter().filter_map(VisNode::as_combined)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
