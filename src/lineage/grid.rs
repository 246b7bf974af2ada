use crate::lineage::traversal::NodeAtDistance;
use crate::types::{LineageDirection, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Grid view settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridOptions {
    pub direction: LineageDirection,
    pub distance: usize,
    pub page_size: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            direction: LineageDirection::Children,
            distance: 5,
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageGridRow {
    pub node: Node,
    pub distance: usize,
    /// Occurrences of this node in the flattened list beyond the first
    pub duplicates: usize,
    pub is_seed: bool,
}

/// Flattened lineage rows for paged tabular display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageGrid {
    pub seed: NodeId,
    pub direction: LineageDirection,
    pub rows: Vec<LineageGridRow>,
}

impl LineageGrid {
    pub fn empty(seed: impl Into<NodeId>, direction: LineageDirection) -> Self {
        Self {
            seed: seed.into(),
            direction,
            rows: Vec::new(),
        }
    }

    /// Tally duplicates over a depth-first list whose first entry is the seed
    pub fn from_node_list(seed: impl Into<NodeId>, direction: LineageDirection, list: Vec<NodeAtDistance>) -> Self {
        let mut occurrences: HashMap<NodeId, usize> = HashMap::new();
        for item in &list {
            *occurrences.entry(item.node.id.clone()).or_insert(0) += 1;
        }

        let rows = list
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let count = occurrences.get(&item.node.id).copied().unwrap_or(1);
                LineageGridRow {
                    is_seed: index == 0 && item.distance == 0,
                    duplicates: count.saturating_sub(1),
                    distance: item.distance,
                    node: item.node,
                }
            })
            .collect();

        Self {
            seed: seed.into(),
            direction,
            rows,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn page_count(&self, max_rows: usize) -> usize {
        if max_rows == 0 {
            return 0;
        }
        self.rows.len().div_ceil(max_rows)
    }

    /// Rows of a 1-based page. Out of range pages are empty.
    pub fn page(&self, page_number: usize, max_rows: usize) -> &[LineageGridRow] {
        if page_number == 0 || max_rows == 0 {
            return &[];
        }
        let start = (page_number - 1).saturating_mul(max_rows);
        if start >= self.rows.len() {
            return &[];
        }
        let end = (start + max_rows).min(self.rows.len());
        &self.rows[start..end]
    }

    pub fn seed_row(&self) -> Option<&LineageGridRow> {
        self.rows.first().filter(|row| row.is_seed)
    }
}
