use crate::error::{LineageError, Result};
use crate::lineage::compactor::GraphCompactor;
use crate::lineage::graph::LineageStatistics;
use crate::lineage::grid::{GridOptions, LineageGrid};
use crate::lineage::options::LineageOptions;
use crate::lineage::result::LineageResult;
use crate::lineage::traversal::DepthWalker;
use crate::lineage::vis::VisGraph;
use crate::types::NodeId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Per-seed cache entry: the fetched lineage or the reason it failed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    pub seed: NodeId,
    pub result: Option<LineageResult>,
    pub error: Option<String>,
    pub statistics: Option<LineageStatistics>,
    pub fetched_at: DateTime<Utc>,
}

impl Lineage {
    pub fn new(result: LineageResult) -> Self {
        let statistics = LineageStatistics::compute(&result);
        Self {
            seed: result.seed.clone(),
            result: Some(result),
            error: None,
            statistics: Some(statistics),
            fetched_at: Utc::now(),
        }
    }

    pub fn failed(seed: impl Into<NodeId>, error: impl ToString) -> Self {
        Self {
            seed: seed.into(),
            result: None,
            error: Some(error.to_string()),
            statistics: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.result.is_some()
    }

    /// The raw result, or the stored fetch failure
    pub fn result(&self) -> Result<&LineageResult> {
        match (&self.result, &self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(LineageError::Fetch {
                seed: self.seed.clone(),
                message: error.clone(),
            }),
            (None, None) => Err(LineageError::structural(format!(
                "lineage entry for {} holds neither a result nor an error",
                self.seed
            ))),
        }
    }

    /// Apply every configured filter in order, all through filter_in or all through filter_out
    pub fn filter_result(&self, options: &LineageOptions) -> Result<LineageResult> {
        let mut filtered = self.result()?.clone();

        for filter in &options.filters {
            filtered = if options.filter_in {
                filtered.filter_in(&filter.field, &filter.value)?
            } else {
                filtered.filter_out(&filter.field, &filter.value)?
            };
        }

        debug!(
            "Applied {} filters to lineage of {}: {} nodes and {} edges remain",
            options.filters.len(),
            self.seed,
            filtered.len(),
            filtered.edge_count()
        );
        Ok(filtered)
    }

    pub fn generate_graph(&self, options: &LineageOptions) -> Result<VisGraph> {
        options.validate()?;
        let filtered = self.filter_result(options)?;
        GraphCompactor::new(options.grouping.clone(), options.layout.clone()).compact(&filtered)
    }

    /// Filtered, flattened rows for the lineage grid. Empty when the seed was filtered out.
    pub fn grid(&self, options: &LineageOptions, grid: &GridOptions) -> Result<LineageGrid> {
        let filtered = self.filter_result(options)?;
        if filtered.seed_node().is_none() {
            warn!("Seed {} was removed by the lineage filters", self.seed);
            return Ok(LineageGrid::empty(self.seed.clone(), grid.direction));
        }

        let list = DepthWalker::get_depth_first_node_list(
            &filtered.nodes,
            &filtered.seed,
            grid.direction,
            grid.distance,
        )?;
        Ok(LineageGrid::from_node_list(self.seed.clone(), grid.direction, list))
    }

    /// Fold deeper data for this seed into the entry and refresh statistics
    pub fn merge(&mut self, other: &LineageResult) {
        let merged = match &self.result {
            Some(existing) => existing.merge_lineage(other),
            None => other.clone(),
        };

        info!(
            "Merged lineage of {} into entry {}: {} nodes",
            other.seed,
            self.seed,
            merged.len()
        );

        self.statistics = Some(LineageStatistics::compute(&merged));
        self.result = Some(merged);
        self.error = None;
        self.fetched_at = Utc::now();
    }
}
