pub mod analyzer;
pub mod cache;
pub mod compactor;
pub mod fetcher;
pub mod graph;
pub mod grid;
pub mod options;
pub mod result;
pub mod traversal;
pub mod vis;

pub use analyzer::Lineage;
pub use cache::LineageCache;
pub use compactor::GraphCompactor;
pub use fetcher::{JsonFileFetcher, ProvenanceFetcher};
pub use graph::{LineageGraph, LineageStatistics};
pub use grid::{GridOptions, LineageGrid, LineageGridRow};
pub use options::{GenerationPolicy, GroupingOptions, LayoutOptions, LineageOptions, LineageOverrides};
pub use result::LineageResult;
pub use traversal::{DepthWalker, NodeAtDistance};
pub use vis::{BasicNode, CombinedNode, VisEdge, VisGraph, VisNode};
