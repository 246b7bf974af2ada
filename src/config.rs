/// Configuration management for the lineage tools
use crate::lineage::grid::GridOptions;
use crate::lineage::options::LineageOptions;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lineage: LineageOptions,
    pub grid: GridOptions,
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of seeds kept before the least recently used is evicted
    pub capacity: usize,
    /// Entries older than this are refetched. `None` keeps them until evicted.
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 50,
            ttl_seconds: Some(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub max_depth: usize,
    /// Directory of `<seed>.json` files or a single provenance file
    pub data_path: Option<PathBuf>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            data_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(depth) = std::env::var("LINEAGE_MAX_DEPTH") {
            config.fetch.max_depth = depth.parse()?;
        }

        if let Ok(path) = std::env::var("LINEAGE_DATA_PATH") {
            config.fetch.data_path = Some(PathBuf::from(path));
        }

        if let Ok(size) = std::env::var("LINEAGE_COMBINE_SIZE") {
            config.lineage.grouping.combine_size = match size.as_str() {
                "" | "0" | "off" => None,
                value => Some(value.parse()?),
            };
        }

        if let Ok(capacity) = std::env::var("LINEAGE_CACHE_CAPACITY") {
            config.cache.capacity = capacity.parse()?;
        }

        if let Ok(ttl) = std::env::var("LINEAGE_CACHE_TTL_SECONDS") {
            config.cache.ttl_seconds = Some(ttl.parse()?);
        }

        Ok(config)
    }

    /// Merge with another configuration (other takes precedence where it differs from defaults)
    pub fn merge_with(&mut self, other: Config) {
        let defaults = Config::default();

        if other.lineage != defaults.lineage {
            self.lineage = other.lineage;
        }
        if other.grid != defaults.grid {
            self.grid = other.grid;
        }
        if other.cache.capacity != defaults.cache.capacity {
            self.cache.capacity = other.cache.capacity;
        }
        if other.cache.ttl_seconds != defaults.cache.ttl_seconds {
            self.cache.ttl_seconds = other.cache.ttl_seconds;
        }
        if other.fetch.max_depth != defaults.fetch.max_depth {
            self.fetch.max_depth = other.fetch.max_depth;
        }
        if other.fetch.data_path.is_some() {
            self.fetch.data_path = other.fetch.data_path;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.lineage.validate()?;

        if self.cache.capacity == 0 {
            return Err(anyhow::anyhow!("Cache capacity must be greater than 0"));
        }

        if self.cache.ttl_seconds == Some(0) {
            return Err(anyhow::anyhow!("Cache TTL must be greater than 0 when set"));
        }

        if self.grid.page_size == 0 {
            return Err(anyhow::anyhow!("Grid page size must be greater than 0"));
        }

        Ok(())
    }
}
