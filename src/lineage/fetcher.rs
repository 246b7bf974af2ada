use crate::error::{LineageError, Result};
use crate::lineage::result::LineageResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of raw provenance graphs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProvenanceFetcher: Send + Sync {
    /// Lineage of `seed` up to `max_depth` generations in each direction
    async fn fetch_lineage(&self, seed: &str, max_depth: usize) -> Result<LineageResult>;
}

/// Reads provenance JSON from disk: either one file, or a directory holding
/// one `<seed>.json` file per seed
#[derive(Debug, Clone)]
pub struct JsonFileFetcher {
    path: PathBuf,
}

impl JsonFileFetcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn file_for(&self, seed: &str) -> PathBuf {
        if self.path.is_dir() {
            let file_name: String = seed
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
                .collect();
            self.path.join(format!("{file_name}.json"))
        } else {
            self.path.clone()
        }
    }

    /// Seed recorded in a single provenance file
    pub async fn read_seed(&self) -> Result<String> {
        let result = self.read(&self.path, "").await?;
        Ok(result.seed)
    }

    async fn read(&self, file: &Path, seed: &str) -> Result<LineageResult> {
        debug!("Loading provenance from: {:?}", file);
        let content = tokio::fs::read_to_string(file).await.map_err(|e| LineageError::Fetch {
            seed: seed.to_string(),
            message: format!("failed to read {}: {e}", file.display()),
        })?;
        LineageResult::from_json(&content)
    }
}

#[async_trait]
impl ProvenanceFetcher for JsonFileFetcher {
    async fn fetch_lineage(&self, seed: &str, max_depth: usize) -> Result<LineageResult> {
        let result = self.read(&self.file_for(seed), seed).await?;
        if result.seed != seed {
            return Err(LineageError::Fetch {
                seed: seed.to_string(),
                message: format!("provenance file is centered on {}", result.seed),
            });
        }
        Ok(result.within_depth(max_depth))
    }
}
