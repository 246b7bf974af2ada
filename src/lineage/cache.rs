use crate::config::CacheSettings;
use crate::error::{LineageError, Result};
use crate::lineage::analyzer::Lineage;
use crate::lineage::fetcher::ProvenanceFetcher;
use crate::lineage::result::LineageResult;
use crate::types::NodeId;
use chrono::{Duration, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

type PendingFetch = Arc<OnceCell<Arc<Lineage>>>;

/// Per-seed lineage cache with LRU eviction, optional expiry and at most one
/// fetch in flight per seed
pub struct LineageCache {
    ttl: Option<Duration>,
    entries: Mutex<LruCache<NodeId, Arc<Lineage>>>,
    pending: Mutex<HashMap<NodeId, PendingFetch>>,
}

impl LineageCache {
    pub fn new(settings: &CacheSettings) -> Result<Self> {
        let capacity = NonZeroUsize::new(settings.capacity)
            .ok_or_else(|| LineageError::invalid_options("cache capacity must be greater than 0"))?;
        let ttl = match settings.ttl_seconds {
            Some(0) => return Err(LineageError::invalid_options("cache TTL must be greater than 0")),
            Some(seconds) => Some(Duration::seconds(seconds as i64)),
            None => None,
        };

        Ok(Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn is_fresh(&self, entry: &Lineage) -> bool {
        self.ttl.map_or(true, |ttl| Utc::now() - entry.fetched_at < ttl)
    }

    /// Cached entry for `seed`, if present and not expired
    pub async fn get(&self, seed: &str) -> Option<Arc<Lineage>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(seed)?.clone();
        if self.is_fresh(&entry) {
            return Some(entry);
        }

        debug!("Cached lineage for {} expired", seed);
        entries.pop(seed);
        None
    }

    /// Cached entry, or a fetch shared by every concurrent caller for the same seed.
    /// Fetch failures are stored on the entry rather than returned.
    pub async fn load(&self, seed: &str, max_depth: usize, fetcher: &dyn ProvenanceFetcher) -> Arc<Lineage> {
        let cell = {
            let mut pending = self.pending.lock().await;
            if let Some(entry) = self.get(seed).await {
                return entry;
            }
            pending
                .entry(seed.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let entry = cell
            .get_or_init(|| async {
                let lineage = match fetcher.fetch_lineage(seed, max_depth).await {
                    Ok(result) => {
                        info!("Loaded lineage for {} with {} nodes", seed, result.len());
                        Lineage::new(result)
                    }
                    Err(err) => {
                        warn!("Lineage fetch for {} failed: {}", seed, err);
                        Lineage::failed(seed, err)
                    }
                };
                let entry = Arc::new(lineage);
                self.entries.lock().await.put(seed.to_string(), entry.clone());
                entry
            })
            .await
            .clone();

        let mut pending = self.pending.lock().await;
        if pending.get(seed).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            pending.remove(seed);
        }

        entry
    }

    /// Fold deeper data into the seed's entry, creating it when absent
    pub async fn merge(&self, seed: &str, result: &LineageResult) -> Arc<Lineage> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(seed) {
            Arc::make_mut(entry).merge(result);
            return entry.clone();
        }

        let mut lineage = Lineage::failed(seed, "not loaded");
        lineage.merge(result);
        let entry = Arc::new(lineage);
        entries.put(seed.to_string(), entry.clone());
        entry
    }

    pub async fn invalidate(&self, seed: &str) -> Option<Arc<Lineage>> {
        self.entries.lock().await.pop(seed)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
