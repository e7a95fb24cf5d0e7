//! Read-through model catalog.
//!
//! `CatalogStore` is the durable source of truth. This service layers the
//! cache-aside policy on top: local hit, otherwise registry fetch, parse,
//! embed, upsert. Staleness is governed by an explicit `CachePolicy`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ndarray::Array1;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};
use vertex_core::{Error, Result};
use vertex_infer::EmbedderBackend;
use vertex_pool::{PoolStats, SingleSlotPool};
use vertex_store::{CatalogStats, CatalogStore, ModelRecord, ScoredModel, SearchFilters};

use crate::descriptor::{embedding_text, parse_descriptor};
use crate::registry::RegistryFetcher;

/// Embedding engine kept in a single collapsible slot.
pub type EmbedderPool = SingleSlotPool<Arc<dyn EmbedderBackend>>;

/// When a locally stored record must be refreshed from the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// Records older than this are refetched. `None` means never stale.
    pub max_age: Option<Duration>,
}

impl CachePolicy {
    pub fn is_stale(&self, record: &ModelRecord, now: i64) -> bool {
        match self.max_age {
            Some(max_age) => (now - record.last_updated).max(0) as u64 >= max_age.as_secs(),
            None => false,
        }
    }
}

/// Outcome of a bulk indexing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkIndexReport {
    pub listed: usize,
    pub added: usize,
    pub already_indexed: usize,
    pub failed: usize,
}

/// Synchronous half of the catalog: durable store plus the embedding engine.
struct Local {
    store: CatalogStore,
    embedder: Arc<EmbedderPool>,
    /// Engine name recorded in the store; every engine must match it.
    pinned: OnceCell<String>,
}

impl Local {
    fn embed(&self, text: &str) -> Result<Array1<f32>> {
        let handle = self.embedder.get()?;
        let engine = handle.get()?;
        self.check_engine(engine.name())?;
        let vector = engine.embed(text)?;
        if vector.len() != self.store.embedding_dim() {
            return Err(Error::Inference(format!(
                "{} produced {} dims, catalog stores {}",
                engine.name(),
                vector.len(),
                self.store.embedding_dim()
            )));
        }
        Ok(vector)
    }

    fn check_engine(&self, name: &str) -> Result<()> {
        let pinned = self
            .pinned
            .get_or_try_init(|| self.store.pin_embedder(name))?;
        if pinned != name {
            return Err(Error::Config(format!(
                "catalog embeddings were produced by {}, current engine is {}; re-index into a fresh catalog",
                pinned, name
            )));
        }
        Ok(())
    }

    /// Embed and store a parsed record. `requested` becomes an alias when the
    /// registry answered under another id.
    fn index(&self, requested: &str, mut record: ModelRecord) -> Result<ModelRecord> {
        record.embedding = self.embed(&embedding_text(&record))?.to_vec();
        self.store.upsert(&record)?;
        if requested != record.model_id {
            debug!("{} is served as {}", requested, record.model_id);
            self.store.add_alias(requested, &record.model_id)?;
        }
        info!(
            "Indexed {} (params={}M, cost={})",
            record.model_id, record.params_millions, record.cost_per_1k_tokens
        );

        // Re-read so added_timestamp reflects the stored row.
        self.store
            .get(&record.model_id)?
            .ok_or_else(|| Error::Storage(format!("{} missing after upsert", record.model_id)))
    }
}

pub struct Catalog {
    local: Arc<Local>,
    registry: Arc<dyn RegistryFetcher>,
    fetch_timeout: Duration,
    policy: CachePolicy,
}

impl Catalog {
    pub fn new(
        store: CatalogStore,
        embedder: Arc<EmbedderPool>,
        registry: Arc<dyn RegistryFetcher>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            local: Arc::new(Local {
                store,
                embedder,
                pinned: OnceCell::new(),
            }),
            registry,
            fetch_timeout,
            policy: CachePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &CatalogStore {
        &self.local.store
    }

    pub fn embedder_pool(&self) -> &Arc<EmbedderPool> {
        &self.local.embedder
    }

    /// Embed text with the pinned engine, loading it if it has collapsed.
    pub fn embed(&self, text: &str) -> Result<Array1<f32>> {
        self.local.embed(text)
    }

    pub fn upsert(&self, record: &ModelRecord) -> Result<()> {
        self.local.store.upsert(record)
    }

    pub fn exists(&self, model_id: &str) -> Result<bool> {
        self.local.store.exists(model_id)
    }

    /// Local lookup only.
    pub fn get(&self, model_id: &str) -> Result<Option<ModelRecord>> {
        self.local.store.get(model_id)
    }

    /// Return the record, fetching and indexing it on a miss or when stale.
    pub async fn get_or_fetch(&self, model_id: &str) -> Result<ModelRecord> {
        let now = Utc::now().timestamp();
        let id = model_id.to_string();
        if let Some(record) = self.offload(move |local| local.store.get(&id)).await? {
            if !self.policy.is_stale(&record, now) {
                return Ok(record);
            }
            debug!("Catalog record {} is stale, refreshing", model_id);
        }
        self.fetch_and_index(model_id).await
    }

    /// Index `model_id` if absent. Returns true when newly added.
    pub async fn index_model(&self, model_id: &str) -> Result<bool> {
        let id = model_id.to_string();
        if self.offload(move |local| local.store.exists(&id)).await? {
            return Ok(false);
        }
        self.fetch_and_index(model_id).await?;
        Ok(true)
    }

    /// Index the registry's most popular models that are not yet present.
    pub async fn bulk_index_popular(&self, limit: usize) -> Result<BulkIndexReport> {
        info!("Bulk indexing up to {} popular models", limit);
        let ids = self.bounded(self.registry.list_popular(limit), "popular models").await?;

        let mut report = BulkIndexReport {
            listed: ids.len(),
            ..Default::default()
        };
        for id in ids.iter().take(limit) {
            match self.index_model(id).await {
                Ok(true) => report.added += 1,
                Ok(false) => report.already_indexed += 1,
                Err(e) => {
                    warn!("Failed to index {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Bulk indexing complete: {} added, {} present, {} failed",
            report.added, report.already_indexed, report.failed
        );
        Ok(report)
    }

    /// Filtered similarity search, ranked by (similarity, downloads) descending.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<ScoredModel>> {
        let vector = self.local.embed(query)?;
        self.local.store.search(&vector, filters, limit)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<ModelRecord>> {
        self.local.store.list(limit)
    }

    pub fn count(&self) -> Result<i64> {
        self.local.store.count()
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        self.local.store.stats()
    }

    pub fn embedder_stats(&self) -> PoolStats {
        self.local.embedder.stats()
    }

    async fn fetch_and_index(&self, model_id: &str) -> Result<ModelRecord> {
        let data = self
            .bounded(self.registry.fetch_model(model_id), model_id)
            .await?;

        let record = parse_descriptor(model_id, &data, Utc::now().timestamp());
        let requested = model_id.to_string();
        self.offload(move |local| local.index(&requested, record))
            .await
    }

    /// Run store and embedding work on the blocking pool.
    async fn offload<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Local) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let local = self.local.clone();
        tokio::task::spawn_blocking(move || f(&local))
            .await
            .map_err(|e| Error::Internal(format!("catalog task: {}", e)))?
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
        what: &str,
    ) -> Result<T> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "registry fetch of {} exceeded {:?}",
                    what, self.fetch_timeout
                ))
            })?
    }
}
