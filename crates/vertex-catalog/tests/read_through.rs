//! Read-through behavior of the catalog against a fake registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use vertex_catalog::{CachePolicy, Catalog, EmbedderPool, RegistryFetcher};
use vertex_core::{Error, Result};
use ndarray::Array1;
use vertex_infer::{EmbedderBackend, HashEmbedder};
use vertex_store::{CatalogStore, SearchFilters};

#[derive(Default)]
struct FakeRegistry {
    models: Mutex<HashMap<String, Value>>,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeRegistry {
    fn with(models: &[(&str, Value)]) -> Self {
        let registry = Self::default();
        for (id, data) in models {
            registry.models.lock().insert(id.to_string(), data.clone());
        }
        registry
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryFetcher for FakeRegistry {
    async fn fetch_model(&self, model_id: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.models
            .lock()
            .get(model_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(model_id.to_string()))
    }

    async fn list_popular(&self, limit: usize) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.models.lock().keys().cloned().collect();
        ids.sort();
        ids.truncate(limit);
        Ok(ids)
    }
}

fn descriptor(id: &str, description: &str, extra: Value) -> Value {
    let mut data = json!({
        "modelId": id,
        "tags": ["text-generation"],
        "pipeline_tag": "text-generation",
        "library_name": "transformers",
        "downloads": 1000,
        "cardData": {"description": description},
    });
    if let (Some(base), Some(extra)) = (data.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    data
}

/// Same vectors as the hash embedder, reported under another engine name.
struct RenamedEmbedder(HashEmbedder);

impl EmbedderBackend for RenamedEmbedder {
    fn embed(&self, text: &str) -> Result<Array1<f32>> {
        self.0.embed(text)
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn name(&self) -> &str {
        "renamed-engine"
    }
}

fn catalog_with(
    dir: &TempDir,
    registry: Arc<FakeRegistry>,
    engine: fn() -> Arc<dyn EmbedderBackend>,
) -> Catalog {
    let store = CatalogStore::open(dir.path(), 384).unwrap();
    let embedder = EmbedderPool::new("embedder", Duration::from_secs(600), move || Ok(engine()));
    Catalog::new(store, Arc::new(embedder), registry, Duration::from_secs(30))
}

fn catalog(dir: &TempDir, registry: Arc<FakeRegistry>) -> Catalog {
    catalog_with(dir, registry, || {
        Arc::new(HashEmbedder::new(384)) as Arc<dyn EmbedderBackend>
    })
}

#[tokio::test]
async fn test_fetch_on_miss_then_local_hit() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::with(&[(
        "acme/coder-1b",
        descriptor("acme/coder-1b", "fast code generation", json!({})),
    )]));
    let catalog = catalog(&dir, registry.clone());

    assert!(!catalog.exists("acme/coder-1b").unwrap());
    let record = catalog.get_or_fetch("acme/coder-1b").await.unwrap();
    assert_eq!(record.params_millions, 1000);
    assert_eq!(record.embedding.len(), 384);
    assert!(catalog.exists("acme/coder-1b").unwrap());

    let again = catalog.get_or_fetch("acme/coder-1b").await.unwrap();
    assert_eq!(again, record);
    assert_eq!(registry.fetches(), 1);
}

#[tokio::test]
async fn test_unknown_model_is_not_found() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog(&dir, Arc::new(FakeRegistry::default()));

    let err = catalog.get_or_fetch("nobody/nothing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(catalog.count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_registry_times_out() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry {
        delay: Some(Duration::from_secs(60)),
        ..FakeRegistry::with(&[("slow/model", descriptor("slow/model", "slow", json!({})))])
    });
    let catalog = catalog(&dir, registry);

    let err = catalog.get_or_fetch("slow/model").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(!catalog.exists("slow/model").unwrap());
}

#[tokio::test]
async fn test_search_respects_cost_ceiling() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::with(&[
        ("free/coder", descriptor("free/coder", "code generation assistant", json!({}))),
        (
            "paid/coder",
            descriptor(
                "paid/coder",
                "code generation assistant premium",
                json!({"cost_per_1k_tokens": 0.01}),
            ),
        ),
    ]));
    let catalog = catalog(&dir, registry);
    catalog.get_or_fetch("free/coder").await.unwrap();
    catalog.get_or_fetch("paid/coder").await.unwrap();

    let free = catalog
        .search("code generation", &SearchFilters::free_only(), 10)
        .unwrap();
    assert_eq!(free.len(), 1);
    assert!(free.iter().all(|m| m.record.cost_per_1k_tokens <= 0.0));

    let any = catalog
        .search("code generation", &SearchFilters::free_only().with_max_cost(1.0), 10)
        .unwrap();
    assert_eq!(any.len(), 2);
}

#[tokio::test]
async fn test_stale_record_refreshes_and_failures_propagate() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::with(&[(
        "acme/chat",
        descriptor("acme/chat", "chat model", json!({})),
    )]));
    let catalog = catalog(&dir, registry.clone()).with_policy(CachePolicy {
        max_age: Some(Duration::ZERO),
    });

    catalog.get_or_fetch("acme/chat").await.unwrap();
    catalog.get_or_fetch("acme/chat").await.unwrap();
    assert_eq!(registry.fetches(), 2);

    registry.models.lock().clear();
    let err = catalog.get_or_fetch("acme/chat").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_bulk_index_skips_present_models() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::with(&[
        ("a/one", descriptor("a/one", "first", json!({}))),
        ("b/two", descriptor("b/two", "second", json!({}))),
        ("c/three", descriptor("c/three", "third", json!({}))),
    ]));
    let catalog = catalog(&dir, registry);
    assert!(catalog.index_model("b/two").await.unwrap());
    assert!(!catalog.index_model("b/two").await.unwrap());

    let report = catalog.bulk_index_popular(50).await.unwrap();
    assert_eq!(report.listed, 3);
    assert_eq!(report.added, 2);
    assert_eq!(report.already_indexed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(catalog.count().unwrap(), 3);
}

#[tokio::test]
async fn test_canonical_id_answers_later_lookups_locally() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::with(&[(
        "gpt2",
        descriptor("community/gpt2", "small text generator", json!({})),
    )]));
    let catalog = catalog(&dir, registry.clone());

    assert!(catalog.index_model("gpt2").await.unwrap());
    assert!(!catalog.index_model("gpt2").await.unwrap());
    assert!(catalog.exists("gpt2").unwrap());

    let record = catalog.get_or_fetch("gpt2").await.unwrap();
    assert_eq!(record.model_id, "community/gpt2");
    assert_eq!(registry.fetches(), 1);
    assert_eq!(catalog.count().unwrap(), 1);
}

#[tokio::test]
async fn test_catalog_refuses_a_different_engine() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::with(&[(
        "acme/chat",
        descriptor("acme/chat", "chat model", json!({})),
    )]));
    {
        let catalog = catalog(&dir, registry.clone());
        catalog.get_or_fetch("acme/chat").await.unwrap();
    }

    let reopened = catalog_with(&dir, registry, || {
        Arc::new(RenamedEmbedder(HashEmbedder::new(384))) as Arc<dyn EmbedderBackend>
    });
    let err = reopened
        .search("chat", &SearchFilters::free_only(), 10)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(reopened.get("acme/chat").unwrap().is_some());
}
