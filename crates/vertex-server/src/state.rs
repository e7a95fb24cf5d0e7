//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use vertex_catalog::{Catalog, RegistryFetcher};
use vertex_core::{Result, VertexConfig};
use vertex_infer::EmbedderKind;
use vertex_pool::{PoolStats, ResourcePool};
use vertex_providers::{ProviderGateway, ProviderRegistry};
use vertex_runtime::{
    ActivityClock, CostDecisionEngine, LifecycleMonitor, ModelBindingHydrator, Scheduler,
    SeatRouter, SeatRouterConfig, TerminationHook,
};
use vertex_store::CatalogStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const PROVIDER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Every service, constructed once and shared by all route handlers.
pub struct AppState {
    pub config: VertexConfig,
    pub clock: Arc<ActivityClock>,
    pub lifecycle: Arc<LifecycleMonitor>,
    pub catalog: Arc<Catalog>,
    pub engine: Arc<CostDecisionEngine>,
    pub seats: Arc<SeatRouter>,
    pub providers: Arc<ProviderGateway>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn build(
        config: VertexConfig,
        registry: Arc<dyn RegistryFetcher>,
        hook: TerminationHook,
    ) -> Result<Self> {
        let clock = Arc::new(ActivityClock::new());

        let store = CatalogStore::open(&config.data_paths.catalog, config.embedding_dim)?;
        let kind = EmbedderKind::detect(&config.data_paths.models, config.embedding_dim);
        let embedder = Arc::new(vertex_catalog::embedder_pool(
            kind,
            config.embedding_dim,
            config.pools.embedder_ttl,
        ));
        let catalog = Arc::new(Catalog::new(
            store,
            embedder,
            registry,
            config.fetch_timeout,
        ));

        let provider_registry = Arc::new(ProviderRegistry::load(&config.data_paths.providers_file)?);
        let providers = Arc::new(ProviderGateway::new(
            provider_registry.clone(),
            config.pools.provider_ttl,
            config.fetch_timeout,
        ));

        let hydrator = Arc::new(ModelBindingHydrator::new(
            catalog.clone(),
            provider_registry,
            config.local_runtime_url.clone(),
        ));
        let models = Arc::new(ResourcePool::new("models", config.pools.model_ttl, hydrator));

        let engine = Arc::new(CostDecisionEngine::new());
        let seats = Arc::new(SeatRouter::new(
            SeatRouterConfig::default(),
            clock.clone(),
            catalog.clone(),
            engine.clone(),
            models,
        ));

        let lifecycle = Arc::new(LifecycleMonitor::new(
            clock.clone(),
            config.lifecycle.clone(),
            hook,
        ));

        Ok(Self {
            config,
            clock,
            lifecycle,
            catalog,
            engine,
            seats,
            providers,
            started_at: Utc::now(),
        })
    }

    /// Register every periodic background task.
    pub fn schedule(self: &Arc<Self>, scheduler: &mut Scheduler) {
        self.lifecycle.schedule(scheduler);

        let state = self.clone();
        scheduler.every("pool-sweep", SWEEP_INTERVAL, move || {
            let state = state.clone();
            async move {
                let providers = state.providers.sweep();
                let models = state.seats.model_pool().sweep();
                let embedder = state.catalog.embedder_pool().sweep();
                if providers + models > 0 || embedder {
                    info!(
                        "Swept {} provider clients, {} model bindings, embedder: {}",
                        providers, models, embedder
                    );
                }
                Ok(())
            }
        });

        let state = self.clone();
        scheduler.every("provider-reload", PROVIDER_POLL_INTERVAL, move || {
            let state = state.clone();
            async move {
                if let Some(changed) = state.providers.reload_if_modified()? {
                    info!("Providers reloaded, changed: {:?}", changed);
                }
                Ok(())
            }
        });

        let state = self.clone();
        scheduler.every("bulk-index", self.config.reindex_interval, move || {
            let state = state.clone();
            async move {
                // A running index pass counts as activity.
                state.clock.pulse();
                let report = state
                    .catalog
                    .bulk_index_popular(state.config.bulk_index_limit)
                    .await;
                state.clock.pulse();
                if let Ok(report) = &report {
                    if report.failed > 0 {
                        warn!("Bulk index: {} models failed", report.failed);
                    }
                }
                report.map(|_| ())
            }
        });
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        vec![
            self.providers.stats(),
            self.catalog.embedder_stats(),
            self.seats.model_stats(),
        ]
    }

    /// Release every pooled resource. Called once on shutdown.
    pub fn unload_all(&self) {
        let seats = self.seats.unload_all();
        let models = self.seats.model_pool().clear();
        let clients = self.providers.pool().clear();
        let embedder = self.catalog.embedder_pool().release();
        info!(
            "Unloaded {} seats, {} model bindings, {} provider clients, embedder: {}",
            seats, models, clients, embedder
        );
    }
}
