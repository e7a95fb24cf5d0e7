//! Seat router.
//!
//! A fixed array of named seats. `assign` searches the catalog for free
//! models under a size ceiling, lets the decision engine pick a winner and
//! binds it through the model pool. All seat mutations are serialized behind
//! one lock; bind and unbind are atomic per seat.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use vertex_catalog::Catalog;
use vertex_core::{Error, Result};
use vertex_pool::{Hydrator, PoolStats, ResourceHandle, ResourcePool};
use vertex_providers::ProviderRegistry;
use vertex_store::SearchFilters;

use crate::activity::ActivityClock;
use crate::decision::{Candidate, CostDecisionEngine};
use crate::types::{AssignRequest, AssignResponse, Assignment, AssignmentAlternative, SeatStatus};

#[derive(Debug, Clone)]
pub struct SeatRouterConfig {
    pub seat_names: Vec<String>,
    /// Parameter ceiling in millions.
    pub max_params: u64,
    pub quality_threshold: f64,
    pub search_limit: usize,
    pub alternatives: usize,
}

impl Default for SeatRouterConfig {
    fn default() -> Self {
        Self {
            seat_names: ["Scribe", "Gatekeeper", "Balancer", "Keeper", "Echo"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_params: 7000,
            quality_threshold: 0.5,
            search_limit: 20,
            alternatives: 3,
        }
    }
}

/// Where a bound model is served from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelBinding {
    pub model_id: String,
    pub endpoint: String,
    pub provider: Option<String>,
    pub is_local: bool,
}

/// Resolves a model id to its serving endpoint.
///
/// A model listed by a configured provider binds to that provider (first by
/// name). Anything else binds to the local runtime.
pub struct ModelBindingHydrator {
    catalog: Arc<Catalog>,
    providers: Arc<ProviderRegistry>,
    local_runtime_url: String,
}

impl ModelBindingHydrator {
    pub fn new(
        catalog: Arc<Catalog>,
        providers: Arc<ProviderRegistry>,
        local_runtime_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            providers,
            local_runtime_url: local_runtime_url.into(),
        }
    }
}

impl Hydrator<ModelBinding> for ModelBindingHydrator {
    fn hydrate(&self, model_id: &str) -> Result<ModelBinding> {
        let record = self
            .catalog
            .get(model_id)?
            .ok_or_else(|| Error::NotFound(format!("model {} is not indexed", model_id)))?;

        let provider = self
            .providers
            .all()
            .into_iter()
            .find(|(_, cfg)| cfg.models.iter().any(|m| m == model_id));

        let binding = match provider {
            Some((name, cfg)) => ModelBinding {
                model_id: record.model_id,
                endpoint: cfg.base_url,
                provider: Some(name),
                is_local: record.is_local,
            },
            None => ModelBinding {
                model_id: record.model_id,
                endpoint: self.local_runtime_url.clone(),
                provider: None,
                is_local: record.is_local,
            },
        };
        debug!("Bound {} to {}", binding.model_id, binding.endpoint);
        Ok(binding)
    }

    fn release(&self, model_id: &str, binding: &ModelBinding) {
        info!("Unloaded model {} from {}", model_id, binding.endpoint);
    }
}

struct BoundSeat {
    model_id: String,
    handle: ResourceHandle<ModelBinding>,
    bound_at: DateTime<Utc>,
}

pub struct SeatRouter {
    config: SeatRouterConfig,
    clock: Arc<ActivityClock>,
    catalog: Arc<Catalog>,
    engine: Arc<CostDecisionEngine>,
    models: Arc<ResourcePool<ModelBinding>>,
    seats: Mutex<Vec<Option<BoundSeat>>>,
}

impl SeatRouter {
    pub fn new(
        config: SeatRouterConfig,
        clock: Arc<ActivityClock>,
        catalog: Arc<Catalog>,
        engine: Arc<CostDecisionEngine>,
        models: Arc<ResourcePool<ModelBinding>>,
    ) -> Self {
        let seats = (0..config.seat_names.len()).map(|_| None).collect();
        Self {
            config,
            clock,
            catalog,
            engine,
            models,
            seats: Mutex::new(seats),
        }
    }

    pub fn config(&self) -> &SeatRouterConfig {
        &self.config
    }

    pub fn seat_count(&self) -> usize {
        self.config.seat_names.len()
    }

    pub fn engine(&self) -> &Arc<CostDecisionEngine> {
        &self.engine
    }

    pub fn model_pool(&self) -> &Arc<ResourcePool<ModelBinding>> {
        &self.models
    }

    pub fn model_stats(&self) -> PoolStats {
        self.models.stats()
    }

    fn check_range(&self, seat_id: i64) -> Result<usize> {
        let seats = self.seat_count();
        usize::try_from(seat_id)
            .ok()
            .filter(|&idx| idx < seats)
            .ok_or(Error::Range { seat_id, seats })
    }

    /// Bind the seat to the best free model for `task_description`.
    pub fn assign(&self, seat_id: i64, task_description: &str) -> Result<Assignment> {
        self.clock.touch();
        let idx = self.check_range(seat_id)?;

        let filters = SearchFilters::free_only().with_max_params(self.config.max_params);
        let results = self
            .catalog
            .search(task_description, &filters, self.config.search_limit)?;
        if results.is_empty() {
            return Err(Error::NoCandidate(format!(
                "no free model under {}M params is indexed",
                self.config.max_params
            )));
        }

        let candidates: Vec<Candidate> = results.iter().map(Candidate::from_scored).collect();
        for c in &candidates {
            debug!(
                "Candidate {} quality={:.3} params={}M downloads={}",
                c.model_id, c.quality_score, c.params_millions, c.downloads
            );
        }
        let decision = self
            .engine
            .evaluate(&candidates, self.config.quality_threshold)?;
        let winner = results
            .iter()
            .find(|s| s.record.model_id == decision.chosen_model_id)
            .ok_or_else(|| {
                Error::Internal(format!("decision chose unknown model {}", decision.chosen_model_id))
            })?;
        let model_id = winner.record.model_id.clone();

        let mut seats = self.seats.lock();
        let previous = seats[idx].take();
        let keep_bound_at = match previous {
            Some(prev) if prev.model_id == model_id => Some((prev.bound_at, prev.handle)),
            Some(prev) => {
                self.release_unless_shared(&seats, prev);
                None
            }
            None => None,
        };

        // A collapsed handle is never reused: `get` re-hydrates after TTL eviction.
        let handle = self.models.get(&model_id)?;
        let (bound_at, reused) = match keep_bound_at {
            Some((bound_at, old)) if old.same_as(&handle) => (bound_at, true),
            _ => (Utc::now(), false),
        };
        let endpoint = handle.get()?.endpoint.clone();
        let handle_id = handle.id();
        seats[idx] = Some(BoundSeat {
            model_id: model_id.clone(),
            handle,
            bound_at,
        });
        drop(seats);

        let seat_name = self.config.seat_names[idx].clone();
        info!(
            "Seat {} ({}) -> {} (similarity {:.3}, reused: {})",
            idx, seat_name, model_id, winner.similarity, reused
        );

        Ok(Assignment {
            seat_name,
            seat_id: idx,
            model_id,
            description: winner.record.description.clone(),
            similarity: reported_similarity(winner.similarity),
            cost_per_1k_tokens: winner.record.cost_per_1k_tokens,
            params_millions: winner.record.params_millions,
            is_local: winner.record.is_local,
            alternatives: results
                .iter()
                .filter(|s| s.record.model_id != decision.chosen_model_id)
                .take(self.config.alternatives)
                .map(|s| AssignmentAlternative {
                    model_id: s.record.model_id.clone(),
                    similarity: reported_similarity(s.similarity),
                    params_millions: s.record.params_millions,
                })
                .collect(),
            endpoint,
            decision_id: decision.id,
            handle_id,
            reused,
        })
    }

    /// `assign`, with range and empty-index failures reported as `Rejected`.
    pub fn handle_assign(&self, request: &AssignRequest) -> Result<AssignResponse> {
        match self.assign(request.seat_id, &request.task_description) {
            Ok(assignment) => Ok(AssignResponse::Assigned(assignment)),
            Err(e @ (Error::Range { .. } | Error::NoCandidate(_))) => Ok(AssignResponse::Rejected {
                error: e.kind().to_string(),
                message: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Clear the seat's binding. Returns false if it was already empty.
    pub fn unload_seat(&self, seat_id: i64) -> Result<bool> {
        self.clock.touch();
        let idx = self.check_range(seat_id)?;
        let mut seats = self.seats.lock();
        match seats[idx].take() {
            Some(bound) => {
                info!("Unloading seat {} ({})", idx, bound.model_id);
                self.release_unless_shared(&seats, bound);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unload every seat. Returns how many were bound.
    pub fn unload_all(&self) -> usize {
        self.clock.touch();
        let mut seats = self.seats.lock();
        let mut unloaded = 0;
        for idx in 0..seats.len() {
            if let Some(bound) = seats[idx].take() {
                self.release_unless_shared(&seats, bound);
                unloaded += 1;
            }
        }
        if unloaded > 0 {
            info!("Unloaded {} seats", unloaded);
        }
        unloaded
    }

    pub fn status(&self, seat_id: i64) -> Result<SeatStatus> {
        let idx = self.check_range(seat_id)?;
        let seats = self.seats.lock();
        Ok(self.describe(idx, seats[idx].as_ref()))
    }

    pub fn status_all(&self) -> Vec<SeatStatus> {
        let seats = self.seats.lock();
        seats
            .iter()
            .enumerate()
            .map(|(idx, bound)| self.describe(idx, bound.as_ref()))
            .collect()
    }

    fn describe(&self, idx: usize, bound: Option<&BoundSeat>) -> SeatStatus {
        SeatStatus {
            seat_id: idx,
            seat_name: self.config.seat_names[idx].clone(),
            model_id: bound.map(|b| b.model_id.clone()),
            endpoint: bound.and_then(|b| b.handle.get().ok().map(|v| v.endpoint.clone())),
            bound_at: bound.map(|b| b.bound_at),
            live: bound.is_some_and(|b| b.handle.is_live()),
            handle_id: bound.map(|b| b.handle.id()),
        }
    }

    /// Release `bound`'s handle unless another seat still holds the model.
    /// Caller must already have removed `bound` from `seats`.
    fn release_unless_shared(&self, seats: &[Option<BoundSeat>], bound: BoundSeat) {
        let shared = seats
            .iter()
            .flatten()
            .any(|other| other.model_id == bound.model_id);
        if shared {
            debug!("Model {} still bound elsewhere, keeping it", bound.model_id);
        } else {
            self.models.release_handle(&bound.handle);
        }
    }
}

/// Callers see similarity in [0, 1]; anti-correlated matches report 0.
fn reported_similarity(similarity: f32) -> f32 {
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}
