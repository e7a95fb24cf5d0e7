//! Catalog record types, search filters, and search results.

use serde::{Deserialize, Serialize};

/// A model descriptor with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRecord {
    pub model_id: String,
    pub model_name: String,
    pub author: String,
    pub description: String,
    /// Always exactly `embedding_dim` long once stored.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub downloads: u64,
    pub likes: u64,
    pub tags: Vec<String>,
    /// Pipeline / task type, e.g. `text-generation`.
    pub capability_tag: String,
    pub library_name: String,
    pub is_local: bool,
    pub cost_per_1k_tokens: f64,
    pub params_millions: u64,
    pub context_length: u64,
    /// Unix seconds.
    pub last_updated: i64,
    /// Unix seconds. Preserved across upserts.
    pub added_timestamp: i64,
}

impl ModelRecord {
    pub fn is_free(&self) -> bool {
        self.cost_per_1k_tokens == 0.0
    }
}

/// Filters applied before similarity ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Inclusive cost ceiling. The default (0.0) selects free models only.
    pub max_cost: f64,
    #[serde(default)]
    pub capability_tag: Option<String>,
    #[serde(default)]
    pub max_params: Option<u64>,
}

impl SearchFilters {
    pub fn free_only() -> Self {
        Self::default()
    }

    pub fn with_max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = max_cost;
        self
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capability_tag = Some(tag.into());
        self
    }

    pub fn with_max_params(mut self, max_params: u64) -> Self {
        self.max_params = Some(max_params);
        self
    }
}

/// A record ranked against a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredModel {
    #[serde(flatten)]
    pub record: ModelRecord,
    pub similarity: f32,
}

/// Catalog-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub models: i64,
    pub free_models: i64,
    pub local_models: i64,
    pub embedding_dimension: usize,
    pub db_path: String,
    pub db_size_mb: f64,
}
