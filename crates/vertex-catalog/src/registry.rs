//! Model registry collaborator.
//!
//! `GET {base}/models/{id}` returns a JSON descriptor; any non-200 status is
//! treated as a miss. `GET {base}/models?sort=downloads...` lists popular ids.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use vertex_core::{Error, Result};

/// Source of model descriptors.
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    /// Fetch the raw descriptor for `model_id`. A model that does not exist
    /// upstream yields `Error::NotFound`.
    async fn fetch_model(&self, model_id: &str) -> Result<Value>;

    /// Ids of the most downloaded text-generation models.
    async fn list_popular(&self, limit: usize) -> Result<Vec<String>>;
}

/// Registry reached over HTTP (Hugging Face compatible).
pub struct HttpRegistry {
    client: Client,
    base: String,
}

impl HttpRegistry {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vertex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("registry client: {}", e)))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)], what: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| map_reqwest(e, what))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Registry returned {} for {}", status, what);
            return Err(if status.is_client_error() {
                Error::NotFound(format!("{} (registry status {})", what, status))
            } else {
                Error::Http(format!("registry status {} for {}", status, what))
            });
        }

        response.json().await.map_err(|e| map_reqwest(e, what))
    }
}

fn map_reqwest(e: reqwest::Error, what: &str) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("registry fetch of {}", what))
    } else {
        Error::Http(format!("registry fetch of {}: {}", what, e))
    }
}

#[async_trait]
impl RegistryFetcher for HttpRegistry {
    async fn fetch_model(&self, model_id: &str) -> Result<Value> {
        let url = format!("{}/models/{}", self.base, model_id);
        debug!("Fetching descriptor {}", url);
        self.get_json(&url, &[], model_id).await
    }

    async fn list_popular(&self, limit: usize) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base);
        let query = [
            ("sort", "downloads".to_string()),
            ("direction", "-1".to_string()),
            ("limit", limit.to_string()),
            ("filter", "text-generation".to_string()),
        ];
        let listing = self.get_json(&url, &query, "popular models").await?;

        let ids = listing
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("modelId").or_else(|| m.get("id")))
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }
}
