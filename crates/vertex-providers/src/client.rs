//! Pooled provider clients and the completion gateway.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};
use vertex_core::{Error, Result};
use vertex_pool::{Hydrator, PoolStats, ResourcePool};

use crate::config::ProviderRegistry;
use crate::formats::ApiFormat;
use crate::types::{ChatMessage, ProviderConfig, ProviderSummary};

/// A hydrated connection to one provider.
#[derive(Clone)]
pub struct ProviderClient {
    pub name: String,
    pub base_url: String,
    pub format: ApiFormat,
    http: Client,
}

impl ProviderClient {
    pub fn http(&self) -> &Client {
        &self.http
    }
}

/// Resolve the credential header for a provider, if it declares one.
pub fn auth_header(
    name: &str,
    config: &ProviderConfig,
) -> Result<Option<(HeaderName, HeaderValue)>> {
    let Some(header) = config.auth_header.as_deref() else {
        return Ok(None);
    };

    let key = config
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|k| !k.trim().is_empty())
        .or_else(|| config.api_key_value.clone().filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| {
            Error::Config(format!(
                "provider {} needs a key in {} or api_key_value",
                name,
                config.api_key_env.as_deref().unwrap_or("<no api_key_env>")
            ))
        })?;

    let value = match config.auth_prefix.as_deref().filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{} {}", prefix, key),
        None => key,
    };

    let header_name = HeaderName::from_bytes(header.as_bytes())
        .map_err(|e| Error::Config(format!("provider {} auth_header: {}", name, e)))?;
    let mut value = HeaderValue::from_str(value.trim())
        .map_err(|e| Error::Config(format!("provider {} credential: {}", name, e)))?;
    value.set_sensitive(true);
    Ok(Some((header_name, value)))
}

/// Builds provider clients from the connection document.
pub struct ProviderHydrator {
    registry: Arc<ProviderRegistry>,
    timeout: Duration,
}

impl ProviderHydrator {
    pub fn new(registry: Arc<ProviderRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

impl Hydrator<ProviderClient> for ProviderHydrator {
    fn hydrate(&self, name: &str) -> Result<ProviderClient> {
        let config = self
            .registry
            .get(name)
            .ok_or_else(|| Error::Config(format!("Unknown provider: {}", name)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some((header, value)) = auth_header(name, &config)? {
            headers.insert(header, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Http(format!("client for {}: {}", name, e)))?;

        Ok(ProviderClient {
            name: name.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            format: config.format(),
            http,
        })
    }
}

/// Routes chat completions through pooled provider clients.
pub struct ProviderGateway {
    registry: Arc<ProviderRegistry>,
    pool: ResourcePool<ProviderClient>,
    timeout: Duration,
}

impl ProviderGateway {
    pub fn new(registry: Arc<ProviderRegistry>, ttl: Duration, timeout: Duration) -> Self {
        let hydrator = Arc::new(ProviderHydrator::new(registry.clone(), timeout));
        Self {
            pool: ResourcePool::new("providers", ttl, hydrator),
            registry,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &ResourcePool<ProviderClient> {
        &self.pool
    }

    /// Pooled client for `name`, hydrating on first use.
    pub fn client(&self, name: &str) -> Result<ProviderClient> {
        let handle = self.pool.get(name)?;
        Ok(handle.get()?.clone())
    }

    pub fn list(&self) -> Vec<ProviderSummary> {
        self.registry
            .all()
            .into_iter()
            .map(|(name, config)| ProviderSummary {
                live: self.pool.contains(&name),
                api_format: config.format(),
                has_credentials: matches!(auth_header(&name, &config), Ok(Some(_))),
                base_url: config.base_url,
                models: config.models,
                name,
            })
            .collect()
    }

    /// Register (or replace) a provider. A replaced provider's client collapses.
    pub fn register(&self, name: &str, config: ProviderConfig) -> Result<()> {
        self.registry.register(name, config)?;
        self.pool.release(name);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let removed = self.registry.remove(name)?;
        self.pool.release(name);
        Ok(removed)
    }

    /// Re-read the document and collapse clients whose config changed.
    pub fn reload(&self) -> Result<Vec<String>> {
        let changed = self.registry.reload()?;
        for name in &changed {
            if self.pool.release(name) {
                info!("Provider {} changed on disk, client collapsed", name);
            }
        }
        Ok(changed)
    }

    /// Reload only if the document's mtime moved.
    pub fn reload_if_modified(&self) -> Result<Option<Vec<String>>> {
        if !self.registry.is_modified_on_disk() {
            return Ok(None);
        }
        self.reload().map(Some)
    }

    pub fn sweep(&self) -> usize {
        self.pool.sweep()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Send a conversation to `provider` and return the completion text.
    pub async fn complete(
        &self,
        provider: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let client = self.client(provider)?;
        let strategy = client.format.strategy();
        let request = (strategy.render)(messages, model);
        let url = format!("{}{}", client.base_url, request.path);
        debug!("POST {} ({:?}, model {})", url, client.format, model);

        let mut builder = client.http().post(&url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| Error::Timeout(format!("{} completion", provider)))?
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("{} completion", provider))
                } else {
                    Error::Http(format!("{}: {}", provider, e))
                }
            })?;
        self.pool.mark_used(provider);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", provider, status, body);
            return Err(Error::Http(format!("{} returned {}: {}", provider, status, body)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("{} response: {}", provider, e)))?;
        (strategy.extract)(&json)
            .ok_or_else(|| Error::Http(format!("{} response has no completion text", provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> ProviderGateway {
        let registry = Arc::new(ProviderRegistry::load(dir.path().join("providers.json")).unwrap());
        ProviderGateway::new(registry, Duration::from_secs(300), Duration::from_secs(30))
    }

    fn keyed(value: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            base_url: "https://api.example.com/v1/".into(),
            auth_header: Some("Authorization".into()),
            auth_prefix: Some("Bearer".into()),
            api_key_env: Some("VERTEX_TEST_UNSET_PROVIDER_KEY".into()),
            api_key_value: value.map(str::to_string),
            models: vec!["m".into()],
            api_format: None,
        }
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        assert!(matches!(gateway.client("nope"), Err(Error::Config(_))));
        assert_eq!(gateway.stats().hydrations, 0);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        gateway.register("example", keyed(None)).unwrap();
        assert!(matches!(gateway.client("example"), Err(Error::Config(_))));
        assert!(!gateway.pool().contains("example"));
    }

    #[test]
    fn test_inline_key_hydrates() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        gateway.register("example", keyed(Some("sk-test"))).unwrap();

        let client = gateway.client("example").unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v1");
        assert_eq!(client.format, ApiFormat::OpenAi);
        assert!(gateway.pool().contains("example"));

        let (name, value) = auth_header("example", &keyed(Some("sk-test"))).unwrap().unwrap();
        assert_eq!(name.as_str(), "authorization");
        assert_eq!(value.to_str().unwrap(), "Bearer sk-test");
    }

    #[test]
    fn test_no_auth_header_needs_no_key() {
        let config = ProviderConfig {
            auth_header: None,
            ..keyed(None)
        };
        assert!(auth_header("local", &config).unwrap().is_none());
    }

    #[test]
    fn test_register_collapses_existing_client() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        gateway.register("example", keyed(Some("a"))).unwrap();
        gateway.client("example").unwrap();

        gateway.register("example", keyed(Some("b"))).unwrap();
        assert!(!gateway.pool().contains("example"));
        assert_eq!(gateway.stats().releases, 1);

        let summaries = gateway.list();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].has_credentials);
        assert!(!summaries[0].live);
    }
}
