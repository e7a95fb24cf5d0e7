//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Embedding dimension shared by the catalog and every embedder.
pub const EMBEDDING_DIM: usize = 384;

/// Paths to all Vertex data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Catalog database directory (`data/catalog/`).
    pub catalog: PathBuf,
    /// Provider connection document (`data/providers.json`).
    pub providers_file: PathBuf,
    /// Embedding model files for the ONNX backend (`data/models/`).
    pub models: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            catalog: root.join("catalog"),
            providers_file: root.join("providers.json"),
            models: root.join("models"),
            root,
        };
        std::fs::create_dir_all(&paths.catalog)?;
        std::fs::create_dir_all(&paths.models)?;
        Ok(paths)
    }
}

/// Idle-termination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    pub enabled: bool,
    pub idle_threshold: Duration,
    pub check_interval: Duration,
    /// Delay between the termination log line and the hook firing.
    pub grace: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_threshold: Duration::from_secs(1800),
            check_interval: Duration::from_secs(60),
            grace: Duration::from_secs(2),
        }
    }
}

/// Collapse TTLs for each pool family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    pub provider_ttl: Duration,
    pub embedder_ttl: Duration,
    pub model_ttl: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            provider_ttl: Duration::from_secs(300),
            embedder_ttl: Duration::from_secs(600),
            model_ttl: Duration::from_secs(600),
        }
    }
}

/// Top-level Vertex configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Embedding dimension (384 for all-MiniLM-L6-v2 and the hash embedder).
    pub embedding_dim: usize,
    /// Base URL of the model registry (`GET {base}/models/{id}`).
    pub registry_base: String,
    /// Bound applied to every external fetch.
    pub fetch_timeout: Duration,
    /// Base URL of the OpenAI-compatible local runtime serving local seats.
    pub local_runtime_url: String,
    /// Period of the popular-model bulk index.
    pub reindex_interval: Duration,
    pub bulk_index_limit: usize,
    pub lifecycle: LifecycleSettings,
    pub pools: PoolSettings,
}

impl VertexConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`VertexConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(data_dir: impl AsRef<Path>, lookup: F) -> std::io::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: u64| Duration::from_secs(parsed(key).unwrap_or(default));

        let port = parsed("PORT")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(3004);

        let lifecycle = LifecycleSettings {
            enabled: lookup("VERTEX_LIFECYCLE_ENABLED")
                .map(|v| !matches!(v.trim(), "0" | "false" | "off"))
                .unwrap_or(true),
            idle_threshold: secs("VERTEX_IDLE_THRESHOLD_SECS", 1800),
            check_interval: secs("VERTEX_MONITOR_INTERVAL_SECS", 60),
            ..LifecycleSettings::default()
        };

        let pools = PoolSettings {
            provider_ttl: secs("VERTEX_PROVIDER_TTL_SECS", 300),
            embedder_ttl: secs("VERTEX_EMBEDDER_TTL_SECS", 600),
            model_ttl: secs("VERTEX_MODEL_TTL_SECS", 600),
        };

        Ok(Self {
            port,
            data_paths: DataPaths::new(data_dir)?,
            embedding_dim: EMBEDDING_DIM,
            registry_base: lookup("VERTEX_REGISTRY_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://huggingface.co/api".into()),
            fetch_timeout: secs("VERTEX_FETCH_TIMEOUT_SECS", 30),
            local_runtime_url: lookup("VERTEX_LOCAL_RUNTIME_URL")
                .unwrap_or_else(|| "http://localhost:11434/v1".into()),
            reindex_interval: secs("VERTEX_REINDEX_INTERVAL_SECS", 14_400),
            bulk_index_limit: parsed("VERTEX_BULK_INDEX_LIMIT").unwrap_or(50) as usize,
            lifecycle,
            pools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = VertexConfig::from_lookup(dir.path(), |_| None).unwrap();
        assert_eq!(config.port, 3004);
        assert_eq!(config.embedding_dim, 384);
        assert_eq!(config.lifecycle.idle_threshold, Duration::from_secs(1800));
        assert_eq!(config.pools.provider_ttl, Duration::from_secs(300));
        assert_eq!(config.pools.embedder_ttl, Duration::from_secs(600));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert!(config.data_paths.catalog.is_dir());
        assert!(config.data_paths.models.is_dir());
    }

    #[test]
    fn test_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let vars: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("VERTEX_IDLE_THRESHOLD_SECS", "5"),
            ("VERTEX_LIFECYCLE_ENABLED", "false"),
            ("VERTEX_REGISTRY_BASE", "http://registry.local/api/"),
            ("VERTEX_PROVIDER_TTL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config =
            VertexConfig::from_lookup(dir.path(), |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.lifecycle.idle_threshold, Duration::from_secs(5));
        assert!(!config.lifecycle.enabled);
        assert_eq!(config.registry_base, "http://registry.local/api");
        // Unparseable values fall back to the default.
        assert_eq!(config.pools.provider_ttl, Duration::from_secs(300));
    }
}
