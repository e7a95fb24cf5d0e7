//! Provider connection document (`providers.json`).
//!
//! Loaded at startup, hot-reloadable, and extended at runtime through
//! `register`, which persists the whole document back to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::info;
use vertex_core::{Error, Result};

use crate::types::ProviderConfig;

pub struct ProviderRegistry {
    path: PathBuf,
    providers: RwLock<BTreeMap<String, ProviderConfig>>,
    loaded_mtime: Mutex<Option<SystemTime>>,
}

impl ProviderRegistry {
    /// Load the document. A missing file yields an empty registry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let providers = read_providers(&path)?;
        info!("Loaded {} providers from {}", providers.len(), path.display());
        Ok(Self {
            loaded_mtime: Mutex::new(mtime(&path)),
            providers: RwLock::new(providers),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<ProviderConfig> {
        self.providers.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<(String, ProviderConfig)> {
        self.providers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether the file changed on disk since the last load.
    pub fn is_modified_on_disk(&self) -> bool {
        mtime(&self.path) != *self.loaded_mtime.lock()
    }

    /// Re-read from disk. Returns the names whose entry changed or vanished.
    pub fn reload(&self) -> Result<Vec<String>> {
        let fresh = read_providers(&self.path)?;
        let mut current = self.providers.write();

        let changed: Vec<String> = current
            .iter()
            .filter(|(name, old)| fresh.get(*name) != Some(*old))
            .map(|(name, _)| name.clone())
            .collect();

        *current = fresh;
        *self.loaded_mtime.lock() = mtime(&self.path);
        info!(
            "Reloaded providers: {} total, {} changed",
            current.len(),
            changed.len()
        );
        Ok(changed)
    }

    /// Add or replace a provider and persist the document.
    pub fn register(&self, name: &str, config: ProviderConfig) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::Config("provider name is empty".into()));
        }
        if config.base_url.trim().is_empty() {
            return Err(Error::Config(format!("provider {} has no base_url", name)));
        }

        let mut providers = self.providers.write();
        providers.insert(name.to_string(), config);
        self.persist(&providers)?;
        info!("Registered provider: {}", name);
        Ok(())
    }

    /// Remove a provider and persist. Returns false if it was not present.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut providers = self.providers.write();
        if providers.remove(name).is_none() {
            return Ok(false);
        }
        self.persist(&providers)?;
        info!("Removed provider: {}", name);
        Ok(true)
    }

    /// Write the providers map, keeping any other top-level keys in the file.
    fn persist(&self, providers: &BTreeMap<String, ProviderConfig>) -> Result<()> {
        let mut document = match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str::<Map<String, Value>>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        document.insert("providers".into(), serde_json::to_value(providers)?);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&document)?)?;
        *self.loaded_mtime.lock() = mtime(&self.path);
        Ok(())
    }
}

fn read_providers(path: &Path) -> Result<BTreeMap<String, ProviderConfig>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut document: Value = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    match document.get_mut("providers").map(Value::take) {
        Some(providers) => serde_json::from_value(providers)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
        None => Ok(BTreeMap::new()),
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn openai() -> ProviderConfig {
        ProviderConfig {
            base_url: "https://api.openai.com/v1".into(),
            auth_header: Some("Authorization".into()),
            auth_prefix: Some("Bearer".into()),
            api_key_env: Some("OPENAI_API_KEY".into()),
            api_key_value: None,
            models: vec!["gpt-4o-mini".into()],
            api_format: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = ProviderRegistry::load(dir.path().join("providers.json")).unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_load_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(
            &path,
            r#"{"providers": {"groq": {"base_url": "https://api.groq.com/openai/v1",
                "auth_header": "Authorization", "auth_prefix": "Bearer",
                "api_key_env": "GROQ_API_KEY", "models": ["llama-3.1-8b-instant"]}}}"#,
        )
        .unwrap();

        let registry = ProviderRegistry::load(&path).unwrap();
        assert_eq!(registry.list(), vec!["groq"]);
        let groq = registry.get("groq").unwrap();
        assert_eq!(groq.models, vec!["llama-3.1-8b-instant"]);
        assert_eq!(groq.api_key_env.as_deref(), Some("GROQ_API_KEY"));
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, r#"{"providers": {"x": {"models": []}}}"#).unwrap();
        assert!(matches!(ProviderRegistry::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_register_persists_and_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, r#"{"version": 2, "providers": {}}"#).unwrap();

        let registry = ProviderRegistry::load(&path).unwrap();
        registry.register("openai", openai()).unwrap();

        let reopened = ProviderRegistry::load(&path).unwrap();
        assert_eq!(reopened.get("openai"), Some(openai()));
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 2);
        assert!(!registry.is_modified_on_disk());
    }

    #[test]
    fn test_register_rejects_missing_base_url() {
        let dir = TempDir::new().unwrap();
        let registry = ProviderRegistry::load(dir.path().join("p.json")).unwrap();
        let mut config = openai();
        config.base_url = String::new();
        assert!(matches!(registry.register("bad", config), Err(Error::Config(_))));
    }

    #[test]
    fn test_reload_reports_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("providers.json");
        let registry = ProviderRegistry::load(&path).unwrap();
        registry.register("openai", openai()).unwrap();
        let local = ProviderConfig {
            base_url: "http://localhost:11434/v1".into(),
            auth_header: None,
            auth_prefix: None,
            api_key_env: None,
            api_key_value: None,
            models: vec![],
            api_format: None,
        };
        registry.register("local", local).unwrap();

        // Another writer edits the file out of band.
        let other = ProviderRegistry::load(&path).unwrap();
        let mut edited = openai();
        edited.models.push("gpt-4o".into());
        other.register("openai", edited).unwrap();

        let changed = registry.reload().unwrap();
        assert_eq!(changed, vec!["openai"]);
        assert_eq!(registry.get("openai").unwrap().models.len(), 2);
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("providers.json");
        let registry = ProviderRegistry::load(&path).unwrap();
        registry.register("openai", openai()).unwrap();
        assert!(registry.remove("openai").unwrap());
        assert!(!registry.remove("openai").unwrap());
        assert!(ProviderRegistry::load(&path).unwrap().list().is_empty());
    }
}
