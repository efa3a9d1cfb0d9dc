//! Application configuration service.
//!
//! Loads the root configuration from `~/.config/atelier/config.toml` and
//! caches it. A missing or empty file yields the defaults; a file that
//! exists but cannot be parsed is an error so misconfiguration is not
//! silently ignored.

use crate::paths::AtelierPaths;
use atelier_core::error::{AtelierError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::fs;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session store root. Defaults to `~/.local/share/atelier/sessions`.
    pub base_dir: Option<PathBuf>,
    /// Inference backend tag, resolved once at startup into the closed
    /// backend registry.
    pub engine_backend: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            engine_backend: "null".to_string(),
        }
    }
}

impl AppConfig {
    /// The effective session store root, falling back to the platform
    /// default when unset.
    pub fn resolve_base_dir(&self) -> Result<PathBuf> {
        if let Some(base_dir) = &self.base_dir {
            return Ok(base_dir.clone());
        }
        AtelierPaths::sessions_dir()
            .map_err(|e| AtelierError::io(format!("failed to resolve session store root: {e}")))
    }
}

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigService {
    /// Cached configuration loaded from file.
    /// Uses RwLock for thread-safe lazy loading.
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    /// Creates a new ConfigService. The configuration is loaded lazily on
    /// first access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the root configuration, loading from file if not cached.
    pub async fn get_config(&self) -> Result<AppConfig> {
        {
            let read_lock = self.config.read().expect("config cache poisoned");
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let config_path = AtelierPaths::config_file()
            .map_err(|e| AtelierError::io(format!("failed to resolve config file path: {e}")))?;
        let loaded = Self::load_from(&config_path).await?;

        let mut write_lock = self.config.write().expect("config cache poisoned");
        *write_lock = Some(loaded.clone());

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().expect("config cache poisoned");
        *write_lock = None;
    }

    /// Loads the configuration from a specific file.
    pub async fn load_from(config_path: &std::path::Path) -> Result<AppConfig> {
        let content = match fs::read_to_string(config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "no config file at '{}', using defaults",
                    config_path.display()
                );
                return Ok(AppConfig::default());
            }
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to read config file '{}': {}",
                    config_path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(AppConfig::default());
        }

        toml::from_str(&content).map_err(|e| AtelierError::Serialization {
            format: "TOML".to_string(),
            message: format!("invalid config file '{}': {}", config_path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigService::load_from(&temp_dir.path().join("config.toml"))
            .await
            .unwrap();
        assert_eq!(config.engine_backend, "null");
        assert!(config.base_dir.is_none());
    }

    #[tokio::test]
    async fn test_empty_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "  \n").unwrap();

        let config = ConfigService::load_from(&path).await.unwrap();
        assert_eq!(config.engine_backend, "null");
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "engine_backend = \"mock\"\n").unwrap();

        let config = ConfigService::load_from(&path).await.unwrap();
        assert_eq!(config.engine_backend, "mock");
        assert!(config.base_dir.is_none());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "engine_backend = [not toml").unwrap();

        let err = ConfigService::load_from(&path).await.unwrap_err();
        assert!(err.is_serialization());
    }

    #[tokio::test]
    async fn test_base_dir_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "base_dir = \"/srv/atelier/sessions\"\n").unwrap();

        let config = ConfigService::load_from(&path).await.unwrap();
        assert_eq!(
            config.resolve_base_dir().unwrap(),
            PathBuf::from("/srv/atelier/sessions")
        );
    }
}
