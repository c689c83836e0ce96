//! Configuration service implementation.
//!
//! Loads the root configuration from `config.toml` under the parley config
//! directory and caches it.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use parley_core::Result;
use parley_core::config::RootConfig;

use crate::paths::{ParleyPaths, ServiceType};
use crate::storage::AtomicTomlFile;

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    config: Arc<RwLock<Option<RootConfig>>>,
}

impl ConfigService {
    /// Creates a service reading `config.toml` under `paths`.
    ///
    /// Nothing is read until the first access.
    pub fn new(paths: &ParleyPaths) -> Result<Self> {
        Ok(Self::with_path(paths.get_path(ServiceType::Config)?))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the root configuration, loading it on first access.
    ///
    /// A missing file yields the defaults. A malformed file is an error.
    pub fn get_config(&self) -> Result<RootConfig> {
        if let Some(cached) = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(cached.clone());
        }

        let loaded = AtomicTomlFile::<RootConfig>::new(self.path.clone())
            .load()?
            .unwrap_or_default();
        tracing::debug!("[ConfigService] Loaded config from {}", self.path.display());

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded.clone());
        Ok(loaded)
    }

    /// Writes `config` to disk and replaces the cached copy.
    pub fn save_config(&self, config: &RootConfig) -> Result<()> {
        AtomicTomlFile::<RootConfig>::new(self.path.clone()).save(config)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(&ParleyPaths::new(Some(temp_dir.path().to_path_buf())))
            .unwrap();
        assert_eq!(service.get_config().unwrap(), RootConfig::default());
    }

    #[test]
    fn test_reads_file_and_caches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[engine]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let service = ConfigService::with_path(path.clone());
        let config = service.get_config().unwrap();
        assert_eq!(config.engine.provider, "openai");
        assert_eq!(config.engine.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.logging.level, "debug");

        std::fs::write(&path, "[engine]\nprovider = \"gemini\"\n").unwrap();
        assert_eq!(service.get_config().unwrap().engine.provider, "openai");

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().engine.provider, "gemini");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[engine\nprovider = ").unwrap();
        assert!(ConfigService::with_path(path).get_config().is_err());
    }

    #[test]
    fn test_save_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(temp_dir.path().join("config.toml"));
        let mut config = RootConfig::default();
        config.engine.system_prompt = Some("Be brief.".to_string());
        service.save_config(&config).unwrap();

        service.invalidate_cache();
        assert_eq!(
            service.get_config().unwrap().engine.system_prompt.as_deref(),
            Some("Be brief.")
        );
    }
}
