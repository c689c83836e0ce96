use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::storage::KeyValueStore;
use parley_core::{ParleyError, Result};
use tokio::sync::Mutex;

use super::AtomicTomlFile;
use crate::paths::{ParleyPaths, ServiceType};

type Table = BTreeMap<String, String>;

/// Key-value store backing the persisted tier.
///
/// Values live in a flat TOML table. Reads are served from an in-memory copy
/// loaded once at construction; writes go through [`AtomicTomlFile::update`]
/// on a blocking thread and refresh the copy.
#[derive(Clone)]
pub struct TomlKeyValueStore {
    cache: Arc<Mutex<Table>>,
    file: Arc<AtomicTomlFile<Table>>,
}

impl TomlKeyValueStore {
    /// Opens the store at the default session state path.
    pub async fn new(paths: &ParleyPaths) -> Result<Self> {
        let path = paths.get_path(ServiceType::SessionState)?;
        Self::open(path).await
    }

    /// Opens (or lazily creates) the store at `path`.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let file = Arc::new(AtomicTomlFile::<Table>::new(path));
        let loader = file.clone();
        let initial = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| ParleyError::internal(format!("Failed to join task: {}", e)))??
            .unwrap_or_default();

        tracing::debug!(
            "[TomlKeyValueStore] Loaded {} keys from {}",
            initial.len(),
            file.path().display()
        );

        Ok(Self {
            cache: Arc::new(Mutex::new(initial)),
            file,
        })
    }

    async fn write<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Table) + Send + 'static,
    {
        // Held across the write so the cache never runs ahead of the file.
        let mut cache = self.cache.lock().await;
        let file = self.file.clone();
        let updated = tokio::task::spawn_blocking(move || {
            file.update(Table::new(), |table| {
                mutate(table);
                Ok(table.clone())
            })
        })
        .await
        .map_err(|e| ParleyError::internal(format!("Failed to join task: {}", e)))??;

        *cache = updated;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for TomlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.write(move |table| {
            table.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.write(move |table| {
            table.remove(&key);
        })
        .await
    }
}
