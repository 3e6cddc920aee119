use std::path::Path;

use async_trait::async_trait;

use crate::backend::{StorageBackend, StorageError};

const SEP: u8 = 0x00;

fn composite_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len() + key.len() + 1);
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(SEP);
    buf.extend_from_slice(key.as_bytes());
    buf
}

fn split_composite_key(raw: &[u8]) -> Option<(&str, &str)> {
    let pos = raw.iter().position(|b| *b == SEP)?;
    let namespace = std::str::from_utf8(&raw[..pos]).ok()?;
    let key = std::str::from_utf8(&raw[pos + 1..]).ok()?;
    Some((namespace, key))
}

/// On-disk embedded key/value store backed by `sled`. Reference backend
/// for local, single-process deployments.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<(), StorageError> {
        self.db
            .insert(composite_key(namespace, key), value.into_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        let raw = self
            .db
            .get(composite_key(namespace, key))
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        match raw {
            Some(bytes) => {
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.db
            .remove(composite_key(namespace, key))
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let mut prefix = namespace.as_bytes().to_vec();
        prefix.push(SEP);
        let mut keys = Vec::new();
        for item in self.db.scan_prefix(&prefix) {
            let (raw_key, _) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            if let Some((_, key)) = split_composite_key(&raw_key) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .db
            .contains_key(composite_key(namespace, key))
            .map_err(|e| StorageError::Backend(e.to_string()))?)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.db
            .flush_async()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<(String, String, String)>, StorageError> {
        let mut out = Vec::new();
        for item in self.db.iter() {
            let (raw_key, raw_value) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            if let Some((namespace, key)) = split_composite_key(&raw_key) {
                let value = String::from_utf8(raw_value.to_vec())
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                out.push((namespace.to_string(), key.to_string(), value));
            }
        }
        Ok(out)
    }
}
