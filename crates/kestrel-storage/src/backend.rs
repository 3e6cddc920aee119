use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key not found: {0}.{1}")]
    NotFound(String, String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pluggable namespaced key/value store. Values cross this boundary as
/// raw strings — the façade owns JSON (de)serialization so a backend
/// never needs to know about `serde_json::Value`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<(), StorageError>;
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError>;
    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;
    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;
    async fn close(&self) -> Result<(), StorageError>;

    /// Every `(namespace, key)` pair with a value, used once at startup
    /// to populate the state cache eagerly.
    async fn list_all(&self) -> Result<Vec<(String, String, String)>, StorageError>;
}
