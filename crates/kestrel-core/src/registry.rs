use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("service {0}.{1} is already registered")]
    AlreadyRegistered(String, String),
    #[error("service {0} not found")]
    NotFound(String),
    #[error("service call failed: {0}")]
    CallFailed(String),
}

/// A handler backing a single named, versioned service. Implementations
/// typically close over module- or plugin-owned state.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, RegistryError>;
}

#[async_trait]
impl<F, Fut> ServiceHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, RegistryError>> + Send + 'static,
{
    async fn call(&self, args: Value) -> Result<Value, RegistryError> {
        (self)(args).await
    }
}

#[derive(Clone)]
pub struct ServiceEndpoint {
    pub name: String,
    pub version: String,
    pub deprecated: bool,
    handler: Arc<dyn ServiceHandler>,
}

/// In-process RPC directory. Services are registered under a
/// `(name, version)` pair and resolved either by the exact pair or, when
/// only a bare name is given, by preferring the highest non-deprecated
/// version and falling back to a deprecated one if that's all there is.
#[derive(Default)]
pub struct ServiceRegistry {
    table: RwLock<HashMap<(String, String), ServiceEndpoint>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
        handler: Arc<dyn ServiceHandler>,
        deprecated: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let version = version.into();
        let mut table = self.table.write().await;
        let key = (name.clone(), version.clone());
        if table.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(name, version));
        }
        table.insert(
            key,
            ServiceEndpoint {
                name,
                version,
                deprecated,
                handler,
            },
        );
        Ok(())
    }

    pub async fn deprecate(&self, name: &str, version: &str) -> Result<(), RegistryError> {
        let mut table = self.table.write().await;
        let key = (name.to_string(), version.to_string());
        match table.get_mut(&key) {
            Some(endpoint) => {
                endpoint.deprecated = true;
                Ok(())
            }
            None => Err(RegistryError::NotFound(format!("{name}.{version}"))),
        }
    }

    /// Remove one version of `name`, or every version if `version` is
    /// `None`. Removes exactly one entry when a version is given.
    pub async fn unregister(&self, name: &str, version: Option<&str>) -> Result<(), RegistryError> {
        let mut table = self.table.write().await;
        match version {
            Some(version) => {
                let key = (name.to_string(), version.to_string());
                table
                    .remove(&key)
                    .map(|_| ())
                    .ok_or_else(|| RegistryError::NotFound(format!("{name}.{version}")))
            }
            None => {
                let before = table.len();
                table.retain(|(n, _), _| n != name);
                if table.len() == before {
                    return Err(RegistryError::NotFound(name.to_string()));
                }
                Ok(())
            }
        }
    }

    /// Whether `name` (optionally a specific `version`) has a registered
    /// endpoint.
    pub async fn has_service(&self, name: &str, version: Option<&str>) -> bool {
        let table = self.table.read().await;
        match version {
            Some(version) => table.contains_key(&(name.to_string(), version.to_string())),
            None => table.keys().any(|(n, _)| n == name),
        }
    }

    /// All registered versions of `name`, sorted lexicographically
    /// ascending.
    pub async fn get_versions(&self, name: &str) -> Vec<String> {
        let table = self.table.read().await;
        let mut versions: Vec<String> = table
            .keys()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect();
        versions.sort();
        versions
    }

    /// Whether the exact `name`/`version` pair is marked deprecated.
    pub async fn is_deprecated(&self, name: &str, version: &str) -> Result<bool, RegistryError> {
        let table = self.table.read().await;
        table
            .get(&(name.to_string(), version.to_string()))
            .map(|e| e.deprecated)
            .ok_or_else(|| RegistryError::NotFound(format!("{name}.{version}")))
    }

    /// Resolve `name` (optionally qualified as `name.version`) to a
    /// handler, clone it out and release the lock before returning so
    /// the caller can invoke it while a concurrent registration or
    /// deprecation proceeds.
    async fn resolve(&self, name: &str) -> Result<Arc<dyn ServiceHandler>, RegistryError> {
        let table = self.table.read().await;

        if let Some((base, version)) = name.rsplit_once('.') {
            if let Some(endpoint) = table.get(&(base.to_string(), version.to_string())) {
                return Ok(endpoint.handler.clone());
            }
        }

        let mut candidates: Vec<&ServiceEndpoint> =
            table.values().filter(|e| e.name == name).collect();
        if candidates.is_empty() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        candidates.sort_by(|a, b| a.version.cmp(&b.version));

        let chosen = candidates
            .iter()
            .rev()
            .find(|e| !e.deprecated)
            .or_else(|| candidates.last())
            .expect("candidates is non-empty");

        Ok(chosen.handler.clone())
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Value, RegistryError> {
        let handler = self.resolve(name).await?;
        handler.call(args).await
    }

    pub async fn list(&self) -> Vec<ServiceEndpoint> {
        self.table.read().await.values().cloned().collect()
    }
}
