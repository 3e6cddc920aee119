use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum HttpRegistryError {
    #[error("service {0} version {1} is already registered")]
    ServiceVersionConflict(String, String),
    #[error("{0} {1} is already claimed by another endpoint")]
    PathConflict(HttpMethod, String),
    #[error("endpoint path must start with '/': {0}")]
    InvalidPath(String),
    #[error("service {0} version {1} is not registered")]
    NotFound(String, String),
}

/// A purely declarative binding from an HTTP verb + path to the named,
/// versioned service that should answer it. No dispatch logic lives
/// here; an adapter reads `list()` once at startup and builds its own
/// route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEndpointDeclaration {
    pub method: HttpMethod,
    pub path: String,
    pub service: String,
    pub version: String,
    pub description: String,
    pub deprecated: bool,
}

impl HttpEndpointDeclaration {
    /// `/` + version + path, e.g. version `v1` and path `/devices` gives
    /// `/v1/devices`.
    pub fn effective_path(&self) -> String {
        format!("/{}{}", self.version, self.path)
    }
}

#[derive(Default)]
pub struct HttpRegistry {
    endpoints: RwLock<Vec<HttpEndpointDeclaration>>,
}

impl HttpRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(
        &self,
        declaration: HttpEndpointDeclaration,
    ) -> Result<(), HttpRegistryError> {
        if !declaration.path.starts_with('/') {
            return Err(HttpRegistryError::InvalidPath(declaration.path.clone()));
        }

        let mut endpoints = self.endpoints.write().await;

        if endpoints
            .iter()
            .any(|e| e.service == declaration.service && e.version == declaration.version)
        {
            return Err(HttpRegistryError::ServiceVersionConflict(
                declaration.service,
                declaration.version,
            ));
        }

        let effective = declaration.effective_path();
        if endpoints
            .iter()
            .any(|e| e.method == declaration.method && e.effective_path() == effective)
        {
            return Err(HttpRegistryError::PathConflict(declaration.method, effective));
        }

        endpoints.push(declaration);
        Ok(())
    }

    pub async fn list(&self) -> Vec<HttpEndpointDeclaration> {
        self.endpoints.read().await.clone()
    }

    /// Flip the `deprecated` flag on an already-registered endpoint so
    /// adapters can annotate generated documentation without a full
    /// re-registration.
    pub async fn mark_deprecated(&self, service: &str, version: &str) -> Result<(), HttpRegistryError> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints
            .iter_mut()
            .find(|e| e.service == service && e.version == version)
        {
            Some(endpoint) => {
                endpoint.deprecated = true;
                Ok(())
            }
            None => Err(HttpRegistryError::NotFound(service.to_string(), version.to_string())),
        }
    }

    pub async fn versions_for(&self, service: &str) -> HashSet<String> {
        self.endpoints
            .read()
            .await
            .iter()
            .filter(|e| e.service == service)
            .map(|e| e.version.clone())
            .collect()
    }
}
