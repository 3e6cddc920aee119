use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("manifest error: {0}")]
    Manifest(String),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("sandbox error: {0}")]
    Sandbox(String),
    #[error("wasm validation error: {0}")]
    WasmValidation(String),
    #[error("plugin not found: {0}")]
    NotFound(String),
    #[error("plugin already loaded: {0}")]
    AlreadyExists(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("dependency cycle detected among: {0:?}")]
    DependencyCycle(Vec<String>),
    #[error("missing dependency {1} required by {0}")]
    MissingDependency(String, String),
    #[error("fuel exhausted for plugin {0}")]
    FuelExhausted(String),
    #[error("memory exceeded for plugin {0}")]
    MemoryExceeded(String),
    #[error("installation error: {0}")]
    Installation(String),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("semver error: {0}")]
    Semver(#[from] semver::Error),
}
