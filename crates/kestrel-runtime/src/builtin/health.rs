use std::sync::Arc;

use async_trait::async_trait;

use kestrel_core::registry::RegistryError;
use kestrel_core::ServiceHandler;

use crate::module::{Module, ModuleError};
use crate::Runtime;

/// Exposes `system.health`, the generalized form of the teacher's
/// `/healthz` endpoint — a service any adapter can expose over HTTP via
/// the Endpoint Registry instead of a hardcoded handler.
pub struct HealthModule;

struct HealthHandler {
    plugins: Arc<kestrel_plugin::PluginManager>,
    modules: Vec<String>,
}

#[async_trait]
impl ServiceHandler for HealthHandler {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, RegistryError> {
        let loaded_plugins = self.plugins.loaded_plugin_names().await;
        Ok(serde_json::json!({
            "status": "ok",
            "modules": self.modules,
            "loaded_plugins": loaded_plugins,
        }))
    }
}

#[async_trait]
impl Module for HealthModule {
    fn name(&self) -> &str {
        "health"
    }

    async fn register(&self, rt: &Runtime) -> Result<(), ModuleError> {
        let handler = HealthHandler {
            plugins: rt.plugins.clone(),
            modules: vec!["logger".to_string(), "clock".to_string(), "health".to_string()],
        };
        rt.services
            .register("system.health", "v1", Arc::new(handler), false)
            .await
            .map_err(|e| ModuleError::Register("health".to_string(), e.to_string()))?;
        Ok(())
    }

    async fn start(&self, _rt: &Runtime) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
        Ok(())
    }
}
