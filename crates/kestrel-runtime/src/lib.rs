//! The Runtime façade: the one process-wide object, owning every
//! kernel component as a shared handle and threading it through module
//! and plugin lifecycle calls.

pub mod builtin;
pub mod module;

use std::sync::Arc;

use kestrel_auth::policy::AuthorizationPolicy;
use kestrel_auth::rate_limit::RateLimiter;
use kestrel_core::{EventBus, ServiceRegistry, StateCache};
use kestrel_http::HttpRegistry;
use kestrel_plugin::PluginManager;
use kestrel_storage::Facade;

pub use module::{Module, ModuleError, ModuleManager};

/// Owns every shared kernel component. Constructed once at startup and
/// handed by reference to every module and plugin during lifecycle
/// calls; no other process-wide global exists.
pub struct Runtime {
    pub bus: Arc<EventBus>,
    pub services: Arc<ServiceRegistry>,
    pub state: Arc<StateCache>,
    pub storage: Arc<Facade>,
    pub http: Arc<HttpRegistry>,
    pub policy: Arc<AuthorizationPolicy>,
    pub rate_limiter: Arc<RateLimiter>,
    pub plugins: Arc<PluginManager>,
}

pub struct RuntimeShutdownTimeout {
    pub modules: std::time::Duration,
    pub plugins: std::time::Duration,
}

impl Default for RuntimeShutdownTimeout {
    fn default() -> Self {
        Self {
            modules: std::time::Duration::from_secs(10),
            plugins: std::time::Duration::from_secs(10),
        }
    }
}

impl Runtime {
    pub fn new(
        storage: Arc<Facade>,
        state: Arc<StateCache>,
        plugin_root: impl Into<std::path::PathBuf>,
        sandbox_config: kestrel_plugin::sandbox::SandboxConfig,
        public_actions: Vec<String>,
        action_scopes: std::collections::HashMap<String, String>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            services: Arc::new(ServiceRegistry::new()),
            http: Arc::new(HttpRegistry::new()),
            policy: Arc::new(AuthorizationPolicy::new(public_actions, action_scopes)),
            rate_limiter: Arc::new(RateLimiter::new(storage.clone())),
            plugins: Arc::new(PluginManager::new(plugin_root, sandbox_config, bus.clone())),
            bus,
            state,
            storage,
        }
    }

    /// Loads and starts every discovered plugin, then runs every
    /// registered module's `register` and `start` in order. Reversed on
    /// `shutdown`: modules stop before plugins are unloaded, honoring
    /// the dependency order Storage/State -> Bus/Registry -> Http ->
    /// Modules -> Plugins.
    pub async fn start(&self, modules: &ModuleManager) -> Result<(), ModuleError> {
        modules.register_all(self).await?;
        modules.start_all(self).await?;

        if let Err(err) = self.plugins.load_enabled_plugins().await {
            tracing::error!(error = %err, "plugin loading encountered an error");
        }

        Ok(())
    }

    pub async fn shutdown(&self, modules: &ModuleManager, timeouts: RuntimeShutdownTimeout) {
        self.plugins.unload_all().await;

        if tokio::time::timeout(timeouts.modules, modules.stop_all(self))
            .await
            .is_err()
        {
            tracing::warn!("module shutdown exceeded timeout");
        }

        let _ = timeouts.plugins;
        if let Err(err) = self.storage.close().await {
            tracing::warn!(error = %err, "storage backend failed to close cleanly");
        }
    }
}
