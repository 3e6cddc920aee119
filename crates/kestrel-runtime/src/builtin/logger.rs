use async_trait::async_trait;

use crate::module::{Module, ModuleError};
use crate::Runtime;

/// Registered first so every subsequent module's `register`/`start`
/// calls can log. Subscribes to the wildcard-ish `system.*` family of
/// topics is deliberately not done here — logging is ambient via
/// `tracing`, not routed through the event bus.
pub struct LoggerModule;

#[async_trait]
impl Module for LoggerModule {
    fn name(&self) -> &str {
        "logger"
    }

    async fn register(&self, _rt: &Runtime) -> Result<(), ModuleError> {
        tracing::info!("logger module registered");
        Ok(())
    }

    async fn start(&self, _rt: &Runtime) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
        Ok(())
    }
}
