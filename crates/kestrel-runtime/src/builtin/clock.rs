use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use kestrel_core::registry::RegistryError;
use kestrel_core::ServiceHandler;

use crate::module::{Module, ModuleError};
use crate::Runtime;

/// Exposes a `clock.now` service and emits a `system.tick` event once
/// per `interval`.
pub struct ClockModule {
    interval: std::time::Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClockModule {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }
}

impl Default for ClockModule {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(60))
    }
}

struct NowHandler;

#[async_trait]
impl ServiceHandler for NowHandler {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, RegistryError> {
        Ok(serde_json::json!({ "now": chrono::Utc::now().to_rfc3339() }))
    }
}

#[async_trait]
impl Module for ClockModule {
    fn name(&self) -> &str {
        "clock"
    }

    async fn register(&self, rt: &Runtime) -> Result<(), ModuleError> {
        rt.services
            .register("clock.now", "v1", Arc::new(NowHandler), false)
            .await
            .map_err(|e| ModuleError::Register("clock".to_string(), e.to_string()))?;
        Ok(())
    }

    async fn start(&self, rt: &Runtime) -> Result<(), ModuleError> {
        let bus = rt.bus.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                bus.publish("system.tick", serde_json::json!({ "at": chrono::Utc::now().to_rfc3339() }))
                    .await;
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}
