use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::Runtime;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module {0} failed to register: {1}")]
    Register(String, String),
    #[error("module {0} failed to start: {1}")]
    Start(String, String),
    #[error("module {0} failed to stop: {1}")]
    Stop(String, String),
}

/// A trusted, statically registered extension unit. Unlike a plugin, a
/// module runs in-process with no sandboxing — it is part of the trust
/// boundary of the kernel itself.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;
    async fn register(&self, rt: &Runtime) -> Result<(), ModuleError>;
    async fn start(&self, rt: &Runtime) -> Result<(), ModuleError>;
    async fn stop(&self, rt: &Runtime) -> Result<(), ModuleError>;
}

/// Supervises modules in fixed registration order. `register_all` and
/// `start_all` run front-to-back; `stop_all` runs back-to-front, so the
/// last module started is the first asked to stop. A failure at any
/// step during startup is fatal — the kernel cannot run with a
/// half-registered module table, so the caller is expected to abort the
/// process rather than attempt to continue degraded.
pub struct ModuleManager {
    modules: Vec<Arc<dyn Module>>,
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self { modules: Vec::new() }
    }
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.push(module);
    }

    pub async fn register_all(&self, rt: &Runtime) -> Result<(), ModuleError> {
        for module in &self.modules {
            tracing::info!(module = module.name(), "registering module");
            module.register(rt).await?;
        }
        Ok(())
    }

    pub async fn start_all(&self, rt: &Runtime) -> Result<(), ModuleError> {
        for module in &self.modules {
            tracing::info!(module = module.name(), "starting module");
            module.start(rt).await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self, rt: &Runtime) {
        for module in self.modules.iter().rev() {
            tracing::info!(module = module.name(), "stopping module");
            if let Err(err) = module.stop(rt).await {
                tracing::warn!(module = module.name(), error = %err, "module failed to stop cleanly");
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_runtime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingModule {
        name: &'static str,
        order: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Module for RecordingModule {
        fn name(&self) -> &str {
            self.name
        }

        async fn register(&self, _rt: &Runtime) -> Result<(), ModuleError> {
            self.order.lock().unwrap().push(format!("{}:register", self.name));
            Ok(())
        }

        async fn start(&self, _rt: &Runtime) -> Result<(), ModuleError> {
            self.order.lock().unwrap().push(format!("{}:start", self.name));
            Ok(())
        }

        async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
            self.order.lock().unwrap().push(format!("{}:stop", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_and_start_run_front_to_back_stop_runs_back_to_front() {
        let rt = test_runtime().await;
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut manager = ModuleManager::new();
        manager.register(Arc::new(RecordingModule { name: "a", order: order.clone() }));
        manager.register(Arc::new(RecordingModule { name: "b", order: order.clone() }));

        manager.register_all(&rt).await.unwrap();
        manager.start_all(&rt).await.unwrap();
        manager.stop_all(&rt).await;

        let recorded = order.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                "a:register".to_string(),
                "b:register".to_string(),
                "a:start".to_string(),
                "b:start".to_string(),
                "b:stop".to_string(),
                "a:stop".to_string(),
            ]
        );
    }

    struct FailingModule;

    #[async_trait]
    impl Module for FailingModule {
        fn name(&self) -> &str {
            "failing"
        }

        async fn register(&self, _rt: &Runtime) -> Result<(), ModuleError> {
            Err(ModuleError::Register("failing".to_string(), "boom".to_string()))
        }

        async fn start(&self, _rt: &Runtime) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_failure_is_fatal_and_reported() {
        let rt = test_runtime().await;
        let mut manager = ModuleManager::new();
        manager.register(Arc::new(FailingModule));

        let err = manager.register_all(&rt).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn stop_continues_past_a_failing_module() {
        struct StopFails(Arc<AtomicUsize>);

        #[async_trait]
        impl Module for StopFails {
            fn name(&self) -> &str {
                "stop-fails"
            }
            async fn register(&self, _rt: &Runtime) -> Result<(), ModuleError> {
                Ok(())
            }
            async fn start(&self, _rt: &Runtime) -> Result<(), ModuleError> {
                Ok(())
            }
            async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
                Err(ModuleError::Stop("stop-fails".to_string(), "boom".to_string()))
            }
        }

        struct StopSucceeds(Arc<AtomicUsize>);

        #[async_trait]
        impl Module for StopSucceeds {
            fn name(&self) -> &str {
                "stop-succeeds"
            }
            async fn register(&self, _rt: &Runtime) -> Result<(), ModuleError> {
                Ok(())
            }
            async fn start(&self, _rt: &Runtime) -> Result<(), ModuleError> {
                Ok(())
            }
            async fn stop(&self, _rt: &Runtime) -> Result<(), ModuleError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let rt = test_runtime().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut manager = ModuleManager::new();
        manager.register(Arc::new(StopSucceeds(counter.clone())));
        manager.register(Arc::new(StopFails(counter.clone())));

        manager.stop_all(&rt).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
