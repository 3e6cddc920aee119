//! WASM plugin sandbox using Extism (wasmtime).
//!
//! Each plugin instance runs in its own isolated WASM sandbox with
//! configurable memory limits and fuel-based execution limits.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::PluginError;

/// Configuration for the WASM sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum memory in bytes (default: 32 MB).
    pub memory_limit: usize,
    /// Maximum fuel (instructions) per execution (default: 1_000_000).
    pub fuel_limit: u64,
    /// Whether to enable WASI (default: false for security). When
    /// false, plugins cannot access env vars, filesystem, or stdio.
    pub wasi_enabled: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit: 32 * 1024 * 1024,
            fuel_limit: 1_000_000,
            wasi_enabled: false,
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        Self {
            memory_limit: std::env::var("KESTREL_PLUGIN_MEMORY_LIMIT_MB")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(32)
                * 1024
                * 1024,
            fuel_limit: std::env::var("KESTREL_PLUGIN_FUEL_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000_000),
            wasi_enabled: std::env::var("KESTREL_PLUGIN_WASI_ENABLED")
                .unwrap_or_default()
                .eq_ignore_ascii_case("true"),
        }
    }
}

/// A loaded WASM plugin sandbox. Each lifecycle hook and subscribed
/// event is invoked as `{class_path}::{hook}`, e.g.
/// `handlers::thermostat::on_start`.
pub struct PluginSandbox {
    plugin: extism::Plugin,
    config: SandboxConfig,
    plugin_name: String,
}

impl std::fmt::Debug for PluginSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSandbox")
            .field("plugin_name", &self.plugin_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PluginSandbox {
    pub fn load(wasm_path: &Path, config: SandboxConfig, name: &str) -> Result<Self, PluginError> {
        let wasm_bytes = std::fs::read(wasm_path)?;

        let manifest = extism::Manifest::new([extism::Wasm::data(wasm_bytes)])
            .with_memory_max((config.memory_limit / 65536) as u32);

        let builder = extism::PluginBuilder::new(manifest)
            .with_wasi(config.wasi_enabled)
            .with_fuel_limit(config.fuel_limit);

        if config.wasi_enabled {
            tracing::warn!(
                plugin = %name,
                "WASI enabled for plugin — plugin can access environment variables"
            );
        }

        let plugin = builder
            .build()
            .map_err(|e| PluginError::Sandbox(e.to_string()))?;

        Ok(Self {
            plugin,
            config,
            plugin_name: name.to_string(),
        })
    }

    pub fn call(&mut self, function_name: &str, input: &[u8]) -> Result<Vec<u8>, PluginError> {
        let output = self
            .plugin
            .call::<&[u8], Vec<u8>>(function_name, input)
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("fuel") {
                    PluginError::FuelExhausted(self.plugin_name.clone())
                } else if msg.contains("memory") {
                    PluginError::MemoryExceeded(self.plugin_name.clone())
                } else {
                    PluginError::Sandbox(msg)
                }
            })?;

        Ok(output)
    }

    pub fn call_json<I: Serialize, O: DeserializeOwned>(
        &mut self,
        function_name: &str,
        input: &I,
    ) -> Result<O, PluginError> {
        let json_bytes = serde_json::to_vec(input)?;
        let output_bytes = self.call(function_name, &json_bytes)?;
        let result = serde_json::from_slice(&output_bytes)?;
        Ok(result)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.plugin.function_exists(name)
    }

    pub fn name(&self) -> &str {
        &self.plugin_name
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}
