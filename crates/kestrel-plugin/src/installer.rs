//! Plugin installer — git clone, manifest/WASM validation, installation
//! flow onto the local plugin root directory that `manager::discover`
//! scans.

use std::path::{Path, PathBuf};

use crate::error::PluginError;
use crate::manifest::PluginManifest;

const WASM_MAGIC: &[u8; 4] = b"\0asm";
const DEFAULT_MAX_WASM_SIZE_MB: u64 = 50;
const ALLOWED_IMPORT_NAMESPACES: &[&str] = &[
    "env",
    "extism:host/env",
    "wasi_snapshot_preview1",
    "wasi_unstable",
];

/// Only HTTPS URLs are allowed; file/http/ssh/git protocols and
/// private/reserved hosts are rejected to prevent SSRF and local file
/// access via a malicious plugin source.
fn validate_git_url(url: &str) -> Result<(), PluginError> {
    let parsed = url::Url::parse(url)
        .map_err(|_| PluginError::Installation(format!("invalid git URL: '{url}'")))?;

    if parsed.scheme() != "https" {
        return Err(PluginError::Installation(format!(
            "only HTTPS git URLs are allowed, got scheme '{}' in '{url}'",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| PluginError::Installation(format!("git URL has no host: '{url}'")))?;

    let blocked_hosts = [
        "localhost",
        "127.0.0.1",
        "0.0.0.0",
        "[::1]",
        "169.254.169.254",
        "metadata.google.internal",
    ];
    if blocked_hosts.contains(&host) {
        return Err(PluginError::Installation(format!(
            "git URL host '{host}' is blocked (private/reserved address)"
        )));
    }

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        let is_private = match ip {
            std::net::IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
            std::net::IpAddr::V6(v6) => v6.is_loopback(),
        };
        if is_private {
            return Err(PluginError::Installation(format!(
                "git URL resolves to private IP: '{host}'"
            )));
        }
    }

    Ok(())
}

/// Installs plugins from git repositories into a local plugin root.
/// Each installed plugin lands at `<plugin_root>/<name>-<version>/`
/// containing `manifest.json` and the WASM module it points at.
pub struct PluginInstaller {
    plugin_root: PathBuf,
    max_wasm_size: u64,
}

impl PluginInstaller {
    pub fn new(plugin_root: impl Into<PathBuf>) -> Self {
        let max_wasm_size = std::env::var("KESTREL_PLUGIN_WASM_MAX_SIZE_MB")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_WASM_SIZE_MB)
            * 1024
            * 1024;

        Self {
            plugin_root: plugin_root.into(),
            max_wasm_size,
        }
    }

    /// Clone, validate, and install a plugin. Expects the repository
    /// root to contain `manifest.json` and the WASM binary it
    /// references via `class_path`'s module path (`<class_path
    /// namespace>.wasm`, resolved relative to the repository root).
    pub async fn install_from_git(&self, git_url: &str) -> Result<PluginManifest, PluginError> {
        tracing::info!(git_url = %git_url, "starting plugin installation");
        validate_git_url(git_url)?;

        let temp_dir = tempfile::tempdir()?;
        self.clone_repo(git_url, temp_dir.path())?;

        let manifest_path = temp_dir.path().join("manifest.json");
        if !manifest_path.exists() {
            return Err(PluginError::Installation(
                "manifest.json not found in repository root".into(),
            ));
        }
        let manifest_content = tokio::fs::read_to_string(&manifest_path).await?;
        let manifest = PluginManifest::parse_and_validate(&manifest_content)?;

        let wasm_rel = format!("{}.wasm", manifest.class_path.replace("::", "/"));
        let wasm_path = temp_dir.path().join(&wasm_rel);
        if !wasm_path.exists() {
            return Err(PluginError::Installation(format!(
                "WASM binary not found at declared path: {wasm_rel}"
            )));
        }

        let wasm_path = wasm_path
            .canonicalize()
            .map_err(|e| PluginError::Installation(format!("invalid WASM path: {e}")))?;
        if !wasm_path.starts_with(temp_dir.path()) {
            return Err(PluginError::Installation(
                "WASM path escapes repository directory (path traversal)".into(),
            ));
        }

        self.validate_wasm(&wasm_path).await?;

        let install_dir = self
            .plugin_root
            .join(format!("{}-{}", manifest.name, manifest.version));
        if install_dir.exists() {
            tokio::fs::remove_dir_all(&install_dir).await?;
        }
        tokio::fs::create_dir_all(&install_dir).await?;

        tokio::fs::copy(&wasm_path, install_dir.join("plugin.wasm")).await?;
        tokio::fs::copy(&manifest_path, install_dir.join("manifest.json")).await?;

        tracing::info!(
            plugin_name = %manifest.name,
            version = %manifest.version,
            "plugin installed successfully"
        );

        Ok(manifest)
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), PluginError> {
        tracing::info!(url = %url, dest = %dest.display(), "cloning plugin repository");
        git2::Repository::clone(url, dest)?;
        Ok(())
    }

    async fn validate_wasm(&self, wasm_path: &Path) -> Result<(), PluginError> {
        let metadata = tokio::fs::metadata(wasm_path)
            .await
            .map_err(|e| PluginError::WasmValidation(format!("failed to read WASM metadata: {e}")))?;

        let size = metadata.len();
        if size > self.max_wasm_size {
            return Err(PluginError::WasmValidation(format!(
                "WASM binary too large: {size} bytes (max: {} bytes)",
                self.max_wasm_size
            )));
        }

        let wasm_bytes = tokio::fs::read(wasm_path)
            .await
            .map_err(|e| PluginError::WasmValidation(format!("failed to read WASM binary: {e}")))?;

        if wasm_bytes.len() < 4 || &wasm_bytes[..4] != WASM_MAGIC {
            return Err(PluginError::WasmValidation(
                "invalid WASM binary: magic bytes mismatch".into(),
            ));
        }

        self.validate_wasm_imports(&wasm_bytes)
    }

    fn validate_wasm_imports(&self, wasm_bytes: &[u8]) -> Result<(), PluginError> {
        use wasmparser::{Parser, Payload};

        let parser = Parser::new(0);
        for payload in parser.parse_all(wasm_bytes) {
            let payload = payload
                .map_err(|e| PluginError::WasmValidation(format!("failed to parse WASM: {e}")))?;

            if let Payload::ImportSection(reader) = payload {
                for import in reader {
                    let import = import.map_err(|e| {
                        PluginError::WasmValidation(format!("failed to read import: {e}"))
                    })?;
                    if !ALLOWED_IMPORT_NAMESPACES.contains(&import.module) {
                        return Err(PluginError::WasmValidation(format!(
                            "unauthorized import namespace: '{}' (function: '{}')",
                            import.module, import.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
