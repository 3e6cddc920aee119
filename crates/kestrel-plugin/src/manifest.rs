use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// A JSON plugin manifest, as discovered under the plugin root
/// directory (one `manifest.json` per plugin subdirectory).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginManifest {
    pub class_path: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn validate_plugin_name(name: &str) -> Result<(), PluginError> {
    if name.is_empty() || name.len() > 64 {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name must be 1-64 characters: {name}"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_lowercase() {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name must start with a lowercase letter: {name}"
        )));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name may only contain lowercase letters, digits and '-': {name}"
        )));
    }
    Ok(())
}

fn validate_semver(version: &str) -> Result<(), PluginError> {
    semver::Version::parse(version)?;
    Ok(())
}

fn validate_class_path(class_path: &str) -> Result<(), PluginError> {
    if class_path.is_empty() {
        return Err(PluginError::InvalidManifest(
            "class_path must not be empty".to_string(),
        ));
    }
    if class_path.contains("..") || class_path.starts_with('/') {
        return Err(PluginError::InvalidManifest(format!(
            "class_path must be a safe relative reference: {class_path}"
        )));
    }
    Ok(())
}

impl PluginManifest {
    pub fn parse(raw: &str) -> Result<Self, PluginError> {
        serde_json::from_str(raw).map_err(|e| PluginError::Manifest(e.to_string()))
    }

    pub fn parse_file(path: &Path) -> Result<Self, PluginError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn validate(&self) -> Result<(), PluginError> {
        validate_plugin_name(&self.name)?;
        validate_semver(&self.version)?;
        validate_class_path(&self.class_path)?;
        for dep in &self.dependencies {
            validate_plugin_name(dep)?;
        }
        if self.dependencies.contains(&self.name) {
            return Err(PluginError::InvalidManifest(format!(
                "plugin {} cannot depend on itself",
                self.name
            )));
        }
        Ok(())
    }

    pub fn parse_and_validate(raw: &str) -> Result<Self, PluginError> {
        let manifest = Self::parse(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }
}
