//! Configuration Management
//!
//! Handles persistent configuration storage for cloudres.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-service overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Definition document for this service
    #[serde(default)]
    pub definitions: Option<PathBuf>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Default service endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token sent with every call
    #[serde(default)]
    pub token: Option<String>,
    /// Directories searched for `<service>.json` / `<service>.yaml`
    #[serde(default)]
    pub definitions: Vec<PathBuf>,
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudres").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Load an explicitly named file; unlike [`Config::load`] failures are errors
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective endpoint (CLI > service override > global)
    pub fn effective_endpoint(&self, service: &str, cli: Option<&str>) -> Option<String> {
        cli.map(String::from)
            .or_else(|| {
                self.services
                    .get(service)
                    .and_then(|s| s.endpoint.clone())
            })
            .or_else(|| self.endpoint.clone())
    }

    /// Find the definition document for a service
    pub fn definition_path(&self, service: &str) -> Option<PathBuf> {
        if let Some(path) = self
            .services
            .get(service)
            .and_then(|s| s.definitions.clone())
        {
            return Some(path);
        }

        self.definitions.iter().find_map(|dir| {
            ["json", "yaml", "yml"]
                .iter()
                .map(|ext| dir.join(format!("{}.{}", service, ext)))
                .find(|candidate| candidate.exists())
        })
    }
}
