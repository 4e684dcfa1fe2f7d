//! Configuration Management
//!
//! Persistent user configuration for gcp2tf. Effective values resolve as
//! command line > config file > gcloud configuration/environment > default.

use crate::compiler::{DEFAULT_PROVIDER_VERSION, DEFAULT_ZONE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    /// Where units are written; defaults to `./<project or org id>`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Version constraint for the google provider
    #[serde(default)]
    pub provider_version: Option<String>,
    /// Write the raw inventory snapshot next to the units
    #[serde(default)]
    pub save_inventory: Option<bool>,
    /// Kinds never collected or compiled
    #[serde(default)]
    pub disabled_kinds: BTreeSet<String>,
}

impl Config {
    /// Config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcp2tf").join("config.json"))
    }

    /// Directory for log files
    pub fn log_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcp2tf").join("logs"))
    }

    /// Load configuration from disk; a missing or unreadable file yields defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring {}: {:#}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid configuration JSON")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Project: flag > config > gcloud default
    pub fn effective_project(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| self.project_id.clone())
            .or_else(crate::gcp::auth::get_default_project)
    }

    /// Organization: flag > config
    pub fn effective_organization(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| self.organization_id.clone())
            .map(|id| id.trim_start_matches("organizations/").to_string())
    }

    /// Zone: config > gcloud default > built-in
    pub fn effective_zone(&self) -> String {
        self.zone
            .clone()
            .or_else(crate::gcp::auth::get_default_zone)
            .unwrap_or_else(|| DEFAULT_ZONE.to_string())
    }

    /// Region: flag > config > gcloud default > region of the effective zone
    pub fn effective_region(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(crate::gcp::auth::get_default_region)
            .unwrap_or_else(|| crate::gcp::auth::region_of_zone(&self.effective_zone()).to_string())
    }

    pub fn effective_provider_version(&self) -> String {
        self.provider_version
            .clone()
            .unwrap_or_else(|| DEFAULT_PROVIDER_VERSION.to_string())
    }

    /// Output directory: flag > config > `./<name>`
    pub fn effective_output_dir(&self, flag: Option<PathBuf>, name: &str) -> PathBuf {
        flag.or_else(|| self.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".").join(name))
    }

    pub fn effective_save_inventory(&self, disabled_by_flag: bool) -> bool {
        !disabled_by_flag && self.save_inventory.unwrap_or(true)
    }

    /// Remember the identifiers of a successful run
    pub fn remember(&mut self, project_id: Option<&str>, organization_id: Option<&str>) -> Result<()> {
        if let Some(project) = project_id {
            self.project_id = Some(project.to_string());
        }
        if let Some(org) = organization_id {
            self.organization_id = Some(org.to_string());
        }
        self.save()
    }
}
