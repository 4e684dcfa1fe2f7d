//! Inventory snapshots
//!
//! The raw inventory is a map from kind (or legacy key) to the records the
//! APIs returned for it. Snapshots are written as JSON or YAML depending on
//! the file extension, and both the structured layout
//! (`{collected_at, project_id, organization_id, resources}`) and the flat
//! legacy `resources.json` map are accepted on load.

pub mod capability;
pub mod collector;

use crate::resource::{Registry, ResourceGraph};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Legacy keys that only summarize data present under another key
const SUMMARY_KEYS: &[&str] = &["folders", "org_policies", "peerings"];

/// Snapshot file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Yaml,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SnapshotFormat::Yaml
            }
            _ => SnapshotFormat::Json,
        }
    }
}

/// Raw inventory snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub collected_at: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<Value>>,
}

impl Inventory {
    /// Empty snapshot stamped with the current time
    pub fn new(project_id: Option<String>, organization_id: Option<String>) -> Self {
        Self {
            collected_at: Some(chrono::Utc::now().to_rfc3339()),
            project_id,
            organization_id,
            resources: BTreeMap::new(),
        }
    }

    /// Load a snapshot from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        Self::parse(&content, SnapshotFormat::from_path(path))
            .with_context(|| format!("Failed to parse inventory {}", path.display()))
    }

    pub fn parse(content: &str, format: SnapshotFormat) -> Result<Self> {
        let value: Value = match format {
            SnapshotFormat::Json => serde_json::from_str(content).context("Invalid JSON")?,
            SnapshotFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML")?,
        };
        Self::from_value(value)
    }

    /// Accept the structured layout or the flat legacy map
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            anyhow::bail!("inventory root must be an object");
        };

        let text = |v: Option<Value>| match v {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        match root.remove("resources") {
            Some(Value::Object(resources)) => Ok(Self {
                collected_at: text(root.remove("collected_at")),
                project_id: text(root.remove("project_id")),
                organization_id: text(root.remove("organization_id")),
                resources: normalize_resources(resources),
            }),
            Some(_) => anyhow::bail!("'resources' must be an object"),
            None => {
                tracing::debug!("Reading flat legacy inventory layout");
                Ok(Self {
                    resources: normalize_resources(root),
                    ..Self::default()
                })
            }
        }
    }

    /// Write the snapshot, JSON or YAML by extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match SnapshotFormat::from_path(path) {
            SnapshotFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize inventory")?
            }
            SnapshotFormat::Yaml => {
                serde_yaml::to_string(self).context("Failed to serialize inventory")?
            }
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write inventory {}", path.display()))
    }

    /// Record count per inventory key
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        self.resources
            .iter()
            .map(|(key, records)| (key.as_str(), records.len()))
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    /// Build and freeze the resource graph
    pub fn build_graph(&self, registry: &Registry) -> ResourceGraph {
        ResourceGraph::from_inventory(registry, &self.resources)
    }
}

fn normalize_resources(map: serde_json::Map<String, Value>) -> BTreeMap<String, Vec<Value>> {
    let mut resources = BTreeMap::new();
    for (key, value) in map {
        if SUMMARY_KEYS.contains(&key.as_str()) {
            continue;
        }
        let records = match value {
            Value::Array(items) => items,
            Value::Object(obj) if obj.is_empty() => Vec::new(),
            Value::Object(obj) => vec![Value::Object(obj)],
            Value::Null => Vec::new(),
            other => {
                tracing::warn!("Ignoring inventory key '{}': not a record list ({})", key, other);
                continue;
            }
        };
        resources.insert(key, records);
    }
    resources
}
