//! Resource Registry - Load resource kind definitions from JSON
//!
//! This module loads every resource kind the compiler knows about from
//! embedded JSON files: its Terraform type, output unit, dependency order,
//! governing capability, key recipe, collection endpoint and field plan.

use super::plan::{FieldRule, NamePart, Predicate};
use super::value::Attributes;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/organization.json"),
    include_str!("../resources/network.json"),
    include_str!("../resources/services.json"),
];

/// Which inventory scope a kind is collected from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Project,
    Organization,
}

/// HTTP method used to list a kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    Get,
    Post,
}

fn default_parent_field() -> String {
    "name".to_string()
}

/// Child listing performed once per parent record
#[derive(Debug, Clone, Deserialize)]
pub struct ExpandDef {
    /// Kind whose records are the parents; `None` expands recursively over this kind
    #[serde(default)]
    pub from: Option<String>,
    /// URL template containing `{parent}`
    pub url: String,
    #[serde(default = "default_parent_field")]
    pub parent_field: String,
}

/// How a kind is listed from the REST APIs
#[derive(Debug, Clone, Deserialize)]
pub struct CollectDef {
    /// URL template; `{project}` and `{org}` are substituted
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub body: Value,
    /// Dot path of the item array; empty means the response is one record
    #[serde(default)]
    pub response_path: String,
    /// Response items are keyed by zone/region
    #[serde(default)]
    pub aggregated: bool,
    #[serde(default)]
    pub expand: Option<ExpandDef>,
}

/// Records derived from a list attribute of another kind
#[derive(Debug, Clone, Deserialize)]
pub struct DeriveDef {
    pub from: String,
    pub list: String,
    /// child attribute -> parent attributes, first present wins
    #[serde(default)]
    pub inherit: BTreeMap<String, Vec<String>>,
}

/// Resource kind definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct KindDef {
    pub display_name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub unit: String,
    pub order: u32,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub capability: Option<String>,
    /// Other inventory keys this kind is known by
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub key: Vec<NamePart>,
    /// Parts of the symbolic name; defaults to the key parts
    #[serde(default)]
    pub symbol: Vec<NamePart>,
    /// Attributes other records may use to refer to this one
    #[serde(default)]
    pub reference_fields: Vec<String>,
    #[serde(default)]
    pub skip_when: Vec<Predicate>,
    /// Collected only to derive other kinds; never emitted
    #[serde(default)]
    pub source_only: bool,
    #[serde(default)]
    pub derive: Option<DeriveDef>,
    #[serde(default)]
    pub collect: Option<CollectDef>,
    #[serde(default)]
    pub plan: Vec<FieldRule>,
}

impl KindDef {
    /// Build the natural key of a record
    pub fn natural_key(&self, attrs: &Attributes) -> std::result::Result<String, String> {
        if self.key.is_empty() {
            return super::value::lookup_text(attrs, "name")
                .filter(|name| !name.is_empty())
                .ok_or_else(|| "missing key attribute 'name'".to_string());
        }

        let mut parts = Vec::with_capacity(self.key.len());
        for part in &self.key {
            match part.extract(attrs) {
                Some(value) => parts.push(value),
                None if part.optional => {}
                None => return Err(format!("missing key attribute '{}'", part.attr)),
            }
        }

        if parts.is_empty() {
            return Err("no key attribute present".to_string());
        }
        Ok(parts.join("/"))
    }

    /// Raw (unsanitized) symbolic name of a record
    pub fn symbol_source(&self, attrs: &Attributes) -> String {
        let parts = if self.symbol.is_empty() {
            &self.key
        } else {
            &self.symbol
        };
        parts
            .iter()
            .filter_map(|part| part.extract(attrs))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Whether a record is deliberately left out (e.g. provider-managed defaults)
    pub fn skips(&self, attrs: &Attributes) -> bool {
        self.skip_when.iter().any(|p| p.matches(attrs))
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub kinds: HashMap<String, KindDef>,
}

impl Registry {
    /// Parse and merge registry documents
    pub fn from_documents(documents: &[&str]) -> Result<Self> {
        let mut registry = Registry::default();
        for content in documents {
            let partial: Registry =
                serde_json::from_str(content).context("Failed to parse resource registry JSON")?;
            registry.kinds.extend(partial.kinds);
        }
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        for (key, def) in &self.kinds {
            if !def.source_only && (def.resource_type.is_empty() || def.unit.is_empty()) {
                anyhow::bail!("kind '{}' needs a resource_type and a unit", key);
            }
            if let Some(derive) = &def.derive {
                if !self.kinds.contains_key(&derive.from) {
                    anyhow::bail!("kind '{}' derives from unknown kind '{}'", key, derive.from);
                }
            }
            if let Some(from) = def
                .collect
                .as_ref()
                .and_then(|c| c.expand.as_ref())
                .and_then(|e| e.from.as_ref())
            {
                if !self.kinds.contains_key(from) {
                    anyhow::bail!("kind '{}' expands from unknown kind '{}'", key, from);
                }
            }
        }
        Ok(())
    }

    /// Get a kind definition by key
    pub fn get_kind(&self, key: &str) -> Option<&KindDef> {
        self.kinds.get(key)
    }

    /// Map an inventory key (kind key or alias) to its kind key
    pub fn canonical_kind(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.kinds.get_key_value(name) {
            return Some(key.as_str());
        }
        self.kinds
            .iter()
            .filter(|(_, def)| def.aliases.iter().any(|a| a == name))
            .map(|(key, _)| key.as_str())
            .min()
    }

    /// All kinds in dependency order
    pub fn ordered_kinds(&self) -> Vec<(&str, &KindDef)> {
        let mut kinds: Vec<(&str, &KindDef)> = self
            .kinds
            .iter()
            .map(|(key, def)| (key.as_str(), def))
            .collect();
        kinds.sort_by(|a, b| a.1.order.cmp(&b.1.order).then(a.0.cmp(b.0)));
        kinds
    }

    /// Kinds derived from list attributes of other kinds
    pub fn derived_kinds(&self) -> Vec<(&str, &KindDef)> {
        self.ordered_kinds()
            .into_iter()
            .filter(|(_, def)| def.derive.is_some())
            .collect()
    }

    /// Close a kind selection over what it needs to be collected
    /// (derivation sources and expansion parents)
    pub fn with_dependencies(&self, kinds: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closed = kinds.clone();
        let mut pending: Vec<String> = kinds.iter().cloned().collect();

        while let Some(kind) = pending.pop() {
            let Some(def) = self.kinds.get(&kind) else {
                continue;
            };
            let parents = def
                .derive
                .as_ref()
                .map(|d| d.from.clone())
                .into_iter()
                .chain(
                    def.collect
                        .as_ref()
                        .and_then(|c| c.expand.as_ref())
                        .and_then(|e| e.from.clone()),
                );
            for parent in parents {
                if closed.insert(parent.clone()) {
                    pending.push(parent);
                }
            }
        }

        closed
    }
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        Registry::from_documents(RESOURCE_FILES)
            .unwrap_or_else(|e| panic!("Failed to load embedded resource registry: {:#}", e))
    })
}

/// Get a kind definition by key
pub fn get_kind(key: &str) -> Option<&'static KindDef> {
    get_registry().get_kind(key)
}

/// Get all kind keys in dependency order
pub fn get_all_kind_keys() -> Vec<&'static str> {
    get_registry()
        .ordered_kinds()
        .into_iter()
        .map(|(key, _)| key)
        .collect()
}
