//! Resource Graph
//!
//! Collection fills a [`GraphBuilder`]; once every kind is loaded it is frozen
//! into an immutable [`ResourceGraph`] that the compiler only reads.

use super::registry::Registry;
use super::value::{
    canonical_path, lookup, lookup_text, normalize_record, segment_after, terminal_segment,
    AttrValue, Attributes,
};
use crate::diagnostics::Diagnostic;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Stable handle of a record inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(usize);

impl RecordId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A normalized resource instance
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub kind: String,
    pub natural_key: String,
    pub attributes: Attributes,
}

impl ResourceRecord {
    pub fn new(kind: impl Into<String>, natural_key: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: kind.into(),
            natural_key: natural_key.into(),
            attributes,
        }
    }
}

/// Result of looking a reference up within one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindLookup {
    Found(RecordId),
    Ambiguous(usize),
    Missing,
}

/// Mutable collect phase
#[derive(Debug, Default)]
pub struct GraphBuilder {
    records: Vec<ResourceRecord>,
    by_key: HashMap<String, HashMap<String, RecordId>>,
    kind_order: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record; a duplicate `(kind, natural_key)` replaces the earlier copy in place
    pub fn insert(&mut self, record: ResourceRecord) -> RecordId {
        if !self.by_key.contains_key(&record.kind) {
            self.kind_order.push(record.kind.clone());
        }
        let slots = self.by_key.entry(record.kind.clone()).or_default();

        if let Some(&id) = slots.get(&record.natural_key) {
            warn!(
                "Duplicate {} record '{}', keeping the last one",
                record.kind, record.natural_key
            );
            self.diagnostics.push(Diagnostic::DuplicateRecord {
                kind: record.kind.clone(),
                key: record.natural_key.clone(),
            });
            self.records[id.0] = record;
            return id;
        }

        let id = RecordId(self.records.len());
        slots.insert(record.natural_key.clone(), id);
        self.records.push(record);
        id
    }

    /// Normalize and insert the raw records listed under one inventory key
    pub fn load_kind(&mut self, registry: &Registry, inventory_key: &str, raw: &[Value]) {
        let (kind, def) = match registry.canonical_kind(inventory_key) {
            Some(kind) => (kind.to_string(), registry.get_kind(kind)),
            None => (inventory_key.to_string(), None),
        };

        for (index, value) in raw.iter().enumerate() {
            let Some(attrs) = normalize_record(value) else {
                self.malformed(&kind, format!("#{}", index), "record is not an object");
                continue;
            };

            let key = match def {
                Some(def) => match def.natural_key(&attrs) {
                    Ok(key) => key,
                    Err(_) if def.source_only => format!("#{}", index),
                    Err(reason) => {
                        let label = lookup_text(&attrs, "name").unwrap_or_else(|| format!("#{}", index));
                        self.malformed(&kind, label, &reason);
                        continue;
                    }
                },
                None => lookup_text(&attrs, "name")
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| format!("#{}", index)),
            };

            self.insert(ResourceRecord::new(kind.clone(), key, attrs));
        }
    }

    /// Load every kind of a raw inventory
    pub fn load_inventory(&mut self, registry: &Registry, resources: &BTreeMap<String, Vec<Value>>) {
        for (key, raw) in resources {
            self.load_kind(registry, key, raw);
        }
    }

    /// Materialize kinds that live inside other kinds' records (NATs in routers,
    /// peerings in networks, bindings in IAM policies)
    fn derive(&mut self, registry: &Registry) {
        for (kind, def) in registry.derived_kinds() {
            let Some(recipe) = &def.derive else {
                continue;
            };
            let parents: Vec<RecordId> = self
                .by_key
                .get(&recipe.from)
                .map(|slots| {
                    let mut ids: Vec<RecordId> = slots.values().copied().collect();
                    ids.sort();
                    ids
                })
                .unwrap_or_default();

            let mut derived = Vec::new();
            for parent_id in parents {
                let parent = &self.records[parent_id.0];
                let children = match lookup(&parent.attributes, &recipe.list) {
                    None | Some(AttrValue::Null) => continue,
                    Some(AttrValue::Records(children)) => children,
                    Some(AttrValue::List(items)) if items.is_empty() => continue,
                    Some(other) => {
                        let reason = format!("'{}' should be a list of records, found {}", recipe.list, other.shape());
                        derived.push(Err((parent.natural_key.clone(), reason)));
                        continue;
                    }
                };

                for (index, child) in children.iter().enumerate() {
                    let mut attrs = child.clone();
                    for (target, sources) in &recipe.inherit {
                        if attrs.get(target).is_some_and(|v| !v.is_absent()) {
                            continue;
                        }
                        if let Some(value) = sources
                            .iter()
                            .filter_map(|source| lookup(&parent.attributes, source))
                            .find(|v| !v.is_absent())
                        {
                            attrs.insert(target.clone(), value.clone());
                        }
                    }

                    match def.natural_key(&attrs) {
                        Ok(key) => derived.push(Ok(ResourceRecord::new(kind, key, attrs))),
                        Err(reason) => {
                            derived.push(Err((format!("{}#{}", parent.natural_key, index), reason)))
                        }
                    }
                }
            }

            debug!("Derived {} {} record(s) from {}", derived.len(), kind, recipe.from);
            for entry in derived {
                match entry {
                    Ok(record) => {
                        self.insert(record);
                    }
                    Err((key, reason)) => self.malformed(kind, key, &reason),
                }
            }
        }
    }

    fn malformed(&mut self, kind: &str, key: String, reason: &str) {
        warn!("Skipping malformed {} record '{}': {}", kind, key, reason);
        self.diagnostics.push(Diagnostic::MalformedRecord {
            kind: kind.to_string(),
            key,
            reason: reason.to_string(),
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Derive nested kinds, build the lookup indexes and freeze
    pub fn freeze(mut self, registry: &Registry) -> ResourceGraph {
        self.derive(registry);

        let mut by_path: HashMap<String, Vec<RecordId>> = HashMap::new();
        let mut by_segment: HashMap<String, HashMap<String, Vec<RecordId>>> = HashMap::new();
        let mut projects = Vec::with_capacity(self.records.len());

        for (index, record) in self.records.iter().enumerate() {
            let id = RecordId(index);
            let reference_fields = registry
                .get_kind(&record.kind)
                .map(|def| def.reference_fields.as_slice())
                .unwrap_or_default();

            let mut aliases = vec![record.natural_key.clone()];
            aliases.extend(lookup_text(&record.attributes, "name"));
            aliases.extend(
                reference_fields
                    .iter()
                    .filter_map(|field| lookup_text(&record.attributes, field)),
            );

            let mut paths: Vec<String> = aliases
                .iter()
                .filter(|a| !a.is_empty())
                .map(|a| canonical_path(a).to_string())
                .collect();
            paths.sort();
            paths.dedup();

            let mut segments: Vec<String> = std::iter::once(record.natural_key.clone())
                .chain(lookup_text(&record.attributes, "name"))
                .map(|a| terminal_segment(&a).to_string())
                .filter(|s| !s.is_empty())
                .collect();
            segments.sort();
            segments.dedup();

            projects.push(
                paths
                    .iter()
                    .find_map(|p| segment_after(p, "projects"))
                    .map(str::to_string),
            );

            for path in paths {
                by_path.entry(path).or_default().push(id);
            }
            let kind_segments = by_segment.entry(record.kind.clone()).or_default();
            for segment in segments {
                kind_segments.entry(segment).or_default().push(id);
            }
        }

        ResourceGraph {
            records: self.records,
            by_key: self.by_key,
            by_path,
            by_segment,
            projects,
            kind_order: self.kind_order,
            diagnostics: self.diagnostics,
        }
    }
}

/// Immutable set of records for one compilation run
#[derive(Debug, Default)]
pub struct ResourceGraph {
    records: Vec<ResourceRecord>,
    by_key: HashMap<String, HashMap<String, RecordId>>,
    /// canonical reference path -> records addressable by it (all kinds)
    by_path: HashMap<String, Vec<RecordId>>,
    /// kind -> terminal segment -> records
    by_segment: HashMap<String, HashMap<String, Vec<RecordId>>>,
    /// owning project named by a record's own paths, when known
    projects: Vec<Option<String>>,
    kind_order: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ResourceGraph {
    /// Build a graph straight from a raw inventory
    pub fn from_inventory(registry: &Registry, resources: &BTreeMap<String, Vec<Value>>) -> Self {
        let mut builder = GraphBuilder::new();
        builder.load_inventory(registry, resources);
        builder.freeze(registry)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: RecordId) -> &ResourceRecord {
        &self.records[id.0]
    }

    pub fn id_of(&self, kind: &str, natural_key: &str) -> Option<RecordId> {
        self.by_key.get(kind)?.get(natural_key).copied()
    }

    pub fn get(&self, kind: &str, natural_key: &str) -> Option<&ResourceRecord> {
        self.id_of(kind, natural_key).map(|id| self.record(id))
    }

    /// Look a raw reference up across all kinds; only an unambiguous match is returned.
    ///
    /// A path or bare name indexed for several records (for instance a short
    /// name shared by a network and a subnet) yields `None`; use
    /// [`ResourceGraph::find_in_kind`] when the expected kind is known.
    pub fn find_by_reference_path(&self, path: &str) -> Option<&ResourceRecord> {
        match self.by_path.get(canonical_path(path)).map(Vec::as_slice) {
            Some([id]) => Some(self.record(*id)),
            _ => None,
        }
    }

    /// Look a raw reference up among records of one kind: exact path first,
    /// then the terminal segment. Never crosses kinds.
    pub fn find_in_kind(&self, kind: &str, raw: &str) -> KindLookup {
        let raw = raw.trim();
        if raw.is_empty() {
            return KindLookup::Missing;
        }

        let exact: Vec<RecordId> = self
            .by_path
            .get(canonical_path(raw))
            .into_iter()
            .flatten()
            .copied()
            .filter(|id| self.records[id.0].kind == kind)
            .collect();
        match exact.as_slice() {
            [id] => return KindLookup::Found(*id),
            [] => {}
            many => return KindLookup::Ambiguous(many.len()),
        }

        let wanted_project = segment_after(raw, "projects");
        let candidates: Vec<RecordId> = self
            .by_segment
            .get(kind)
            .and_then(|segments| segments.get(terminal_segment(raw)))
            .into_iter()
            .flatten()
            .copied()
            .filter(|id| match (wanted_project, self.projects[id.0].as_deref()) {
                (Some(wanted), Some(owner)) => wanted == owner,
                _ => true,
            })
            .collect();

        match candidates.as_slice() {
            [] => KindLookup::Missing,
            [id] => KindLookup::Found(*id),
            many => KindLookup::Ambiguous(many.len()),
        }
    }

    /// Records of one kind in insertion order
    pub fn records_of_kind(&self, kind: &str) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .by_key
            .get(kind)
            .map(|slots| slots.values().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Kinds present in the graph, in first-seen order
    pub fn kinds(&self) -> &[String] {
        &self.kind_order
    }

    /// Diagnostics raised while the graph was built
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
