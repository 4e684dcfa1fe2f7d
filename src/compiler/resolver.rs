//! Reference Resolver
//!
//! Turns raw foreign-key strings into symbolic Terraform references when the
//! referent is emitted in the same configuration, and into quoted literals
//! otherwise.

use super::hcl::Expr;
use super::sanitize::symbol_for;
use crate::diagnostics::Diagnostic;
use crate::resource::{KindDef, KindLookup, RecordId, Registry, ResourceGraph};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Why a reference stayed literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// No record of the expected kind matches
    NotFound,
    /// Several records of the expected kind match the terminal segment
    Ambiguous(usize),
    /// The referent exists but is not emitted (skipped or filtered out)
    NotEmitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    /// `<resource_type>.<symbol>.<field>`, rendered bare
    Local(String),
    /// Original text, rendered quoted
    External { literal: String, reason: Unresolved },
}

impl ResolvedReference {
    pub fn to_expr(&self) -> Expr {
        match self {
            ResolvedReference::Local(expr) => Expr::raw(expr.clone()),
            ResolvedReference::External { literal, .. } => Expr::str(literal.clone()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ResolvedReference::Local(_))
    }
}

/// Symbolic names of every emitted record
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<RecordId, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the records of one kind. Records are taken in natural-key order;
    /// the first keeps its sanitized name and later collisions get `_2`, `_3`, ...
    pub fn assign_kind(
        &mut self,
        graph: &ResourceGraph,
        kind: &str,
        def: &KindDef,
        ids: &[RecordId],
    ) -> Vec<Diagnostic> {
        let mut ordered: Vec<RecordId> = ids.to_vec();
        ordered.sort_by(|a, b| graph.record(*a).natural_key.cmp(&graph.record(*b).natural_key));

        let mut owners: HashMap<String, String> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut diagnostics = Vec::new();

        for (index, id) in ordered.into_iter().enumerate() {
            let record = graph.record(id);
            let base = symbol_for(&def.symbol_source(&record.attributes), kind, index);

            let symbol = if taken.contains(&base) {
                let mut n = 2;
                let renamed = loop {
                    let candidate = format!("{}_{}", base, n);
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                };
                diagnostics.push(Diagnostic::IdentifierCollision {
                    kind: kind.to_string(),
                    key: record.natural_key.clone(),
                    symbol: base.clone(),
                    renamed: renamed.clone(),
                    first: owners.get(&base).cloned().unwrap_or_default(),
                });
                renamed
            } else {
                base
            };

            debug!("{} '{}' -> {}", kind, record.natural_key, symbol);
            owners.insert(symbol.clone(), record.natural_key.clone());
            taken.insert(symbol.clone());
            self.symbols.insert(id, symbol);
        }

        diagnostics
    }

    pub fn get(&self, id: RecordId) -> Option<&str> {
        self.symbols.get(&id).map(String::as_str)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.symbols.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Read-only resolver over a frozen graph and its symbol table
pub struct Resolver<'a> {
    graph: &'a ResourceGraph,
    registry: &'a Registry,
    symbols: &'a SymbolTable,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a ResourceGraph, registry: &'a Registry, symbols: &'a SymbolTable) -> Self {
        Self {
            graph,
            registry,
            symbols,
        }
    }

    /// Resolve `raw` against records of `kind` only
    pub fn resolve(&self, raw: &str, kind: &str, field: &str) -> ResolvedReference {
        let external = |reason| ResolvedReference::External {
            literal: raw.to_string(),
            reason,
        };

        let Some(def) = self.registry.get_kind(kind) else {
            return external(Unresolved::NotFound);
        };

        match self.graph.find_in_kind(kind, raw) {
            KindLookup::Found(id) => match self.symbols.get(id) {
                Some(symbol) => {
                    ResolvedReference::Local(format!("{}.{}.{}", def.resource_type, symbol, field))
                }
                None => external(Unresolved::NotEmitted),
            },
            KindLookup::Ambiguous(n) => external(Unresolved::Ambiguous(n)),
            KindLookup::Missing => external(Unresolved::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::get_registry;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn graph(value: Value) -> ResourceGraph {
        let resources: BTreeMap<String, Vec<Value>> = serde_json::from_value(value).unwrap();
        ResourceGraph::from_inventory(get_registry(), &resources)
    }

    fn symbols_for(graph: &ResourceGraph, kind: &str) -> (SymbolTable, Vec<Diagnostic>) {
        let mut table = SymbolTable::new();
        let def = get_registry().get_kind(kind).unwrap();
        let diags = table.assign_kind(graph, kind, def, &graph.records_of_kind(kind));
        (table, diags)
    }

    #[test]
    fn test_collision_suffixes_follow_key_order() {
        let graph = graph(json!({
            "networks": [{"name": "prod.vpc"}, {"name": "prod-vpc"}, {"name": "prod_vpc_2"}]
        }));
        let (table, diags) = symbols_for(&graph, "network");

        let symbol = |key: &str| table.get(graph.id_of("network", key).unwrap()).unwrap().to_string();
        assert_eq!(symbol("prod-vpc"), "prod_vpc");
        assert_eq!(symbol("prod.vpc"), "prod_vpc_2");
        assert_eq!(symbol("prod_vpc_2"), "prod_vpc_2_2");
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_resolve_local_and_external() {
        let graph = graph(json!({
            "networks": [{"name": "prod-vpc"}]
        }));
        let (table, _) = symbols_for(&graph, "network");
        let resolver = Resolver::new(&graph, get_registry(), &table);

        let local = resolver.resolve(
            "https://www.googleapis.com/compute/v1/projects/demo/global/networks/prod-vpc",
            "network",
            "id",
        );
        assert_eq!(
            local,
            ResolvedReference::Local("google_compute_network.prod_vpc.id".to_string())
        );
        assert_eq!(local.to_expr().render(), "google_compute_network.prod_vpc.id");

        let external = resolver.resolve("projects/host/global/networks/shared", "network", "id");
        assert!(!external.is_local());
        assert_eq!(external.to_expr().render(), "\"projects/host/global/networks/shared\"");

        // same terminal segment, wrong kind
        let wrong_kind = resolver.resolve("prod-vpc", "subnet", "id");
        assert!(matches!(
            wrong_kind,
            ResolvedReference::External { reason: Unresolved::NotFound, .. }
        ));
    }

    #[test]
    fn test_unemitted_referent_stays_literal() {
        let graph = graph(json!({"networks": [{"name": "prod-vpc"}]}));
        let table = SymbolTable::new();
        let resolver = Resolver::new(&graph, get_registry(), &table);

        assert!(matches!(
            resolver.resolve("prod-vpc", "network", "id"),
            ResolvedReference::External { reason: Unresolved::NotEmitted, .. }
        ));
    }
}
