//! Inventory-to-Terraform compiler
//!
//! Turns a frozen [`ResourceGraph`] into one Terraform text unit per resource
//! kind plus the provider and variable declarations.
//!
//! # Architecture
//!
//! - [`sanitize`] - Identifier sanitization
//! - [`resolver`] - Symbol table and reference resolution
//! - [`emitter`] - Field plan execution into HCL blocks
//! - [`hcl`] - HCL document model and string escaping
//! - [`units`] - Provider, variables and organization declarations
//!
//! Compilation is a pure in-memory transform: kinds are processed in registry
//! dependency order, every record failure is downgraded to a diagnostic, and
//! the same graph always produces byte-identical units.

pub mod emitter;
pub mod hcl;
pub mod resolver;
pub mod sanitize;
pub mod units;

use crate::diagnostics::{Diagnostic, Severity};
use crate::inventory::capability::CapabilityFilter;
use crate::resource::{get_registry, KindDef, RecordId, Registry, ResourceGraph};
use emitter::{Emitted, Emitter};
use resolver::{Resolver, SymbolTable};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_ZONE: &str = "us-central1-a";
pub const DEFAULT_PROVIDER_VERSION: &str = "~> 5.0";

/// Values supplied to the generated configuration as variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileContext {
    pub project_id: Option<String>,
    pub organization_id: Option<String>,
    pub region: String,
    pub zone: String,
    pub provider_version: String,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self {
            project_id: None,
            organization_id: None,
            region: DEFAULT_REGION.to_string(),
            zone: DEFAULT_ZONE.to_string(),
            provider_version: DEFAULT_PROVIDER_VERSION.to_string(),
        }
    }
}

impl CompileContext {
    /// Default value of a context variable, if known
    pub fn variable_default(&self, name: &str) -> Option<String> {
        match name {
            "project_id" => self.project_id.clone(),
            "org_id" => self.organization_id.clone(),
            "region" => Some(self.region.clone()),
            "zone" => Some(self.zone.clone()),
            _ => None,
        }
    }
}

/// One output document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    /// File name, e.g. `networks.tf`
    pub name: String,
    /// Resource kind, `None` for declaration units
    pub kind: Option<String>,
    pub text: String,
    pub blocks: usize,
}

/// Result of one compilation
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// Declaration units first, then one unit per kind in dependency order
    pub units: Vec<OutputUnit>,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of resource blocks emitted
    pub emitted: usize,
}

impl CompileOutput {
    pub fn unit(&self, name: &str) -> Option<&OutputUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Number of records left out because of data problems
    pub fn skipped(&self) -> usize {
        self.diagnostics
            .iter()
            .map(|d| match d {
                Diagnostic::MalformedRecord { .. } => 1,
                Diagnostic::UnknownKind { count, .. } => *count,
                _ => 0,
            })
            .sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }
}

/// Records of one kind selected for emission
struct KindBatch<'r> {
    kind: &'r str,
    def: &'r KindDef,
    ids: Vec<RecordId>,
}

pub struct Compiler<'r> {
    registry: &'r Registry,
    context: CompileContext,
    capabilities: CapabilityFilter,
    kinds: Option<BTreeSet<String>>,
}

impl Compiler<'static> {
    /// Compiler over the embedded registry
    pub fn new(context: CompileContext) -> Self {
        Compiler::with_registry(get_registry(), context)
    }
}

impl<'r> Compiler<'r> {
    pub fn with_registry(registry: &'r Registry, context: CompileContext) -> Self {
        Self {
            registry,
            context,
            capabilities: CapabilityFilter::unknown(),
            kinds: None,
        }
    }

    /// Only compile kinds whose capability is enabled
    pub fn with_capabilities(mut self, capabilities: CapabilityFilter) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Only compile the given kinds
    pub fn with_kinds(mut self, kinds: BTreeSet<String>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn context(&self) -> &CompileContext {
        &self.context
    }

    /// Compile the whole graph. Never fails: bad records become diagnostics.
    pub fn compile(&self, graph: &ResourceGraph) -> CompileOutput {
        let mut diagnostics: Vec<Diagnostic> = graph.diagnostics().to_vec();

        for kind in graph.kinds() {
            if self.registry.get_kind(kind).is_none() {
                let count = graph.records_of_kind(kind).len();
                warn!("No field plan for kind '{}', skipping {} record(s)", kind, count);
                diagnostics.push(Diagnostic::UnknownKind {
                    kind: kind.clone(),
                    count,
                });
            }
        }

        let mut batches = self.select(graph, &mut diagnostics);

        // Symbols are assigned only to records that emit, so a record failing
        // its plan is dropped and the remaining ones are named again.
        let (symbols, results, collisions) = loop {
            let mut symbols = SymbolTable::new();
            let mut collisions = Vec::new();
            for batch in &batches {
                collisions.extend(symbols.assign_kind(graph, batch.kind, batch.def, &batch.ids));
            }

            let resolver = Resolver::new(graph, self.registry, &symbols);
            let emitter = Emitter::new(&resolver);

            let mut results: HashMap<RecordId, Emitted> = HashMap::new();
            let mut failed: Vec<(RecordId, String)> = Vec::new();
            for batch in &batches {
                for &id in &batch.ids {
                    let symbol = symbols.get(id).unwrap_or_default();
                    match emitter.emit(batch.def, graph.record(id), symbol) {
                        Ok(emitted) => {
                            results.insert(id, emitted);
                        }
                        Err(e) => failed.push((id, e.to_string())),
                    }
                }
            }

            if failed.is_empty() {
                break (symbols, results, collisions);
            }

            for (id, reason) in failed {
                let record = graph.record(id);
                warn!(
                    "Skipping {} '{}': {}",
                    record.kind, record.natural_key, reason
                );
                diagnostics.push(Diagnostic::MalformedRecord {
                    kind: record.kind.clone(),
                    key: record.natural_key.clone(),
                    reason,
                });
                for batch in &mut batches {
                    batch.ids.retain(|other| *other != id);
                }
            }
        };
        debug!("Assigned {} symbol(s)", symbols.len());
        diagnostics.extend(collisions);

        let mut kind_units = Vec::new();
        let mut variables = BTreeSet::new();
        let mut emitted = 0;
        let mut results = results;

        for batch in &batches {
            let blocks: Vec<Emitted> = batch
                .ids
                .iter()
                .filter_map(|id| results.remove(id))
                .collect();
            if blocks.is_empty() {
                continue;
            }

            let mut text = format!("# {}\n\n", batch.def.display_name);
            let mut rendered = Vec::with_capacity(blocks.len());
            for block in blocks {
                diagnostics.extend(block.diagnostics);
                variables.extend(block.variables);
                rendered.push(block.block.render());
            }
            text.push_str(&rendered.join("\n"));

            emitted += rendered.len();
            kind_units.push(OutputUnit {
                name: batch.def.unit.clone(),
                kind: Some(batch.kind.to_string()),
                text,
                blocks: rendered.len(),
            });
        }

        let mut declarations = vec![
            units::provider_unit(&self.context),
            units::variables_unit(&self.context, &variables),
        ];
        declarations.extend(units::organization_unit(&self.context));
        declarations.append(&mut kind_units);

        let output = CompileOutput {
            units: declarations,
            diagnostics,
            emitted,
        };
        info!(
            "Compiled {} resource block(s) into {} unit(s), {} skipped",
            output.emitted,
            output.units.len(),
            output.skipped()
        );
        output
    }

    /// Kinds to emit, in dependency order, with their candidate records
    /// sorted by natural key
    fn select(&self, graph: &ResourceGraph, diagnostics: &mut Vec<Diagnostic>) -> Vec<KindBatch<'r>> {
        let mut batches = Vec::new();

        for (kind, def) in self.registry.ordered_kinds() {
            if def.source_only {
                continue;
            }
            if let Some(wanted) = &self.kinds {
                if !wanted.contains(kind) {
                    continue;
                }
            }
            if !self.capabilities.allows_kind(def) {
                let count = graph.records_of_kind(kind).len();
                if count > 0 {
                    let capability = def.capability.clone().unwrap_or_default();
                    debug!("{} not enabled, leaving out {} {} record(s)", capability, count, kind);
                    diagnostics.push(Diagnostic::CapabilityDisabled {
                        kind: kind.to_string(),
                        capability,
                        count,
                    });
                }
                continue;
            }

            let mut ids: Vec<RecordId> = graph
                .records_of_kind(kind)
                .into_iter()
                .filter(|id| {
                    let record = graph.record(*id);
                    let skip = def.skips(&record.attributes);
                    if skip {
                        debug!("Skipping provider-managed {} '{}'", kind, record.natural_key);
                    }
                    !skip
                })
                .collect();
            if ids.is_empty() {
                continue;
            }
            ids.sort_by(|a, b| graph.record(*a).natural_key.cmp(&graph.record(*b).natural_key));

            batches.push(KindBatch { kind, def, ids });
        }

        batches
    }
}
