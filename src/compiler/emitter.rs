//! Block Emitter
//!
//! Executes a kind's field plan against one record and builds its
//! `resource` block. Data problems that can be papered over (a missing
//! required value, an unresolved reference) become diagnostics; a value of
//! the wrong shape fails the whole record with [`EmitError`].

use super::hcl::{Block, Expr};
use super::resolver::{ResolvedReference, Resolver, Unresolved};
use crate::diagnostics::{Diagnostic, EmitError};
use crate::resource::plan::{FieldRule, Format};
use crate::resource::value::{lookup, AttrValue, Attributes, Scalar};
use crate::resource::{KindDef, ResourceRecord};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

const REDACTED: &str = "REDACTED";
const REDACTED_NOTE: &str = "set from a secure variable before applying";

/// One emitted resource block and what it needed
#[derive(Debug, Clone)]
pub struct Emitted {
    pub block: Block,
    pub diagnostics: Vec<Diagnostic>,
    /// Context variables referenced (`var.<name>`)
    pub variables: BTreeSet<String>,
}

/// Stateless over records; holds the read-only resolver
pub struct Emitter<'a> {
    resolver: &'a Resolver<'a>,
}

impl<'a> Emitter<'a> {
    pub fn new(resolver: &'a Resolver<'a>) -> Self {
        Self { resolver }
    }

    /// Emit `resource "<type>" "<symbol>" { ... }` for one record
    pub fn emit(
        &self,
        def: &KindDef,
        record: &ResourceRecord,
        symbol: &str,
    ) -> Result<Emitted, EmitError> {
        let mut run = PlanRun {
            resolver: self.resolver,
            record,
            diagnostics: Vec::new(),
            variables: BTreeSet::new(),
        };

        let mut block = Block::new("resource")
            .with_label(def.resource_type.clone())
            .with_label(symbol);
        run.apply(&def.plan, &record.attributes, "", &mut block)?;

        Ok(Emitted {
            block,
            diagnostics: run.diagnostics,
            variables: run.variables,
        })
    }
}

/// State of one plan execution
struct PlanRun<'r, 'a> {
    resolver: &'r Resolver<'a>,
    record: &'r ResourceRecord,
    diagnostics: Vec<Diagnostic>,
    variables: BTreeSet<String>,
}

impl PlanRun<'_, '_> {
    fn apply(
        &mut self,
        rules: &[FieldRule],
        scope: &Attributes,
        prefix: &str,
        body: &mut Block,
    ) -> Result<(), EmitError> {
        for rule in rules {
            match rule {
                FieldRule::Required {
                    attr,
                    target,
                    format,
                    default,
                } => {
                    let path = qualify(prefix, attr);
                    match lookup(scope, attr).filter(|v| !is_missing(v)) {
                        Some(value) => body.attr(target, render(value, format, &path)?),
                        None => match default {
                            Some(default) => {
                                body.attr(target, render(&AttrValue::from_json(default), format, &path)?)
                            }
                            None => {
                                self.missing_required(&path);
                                body.attr(target, Expr::str(""));
                            }
                        },
                    }
                }

                FieldRule::Optional {
                    attr,
                    target,
                    format,
                } => {
                    if let Some(value) = lookup(scope, attr).filter(|v| !v.is_absent()) {
                        body.attr(target, render(value, format, &qualify(prefix, attr))?);
                    }
                }

                FieldRule::Reference {
                    attr,
                    target,
                    kind,
                    field,
                    required,
                } => {
                    let path = qualify(prefix, attr);
                    match lookup(scope, attr).filter(|v| !is_missing(v)) {
                        Some(value) => {
                            let raw = reference_text(value, &path)?;
                            let resolved = self.resolve(&raw, kind, field, &path);
                            body.attr(target, resolved);
                        }
                        None if *required => {
                            self.missing_required(&path);
                            body.attr(target, Expr::str(""));
                        }
                        None => {}
                    }
                }

                FieldRule::ReferenceList {
                    attr,
                    target,
                    kind,
                    field,
                } => {
                    let path = qualify(prefix, attr);
                    let raws: Vec<String> = match lookup(scope, attr) {
                        None => continue,
                        Some(value) if value.is_absent() => continue,
                        Some(AttrValue::List(items)) => items.iter().map(Scalar::to_string).collect(),
                        Some(value) => vec![reference_text(value, &path)?],
                    };
                    let items = raws
                        .iter()
                        .map(|raw| self.resolve(raw, kind, field, &path))
                        .collect();
                    body.attr(target, Expr::List(items));
                }

                FieldRule::RepeatedBlock { attr, block, plan } => {
                    let path = qualify(prefix, attr);
                    match lookup(scope, attr) {
                        None => {}
                        Some(value) if value.is_absent() => {}
                        Some(AttrValue::Records(items)) => {
                            for (index, item) in items.iter().enumerate() {
                                let mut nested = Block::new(block.clone());
                                self.apply(plan, item, &format!("{}[{}]", path, index), &mut nested)?;
                                body.block(nested);
                            }
                        }
                        Some(other) => {
                            return Err(EmitError::UnexpectedShape {
                                attr: path,
                                expected: "a list of records",
                                found: other.shape(),
                            })
                        }
                    }
                }

                FieldRule::NestedBlock {
                    attr,
                    block,
                    when,
                    plan,
                } => {
                    if when.as_ref().is_some_and(|p| !p.matches(scope)) {
                        continue;
                    }
                    let path = qualify(prefix, attr);
                    match lookup(scope, attr) {
                        None | Some(AttrValue::Null) => {}
                        Some(AttrValue::Map(inner)) => {
                            let mut nested = Block::new(block.clone());
                            self.apply(plan, inner, &path, &mut nested)?;
                            if !nested.is_empty() {
                                body.block(nested);
                            }
                        }
                        Some(other) => {
                            return Err(EmitError::UnexpectedShape {
                                attr: path,
                                expected: "an object",
                                found: other.shape(),
                            })
                        }
                    }
                }

                FieldRule::ConditionalGroup { cases } => {
                    let Some(case) = cases.iter().find(|case| case.when.matches(scope)) else {
                        continue;
                    };
                    match &case.block {
                        Some(name) => {
                            let mut nested = Block::new(name.clone());
                            self.apply(&case.plan, scope, prefix, &mut nested)?;
                            if !nested.is_empty() {
                                body.block(nested);
                            }
                        }
                        None => self.apply(&case.plan, scope, prefix, body)?,
                    }
                }

                FieldRule::Literal { target, value } => {
                    if let Some(expr) = json_expr(value) {
                        body.attr(target, expr);
                    }
                }

                FieldRule::Context { target, var } => {
                    self.variables.insert(var.clone());
                    body.attr(target, Expr::raw(format!("var.{}", var)));
                }

                FieldRule::Secret { target } => {
                    body.attr_with_comment(target, Expr::str(REDACTED), REDACTED_NOTE);
                }
            }
        }
        Ok(())
    }

    fn resolve(&mut self, raw: &str, kind: &str, field: &str, path: &str) -> Expr {
        let resolved = self.resolver.resolve(raw, kind, field);
        match &resolved {
            ResolvedReference::Local(_) => {}
            ResolvedReference::External {
                reason: Unresolved::Ambiguous(candidates),
                ..
            } => {
                warn!(
                    "{} '{}': {} matches {} {} records, kept literal",
                    self.record.kind, self.record.natural_key, path, candidates, kind
                );
                self.diagnostics.push(Diagnostic::AmbiguousReference {
                    kind: self.record.kind.clone(),
                    key: self.record.natural_key.clone(),
                    attr: path.to_string(),
                    reference: raw.to_string(),
                    target: kind.to_string(),
                    candidates: *candidates,
                });
            }
            ResolvedReference::External { .. } => {
                debug!(
                    "{} '{}': {} = {} is external",
                    self.record.kind, self.record.natural_key, path, raw
                );
                self.diagnostics.push(Diagnostic::ReferenceUnresolved {
                    kind: self.record.kind.clone(),
                    key: self.record.natural_key.clone(),
                    attr: path.to_string(),
                    reference: raw.to_string(),
                });
            }
        }
        resolved.to_expr()
    }

    fn missing_required(&mut self, path: &str) {
        warn!(
            "{} '{}': required attribute '{}' missing",
            self.record.kind, self.record.natural_key, path
        );
        self.diagnostics.push(Diagnostic::MissingRequired {
            kind: self.record.kind.clone(),
            key: self.record.natural_key.clone(),
            attr: path.to_string(),
        });
    }
}

fn qualify(prefix: &str, attr: &str) -> String {
    if prefix.is_empty() {
        attr.to_string()
    } else {
        format!("{}.{}", prefix, attr)
    }
}

/// Missing for required emission: unset, null or the empty string
fn is_missing(value: &AttrValue) -> bool {
    match value {
        AttrValue::Null => true,
        AttrValue::Scalar(Scalar::Str(s)) | AttrValue::Reference(s) => s.is_empty(),
        _ => false,
    }
}

fn reference_text(value: &AttrValue, path: &str) -> Result<String, EmitError> {
    value.as_text().ok_or_else(|| EmitError::UnexpectedShape {
        attr: path.to_string(),
        expected: "a reference",
        found: value.shape(),
    })
}

/// Render a value in the declared format
fn render(value: &AttrValue, format: &Format, path: &str) -> Result<Expr, EmitError> {
    let shape_error = |expected: &'static str| EmitError::UnexpectedShape {
        attr: path.to_string(),
        expected,
        found: value.shape(),
    };

    match format {
        Format::Auto => auto_expr(value).ok_or_else(|| shape_error("a value")),
        Format::Number => match value {
            AttrValue::Scalar(s) => number_expr(s).ok_or_else(|| shape_error("a number")),
            _ => Err(shape_error("a number")),
        },
        Format::Bool => match value {
            AttrValue::Scalar(s) => bool_expr(s).ok_or_else(|| shape_error("a boolean")),
            _ => Err(shape_error("a boolean")),
        },
        text_format => match value {
            AttrValue::List(items) => items
                .iter()
                .map(|item| text_format.apply_text(&item.to_string()).map(Expr::Str))
                .collect::<Option<Vec<_>>>()
                .map(Expr::List)
                .ok_or_else(|| shape_error("a list of resource paths")),
            other => other
                .as_text()
                .and_then(|text| text_format.apply_text(&text))
                .map(Expr::Str)
                .ok_or_else(|| shape_error("a resource path")),
        },
    }
}

fn scalar_expr(scalar: &Scalar) -> Expr {
    match scalar {
        Scalar::Str(s) => Expr::str(s.clone()),
        other => Expr::raw(other.to_string()),
    }
}

fn auto_expr(value: &AttrValue) -> Option<Expr> {
    match value {
        AttrValue::Null | AttrValue::Records(_) => None,
        AttrValue::Scalar(s) => Some(scalar_expr(s)),
        AttrValue::Reference(s) => Some(Expr::str(s.clone())),
        AttrValue::List(items) => Some(Expr::List(items.iter().map(scalar_expr).collect())),
        AttrValue::Map(entries) => {
            let mut object = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                if matches!(value, AttrValue::Null) {
                    continue;
                }
                object.push((key.clone(), auto_expr(value)?));
            }
            Some(Expr::Object(object))
        }
    }
}

fn number_expr(scalar: &Scalar) -> Option<Expr> {
    match scalar {
        Scalar::Int(i) => Some(Expr::raw(i.to_string())),
        Scalar::UInt(u) => Some(Expr::raw(u.to_string())),
        Scalar::Float(x) => Some(Expr::raw(x.to_string())),
        Scalar::Str(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(Expr::raw(i.to_string()))
            } else if let Ok(u) = s.parse::<u64>() {
                Some(Expr::raw(u.to_string()))
            } else {
                s.parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .map(|x| Expr::raw(x.to_string()))
            }
        }
        Scalar::Bool(_) => None,
    }
}

fn bool_expr(scalar: &Scalar) -> Option<Expr> {
    match scalar {
        Scalar::Bool(b) => Some(Expr::raw(b.to_string())),
        Scalar::Str(s) if s.eq_ignore_ascii_case("true") => Some(Expr::raw("true")),
        Scalar::Str(s) if s.eq_ignore_ascii_case("false") => Some(Expr::raw("false")),
        _ => None,
    }
}

/// Constant from a plan literal; `null` emits nothing
fn json_expr(value: &Value) -> Option<Expr> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Expr::str(s.clone())),
        Value::Bool(b) => Some(Expr::raw(b.to_string())),
        Value::Number(n) => Some(Expr::raw(n.to_string())),
        Value::Array(items) => Some(Expr::List(items.iter().filter_map(json_expr).collect())),
        Value::Object(map) => Some(Expr::Object(
            map.iter()
                .filter_map(|(k, v)| json_expr(v).map(|e| (k.clone(), e)))
                .collect(),
        )),
    }
}
