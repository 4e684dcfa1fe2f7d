//! Field plans
//!
//! A field plan is the ordered list of emission rules for one resource kind.
//! Plans are declared in the embedded JSON registry and deserialized into the
//! closed [`FieldRule`] enum, so the emitter matches every rule exhaustively.

use super::value::{lookup, lookup_text, segment_after, terminal_segment, AttrValue, Attributes};
use serde::Deserialize;
use serde_json::Value;

fn default_reference_field() -> String {
    "id".to_string()
}

/// One emission rule
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    /// Always emitted; a missing value falls back to `default` or to `""` with a warning
    Required {
        attr: String,
        target: String,
        #[serde(default)]
        format: Format,
        #[serde(default)]
        default: Option<Value>,
    },
    /// Emitted only when present and non-default
    Optional {
        attr: String,
        target: String,
        #[serde(default)]
        format: Format,
    },
    /// Resolved against the graph; local targets render as symbolic expressions
    Reference {
        attr: String,
        target: String,
        kind: String,
        #[serde(default = "default_reference_field")]
        field: String,
        #[serde(default)]
        required: bool,
    },
    /// List of references, each resolved independently
    ReferenceList {
        attr: String,
        target: String,
        kind: String,
        #[serde(default = "default_reference_field")]
        field: String,
    },
    /// List of nested records, one block per element in input order
    RepeatedBlock {
        attr: String,
        block: String,
        plan: Vec<FieldRule>,
    },
    /// Single nested object with its own attribute scope
    NestedBlock {
        attr: String,
        block: String,
        #[serde(default)]
        when: Option<Predicate>,
        plan: Vec<FieldRule>,
    },
    /// Mutually exclusive shapes; the first matching case wins
    ConditionalGroup { cases: Vec<GroupCase> },
    /// Constant attribute
    Literal { target: String, value: Value },
    /// Input variable supplied by the compile context (`var.<var>`)
    Context { target: String, var: String },
    /// Sensitive value never copied from the inventory
    Secret { target: String },
}

/// One shape of a conditional group
#[derive(Debug, Clone, Deserialize)]
pub struct GroupCase {
    pub when: Predicate,
    /// Nested block name; inline when absent
    #[serde(default)]
    pub block: Option<String>,
    pub plan: Vec<FieldRule>,
}

/// Condition over a record's attributes
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum Predicate {
    /// Set and non-default
    Present { attr: String },
    /// Set, possibly to an empty object or `false`
    Exists { attr: String },
    Equals { attr: String, values: Vec<String> },
    StartsWith { attr: String, prefix: String },
    Contains { attr: String, needle: String },
    Not { of: Box<Predicate> },
    Always,
}

impl Predicate {
    pub fn matches(&self, attrs: &Attributes) -> bool {
        match self {
            Predicate::Present { attr } => lookup(attrs, attr).is_some_and(|v| !v.is_absent()),
            Predicate::Exists { attr } => {
                lookup(attrs, attr).is_some_and(|v| !matches!(v, AttrValue::Null))
            }
            Predicate::Equals { attr, values } => lookup_text(attrs, attr)
                .is_some_and(|text| values.iter().any(|v| *v == text)),
            Predicate::StartsWith { attr, prefix } => {
                lookup_text(attrs, attr).is_some_and(|text| text.starts_with(prefix.as_str()))
            }
            Predicate::Contains { attr, needle } => {
                lookup_text(attrs, attr).is_some_and(|text| text.contains(needle.as_str()))
            }
            Predicate::Not { of } => !of.matches(attrs),
            Predicate::Always => true,
        }
    }
}

/// How a value is shaped when rendered
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Strings quoted, numbers and bools bare, lists and maps as literals
    #[default]
    Auto,
    /// Terminal path segment
    Basename,
    /// Text before `@`
    LocalPart,
    /// Coerce to a bare number
    Number,
    /// Coerce to a bare bool
    Bool,
    /// Path component following the given label
    SegmentAfter(String),
}

impl Format {
    /// Apply a text-shaping format; `None` when the text cannot take the shape
    pub fn apply_text(&self, text: &str) -> Option<String> {
        match self {
            Format::Basename => Some(terminal_segment(text).to_string()),
            Format::LocalPart => Some(text.split('@').next().unwrap_or(text).to_string()),
            Format::SegmentAfter(label) => segment_after(text, label).map(str::to_string),
            Format::Auto | Format::Number | Format::Bool => Some(text.to_string()),
        }
    }
}

/// One component of a natural key or symbolic name
#[derive(Debug, Clone, Deserialize)]
pub struct NamePart {
    pub attr: String,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub fallback: Option<Box<NamePart>>,
}

impl NamePart {
    pub fn extract(&self, attrs: &Attributes) -> Option<String> {
        lookup_text(attrs, &self.attr)
            .and_then(|text| self.format.apply_text(&text))
            .filter(|text| !text.is_empty())
            .or_else(|| self.fallback.as_ref().and_then(|f| f.extract(attrs)))
    }
}
