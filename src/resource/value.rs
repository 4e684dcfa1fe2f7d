//! Normalized attribute values
//!
//! Provider records arrive as loosely-typed JSON. They are normalized once into
//! [`AttrValue`] so field plans match on a closed set of shapes instead of
//! poking at arbitrary JSON.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute name -> value, ordered by name
pub type Attributes = BTreeMap<String, AttrValue>;

/// Path prefixes GCP uses for relative resource names
const PATH_ROOTS: &[&str] = &[
    "projects/",
    "organizations/",
    "folders/",
    "tagKeys/",
    "tagValues/",
    "billingAccounts/",
];

/// A single scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    /// Integers above `i64::MAX` (64-bit ids)
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Empty strings and `false` are the implicit defaults of the target language
    pub fn is_default(&self) -> bool {
        match self {
            Scalar::Str(s) => s.is_empty(),
            Scalar::Bool(b) => !b,
            Scalar::Int(_) | Scalar::UInt(_) | Scalar::Float(_) => false,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Str(s.clone())),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(if let Some(i) = n.as_i64() {
                Scalar::Int(i)
            } else if let Some(u) = n.as_u64() {
                Scalar::UInt(u)
            } else {
                Scalar::Float(n.as_f64().unwrap_or_default())
            }),
            Value::Null => None,
            // Nested structures inside scalar lists are kept as their JSON text
            other => Some(Scalar::Str(other.to_string())),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A normalized attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Scalar(Scalar),
    /// A string naming another resource by path or URL
    Reference(String),
    List(Vec<Scalar>),
    /// A list of nested records (sub-blocks)
    Records(Vec<Attributes>),
    /// A single nested record or a string map such as labels
    Map(Attributes),
}

impl AttrValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::String(s) if looks_like_resource_path(s) => AttrValue::Reference(s.clone()),
            Value::Object(map) => AttrValue::Map(normalize_map(map)),
            Value::Array(items) => {
                if !items.is_empty() && items.iter().all(Value::is_object) {
                    AttrValue::Records(
                        items
                            .iter()
                            .filter_map(|item| item.as_object().map(normalize_map))
                            .collect(),
                    )
                } else {
                    AttrValue::List(items.iter().filter_map(Scalar::from_json).collect())
                }
            }
            other => Scalar::from_json(other)
                .map(AttrValue::Scalar)
                .unwrap_or(AttrValue::Null),
        }
    }

    /// Whether the value counts as "not set" for optional emission
    pub fn is_absent(&self) -> bool {
        match self {
            AttrValue::Null => true,
            AttrValue::Scalar(s) => s.is_default(),
            AttrValue::Reference(s) => s.is_empty(),
            AttrValue::List(items) => items.is_empty(),
            AttrValue::Records(items) => items.is_empty(),
            AttrValue::Map(map) => map.is_empty(),
        }
    }

    /// Text form of scalar-like values
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttrValue::Scalar(s) => Some(s.to_string()),
            AttrValue::Reference(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Human-readable shape name used in diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Scalar(_) => "a scalar",
            AttrValue::Reference(_) => "a reference",
            AttrValue::List(_) => "a list",
            AttrValue::Records(_) => "a list of records",
            AttrValue::Map(_) => "an object",
        }
    }
}

fn normalize_map(map: &serde_json::Map<String, Value>) -> Attributes {
    map.iter()
        .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
        .collect()
}

/// Normalize one raw record; only JSON objects are records
pub fn normalize_record(value: &Value) -> Option<Attributes> {
    value.as_object().map(normalize_map)
}

/// Look up a value using a dot-notation path (`routingConfig.routingMode`)
pub fn lookup<'a>(attrs: &'a Attributes, path: &str) -> Option<&'a AttrValue> {
    let mut parts = path.split('.');
    let mut current = attrs.get(parts.next()?)?;

    for part in parts {
        current = match current {
            AttrValue::Map(inner) => inner.get(part)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Text of the value at `path`, if it is scalar-like
pub fn lookup_text(attrs: &Attributes, path: &str) -> Option<String> {
    lookup(attrs, path).and_then(AttrValue::as_text)
}

/// Whether a string names a resource (full API URL or relative resource name)
pub fn looks_like_resource_path(s: &str) -> bool {
    if s.starts_with("https://") {
        return s.contains(".googleapis.com/");
    }
    PATH_ROOTS.iter().any(|root| s.starts_with(root) && s.len() > root.len())
}

/// Terminal path segment
/// e.g., "https://www.googleapis.com/compute/v1/projects/p/global/networks/prod-vpc" -> "prod-vpc"
pub fn terminal_segment(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Strip scheme, host and API version from a resource URL so that full URLs and
/// relative names of the same resource compare equal
pub fn canonical_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if !trimmed.starts_with("https://") {
        return trimmed;
    }
    for root in PATH_ROOTS {
        let marker = format!("/{}", root);
        if let Some(idx) = trimmed.find(&marker) {
            return &trimmed[idx + 1..];
        }
    }
    trimmed
}

/// Path component following `label`
/// e.g., ("projects/p/locations/us-east1/functions/f", "locations") -> "us-east1"
pub fn segment_after<'a>(path: &'a str, label: &str) -> Option<&'a str> {
    let mut parts = canonical_path(path).split('/');
    while let Some(part) = parts.next() {
        if part == label {
            return parts.next().filter(|s| !s.is_empty());
        }
    }
    None
}
