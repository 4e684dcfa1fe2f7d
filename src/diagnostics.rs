//! Diagnostics raised while building the graph and compiling it.
//!
//! None of these abort a run. Each one is attached to the compile output and
//! logged; records carrying a skipping diagnostic are left out of the emitted
//! configuration.

use std::fmt;
use thiserror::Error;

/// How loudly a diagnostic is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Per-record diagnostic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("{kind} '{key}': malformed record ({reason}); skipped")]
    MalformedRecord {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("{kind} '{key}': required attribute '{attr}' is missing; emitted an empty value")]
    MissingRequired {
        kind: String,
        key: String,
        attr: String,
    },

    #[error("{kind} '{key}': '{attr}' refers to '{reference}' which is not part of this configuration; kept as a literal")]
    ReferenceUnresolved {
        kind: String,
        key: String,
        attr: String,
        reference: String,
    },

    #[error("{kind} '{key}': '{attr}' refers to '{reference}' which matches {candidates} {target} records; kept as a literal")]
    AmbiguousReference {
        kind: String,
        key: String,
        attr: String,
        reference: String,
        target: String,
        candidates: usize,
    },

    #[error("{kind} '{key}': symbol '{symbol}' already used by '{first}'; renamed to '{renamed}'")]
    IdentifierCollision {
        kind: String,
        key: String,
        symbol: String,
        renamed: String,
        first: String,
    },

    #[error("{count} record(s) of unknown kind '{kind}' skipped")]
    UnknownKind { kind: String, count: usize },

    #[error("{count} {kind} record(s) left out: {capability} is not enabled")]
    CapabilityDisabled {
        kind: String,
        capability: String,
        count: usize,
    },

    #[error("{kind} '{key}': collected more than once; the last copy wins")]
    DuplicateRecord { kind: String, key: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::ReferenceUnresolved { .. } | Diagnostic::CapabilityDisabled { .. } => {
                Severity::Info
            }
            _ => Severity::Warning,
        }
    }

    /// Whether the diagnostic means records were left out of the output
    pub fn skips_record(&self) -> bool {
        matches!(
            self,
            Diagnostic::MalformedRecord { .. } | Diagnostic::UnknownKind { .. }
        )
    }
}

/// Failure while executing a field plan against one record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("attribute '{attr}' should be {expected}, found {found}")]
    UnexpectedShape {
        attr: String,
        expected: &'static str,
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        let unresolved = Diagnostic::ReferenceUnresolved {
            kind: "subnet".into(),
            key: "us-east1/web".into(),
            attr: "network".into(),
            reference: "projects/host/global/networks/shared".into(),
        };
        assert_eq!(unresolved.severity(), Severity::Info);
        assert!(!unresolved.skips_record());

        let unknown = Diagnostic::UnknownKind {
            kind: "bigquery_datasets".into(),
            count: 3,
        };
        assert_eq!(unknown.severity(), Severity::Warning);
        assert!(unknown.skips_record());
    }

    #[test]
    fn test_messages_name_the_record() {
        let diag = Diagnostic::MalformedRecord {
            kind: "firewall-rule".into(),
            key: "allow-web".into(),
            reason: "attribute 'allowed' should be a list of records, found a scalar".into(),
        };
        let text = diag.to_string();
        assert!(text.contains("firewall-rule"));
        assert!(text.contains("allow-web"));
        assert!(text.contains("skipped"));
    }
}
