//! Identifier Sanitizer
//!
//! Maps arbitrary names and paths into Terraform identifiers. Uniqueness is
//! not guaranteed here; the symbol table resolves collisions.

/// Map `raw` to a legal identifier: every character other than an ASCII
/// letter, digit or `_` becomes `_`, and a leading digit gets a `_` prefix.
/// Never empty, and `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Whether a sanitized name carries no information (`_`, `___`)
pub fn is_placeholder_worthy(identifier: &str) -> bool {
    identifier.chars().all(|c| c == '_')
}

/// Sanitized name of a record, falling back to `<kind>_<index>` when nothing
/// meaningful survives sanitization
pub fn symbol_for(raw: &str, kind: &str, index: usize) -> String {
    let symbol = sanitize(raw);
    if is_placeholder_worthy(&symbol) {
        sanitize(&format!("{}_{}", kind, index))
    } else {
        symbol
    }
}
