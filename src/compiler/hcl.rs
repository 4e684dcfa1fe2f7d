//! Minimal HCL document model
//!
//! Blocks are built as data and rendered in one place, so indentation,
//! alignment and string escaping are decided once for every resource kind.

use std::fmt::Write as _;

const INDENT: &str = "  ";

/// Right-hand side of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Quoted string literal
    Str(String),
    /// Emitted verbatim: numbers, bools, symbolic references, `var.x`
    Raw(String),
    List(Vec<Expr>),
    /// Inline object literal, keys in insertion order
    Object(Vec<(String, Expr)>),
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn raw(value: impl Into<String>) -> Self {
        Expr::Raw(value.into())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Expr::Str(s) => out.push_str(&quote(s)),
            Expr::Raw(s) => out.push_str(s),
            Expr::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render_into(out);
                }
                out.push(']');
            }
            Expr::Object(entries) if entries.is_empty() => out.push_str("{}"),
            Expr::Object(entries) => {
                out.push_str("{ ");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if is_bare_key(key) {
                        out.push_str(key);
                    } else {
                        out.push_str(&quote(key));
                    }
                    out.push_str(" = ");
                    value.render_into(out);
                }
                out.push_str(" }");
            }
        }
    }
}

/// One body entry
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Attribute {
        key: String,
        value: Expr,
        comment: Option<String>,
    },
    Block(Block),
}

/// `ident "label" ... { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub ident: String,
    pub labels: Vec<String>,
    pub body: Vec<Item>,
}

impl Block {
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            labels: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn attr(&mut self, key: impl Into<String>, value: Expr) {
        self.body.push(Item::Attribute {
            key: key.into(),
            value,
            comment: None,
        });
    }

    pub fn attr_with_comment(&mut self, key: impl Into<String>, value: Expr, comment: impl Into<String>) {
        self.body.push(Item::Attribute {
            key: key.into(),
            value,
            comment: Some(comment.into()),
        });
    }

    pub fn block(&mut self, block: Block) {
        self.body.push(Item::Block(block));
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Render as top-level text, newline-terminated
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        push_indent(out, depth);
        out.push_str(&self.ident);
        for label in &self.labels {
            out.push(' ');
            out.push_str(&quote(label));
        }
        out.push_str(" {\n");
        render_body(&self.body, out, depth + 1);
        push_indent(out, depth);
        out.push_str("}\n");
    }
}

fn render_body(items: &[Item], out: &mut String, depth: usize) {
    let mut i = 0;
    while i < items.len() {
        match &items[i] {
            Item::Block(block) => {
                if i > 0 {
                    out.push('\n');
                }
                block.render_into(out, depth);
                if matches!(items.get(i + 1), Some(Item::Attribute { .. })) {
                    out.push('\n');
                }
                i += 1;
            }
            Item::Attribute { .. } => {
                let run_end = items[i..]
                    .iter()
                    .position(|item| matches!(item, Item::Block(_)))
                    .map_or(items.len(), |offset| i + offset);
                let width = items[i..run_end]
                    .iter()
                    .filter_map(|item| match item {
                        Item::Attribute { key, .. } => Some(key.len()),
                        Item::Block(_) => None,
                    })
                    .max()
                    .unwrap_or(0);

                for item in &items[i..run_end] {
                    if let Item::Attribute { key, value, comment } = item {
                        push_indent(out, depth);
                        let _ = write!(out, "{:<width$} = {}", key, value.render(), width = width);
                        if let Some(comment) = comment {
                            out.push_str(" # ");
                            out.push_str(comment);
                        }
                        out.push('\n');
                    }
                }
                i = run_end;
            }
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Whether `s` can be written as a bare HCL identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Words that change the meaning of an object literal when written bare
const KEYWORDS: &[&str] = &["for", "in", "if", "true", "false", "null"];

/// Whether an object key can be written without quotes
pub fn is_bare_key(s: &str) -> bool {
    is_identifier(s) && !KEYWORDS.contains(&s)
}

/// Quote `s` as an HCL string literal. Quotes, backslashes and control
/// characters are escaped, and `${` / `%{` are doubled so that source text is
/// never interpreted as a template.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }

    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("C:\\temp"), "\"C:\\\\temp\"");
        assert_eq!(quote("a\nb"), "\"a\\nb\"");
        assert_eq!(quote("${var.x}"), "\"$${var.x}\"");
        assert_eq!(quote("%{ if }"), "\"%%{ if }\"");
        assert_eq!(quote("cost $5"), "\"cost $5\"");
        assert_eq!(quote("bell\u{7}"), "\"bell\\u0007\"");
    }

    #[test]
    fn test_alignment_and_nesting() {
        let mut allow = Block::new("allow");
        allow.attr("protocol", Expr::str("tcp"));
        allow.attr("ports", Expr::List(vec![Expr::str("80"), Expr::str("443")]));

        let mut resource = Block::new("resource")
            .with_label("google_compute_firewall")
            .with_label("web");
        resource.attr("name", Expr::str("web"));
        resource.attr("network", Expr::raw("google_compute_network.prod_vpc.id"));
        resource.block(allow);
        resource.attr("priority", Expr::raw("1000"));

        let expected = "\
resource \"google_compute_firewall\" \"web\" {
  name    = \"web\"
  network = google_compute_network.prod_vpc.id

  allow {
    protocol = \"tcp\"
    ports    = [\"80\", \"443\"]
  }

  priority = 1000
}
";
        assert_eq!(resource.render(), expected);
    }

    #[test]
    fn test_object_keys() {
        let labels = Expr::Object(vec![
            ("env".to_string(), Expr::str("prod")),
            ("app.kubernetes.io/name".to_string(), Expr::str("web")),
        ]);
        assert_eq!(
            labels.render(),
            "{ env = \"prod\", \"app.kubernetes.io/name\" = \"web\" }"
        );
        assert_eq!(Expr::Object(vec![]).render(), "{}");
    }

    #[test]
    fn test_keyword_object_keys_are_quoted() {
        let labels = Expr::Object(vec![
            ("for".to_string(), Expr::str("x")),
            ("null".to_string(), Expr::str("y")),
            ("format".to_string(), Expr::str("z")),
        ]);
        assert_eq!(
            labels.render(),
            "{ \"for\" = \"x\", \"null\" = \"y\", format = \"z\" }"
        );
    }

    #[test]
    fn test_comment() {
        let mut block = Block::new("resource").with_label("t").with_label("x");
        block.attr_with_comment("shared_secret", Expr::str("REDACTED"), "set me");
        assert!(block.render().contains("shared_secret = \"REDACTED\" # set me\n"));
    }
}
