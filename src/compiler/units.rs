//! Declaration units: provider, variables and organization lookup

use super::hcl::{Block, Expr};
use super::{CompileContext, OutputUnit};
use std::collections::BTreeSet;

pub const PROVIDER_UNIT: &str = "provider.tf";
pub const VARIABLES_UNIT: &str = "variables.tf";
pub const ORGANIZATION_UNIT: &str = "organization.tf";

/// Variables declared before any others, in this order
const WELL_KNOWN: &[(&str, &str)] = &[
    ("project_id", "GCP project ID"),
    ("org_id", "GCP organization ID"),
    ("region", "Default region"),
    ("zone", "Default zone"),
];

pub(crate) fn declaration_unit(name: &str, title: &str, blocks: &[Block]) -> OutputUnit {
    let mut text = format!("# {}\n\n", title);
    text.push_str(
        &blocks
            .iter()
            .map(Block::render)
            .collect::<Vec<_>>()
            .join("\n"),
    );
    OutputUnit {
        name: name.to_string(),
        kind: None,
        text,
        blocks: blocks.len(),
    }
}

/// `terraform { required_providers }` and the `google` provider block
pub fn provider_unit(ctx: &CompileContext) -> OutputUnit {
    let mut required = Block::new("required_providers");
    required.attr(
        "google",
        Expr::Object(vec![
            ("source".to_string(), Expr::str("hashicorp/google")),
            ("version".to_string(), Expr::str(ctx.provider_version.clone())),
        ]),
    );
    let mut terraform = Block::new("terraform");
    terraform.block(required);

    let mut provider = Block::new("provider").with_label("google");
    if ctx.project_id.is_some() {
        provider.attr("project", Expr::raw("var.project_id"));
    }
    provider.attr("region", Expr::raw("var.region"));
    provider.attr("zone", Expr::raw("var.zone"));

    declaration_unit(PROVIDER_UNIT, "Provider configuration", &[terraform, provider])
}

/// Every variable the configuration uses, with defaults from the context
pub fn variables_unit(ctx: &CompileContext, used: &BTreeSet<String>) -> OutputUnit {
    let mut names: BTreeSet<&str> = used.iter().map(String::as_str).collect();
    names.insert("region");
    names.insert("zone");
    if ctx.project_id.is_some() {
        names.insert("project_id");
    }
    if ctx.organization_id.is_some() {
        names.insert("org_id");
    }

    let ordered = WELL_KNOWN
        .iter()
        .filter(|(name, _)| names.contains(name))
        .map(|(name, description)| (*name, Some(*description)))
        .chain(
            names
                .iter()
                .filter(|name| !WELL_KNOWN.iter().any(|(known, _)| known == *name))
                .map(|name| (*name, None)),
        );

    let blocks: Vec<Block> = ordered
        .map(|(name, description)| {
            let mut block = Block::new("variable").with_label(name);
            if let Some(description) = description {
                block.attr("description", Expr::str(description));
            }
            block.attr("type", Expr::raw("string"));
            if let Some(default) = ctx.variable_default(name) {
                block.attr("default", Expr::str(default));
            }
            block
        })
        .collect();

    declaration_unit(VARIABLES_UNIT, "Input variables", &blocks)
}

/// `data "google_organization"` in organization mode
pub fn organization_unit(ctx: &CompileContext) -> Option<OutputUnit> {
    ctx.organization_id.as_ref()?;

    let mut org = Block::new("data")
        .with_label("google_organization")
        .with_label("org");
    org.attr("organization", Expr::raw("\"organizations/${var.org_id}\""));

    Some(declaration_unit(ORGANIZATION_UNIT, "Organization", &[org]))
}
