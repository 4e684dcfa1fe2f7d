//! Output directory writer
//!
//! Writes every compiled unit, a README summarizing what was generated and
//! (optionally) the raw inventory snapshot the units were compiled from.

use crate::compiler::CompileOutput;
use crate::diagnostics::Severity;
use crate::inventory::Inventory;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const README_FILE: &str = "README.md";
pub const INVENTORY_FILE: &str = "resources.json";

/// Write units, README and snapshot into `dir`; returns the written paths
pub fn write_output(
    dir: &Path,
    output: &CompileOutput,
    inventory: &Inventory,
    save_inventory: bool,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(output.units.len() + 2);

    for unit in &output.units {
        let path = dir.join(&unit.name);
        std::fs::write(&path, &unit.text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Wrote {} ({} blocks)", path.display(), unit.blocks);
        written.push(path);
    }

    let readme = dir.join(README_FILE);
    std::fs::write(&readme, render_readme(output, inventory))
        .with_context(|| format!("Failed to write {}", readme.display()))?;
    written.push(readme);

    if save_inventory {
        let path = dir.join(INVENTORY_FILE);
        inventory.save(&path)?;
        written.push(path);
    }

    tracing::info!("Wrote {} file(s) to {}", written.len(), dir.display());
    Ok(written)
}

/// Markdown summary of a compilation
pub fn render_readme(output: &CompileOutput, inventory: &Inventory) -> String {
    let title = inventory
        .project_id
        .as_deref()
        .map(|p| format!("project {}", p))
        .or_else(|| {
            inventory
                .organization_id
                .as_deref()
                .map(|o| format!("organization {}", o))
        })
        .unwrap_or_else(|| "inventory".to_string());

    let mut md = String::new();
    let _ = writeln!(md, "# Terraform - {}\n", title);
    md.push_str("Configuration generated from a GCP inventory snapshot");
    if let Some(at) = &inventory.collected_at {
        let _ = write!(md, " collected at {}", at);
    }
    md.push_str(".\n\n");

    md.push_str("## Usage\n\n```bash\nterraform init\nterraform plan\n```\n\n");
    md.push_str(
        "Review every file before applying. Secrets are emitted as `REDACTED` \
         placeholders and must be supplied from a secure variable.\n\n",
    );

    md.push_str("## Units\n\n| File | Kind | Blocks |\n|---|---|---|\n");
    for unit in &output.units {
        let _ = writeln!(
            md,
            "| `{}` | {} | {} |",
            unit.name,
            unit.kind.as_deref().unwrap_or("-"),
            unit.blocks
        );
    }
    let _ = writeln!(md, "\n{} resource block(s) emitted.\n", output.emitted);

    let warnings: Vec<String> = output.warnings().map(ToString::to_string).collect();
    let infos = output
        .diagnostics
        .iter()
        .filter(|d| d.severity() == Severity::Info)
        .count();

    md.push_str("## Diagnostics\n\n");
    let _ = writeln!(
        md,
        "{} warning(s), {} informational, {} record(s) skipped.",
        warnings.len(),
        infos,
        output.skipped()
    );
    if !warnings.is_empty() {
        md.push('\n');
        for warning in &warnings {
            let _ = writeln!(md, "- {}", warning);
        }
    }

    md
}
