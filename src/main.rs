use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gcp2tf::compiler::{CompileContext, CompileOutput, Compiler};
use gcp2tf::config::Config;
use gcp2tf::gcp::client::GcpClient;
use gcp2tf::gcp::http::format_gcp_error;
use gcp2tf::inventory::capability::{self, CapabilityFilter};
use gcp2tf::inventory::collector::Collector;
use gcp2tf::inventory::Inventory;
use gcp2tf::output::write_output;
use gcp2tf::resource::{get_all_kind_keys, get_registry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Inventory a GCP project or organization and compile it into Terraform
#[derive(Parser, Debug)]
#[command(name = "gcp2tf", version, about, long_about = None)]
struct Args {
    /// GCP project to inventory
    #[arg(short, long)]
    project: Option<String>,

    /// GCP organization ID to inventory
    #[arg(short = 'O', long)]
    organization: Option<String>,

    /// Compile an inventory snapshot (JSON or YAML) instead of collecting
    #[arg(short, long)]
    inventory: Option<PathBuf>,

    /// Output directory (default: ./<project or organization>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only these kinds, comma separated (e.g. network,subnet)
    #[arg(short, long, value_delimiter = ',')]
    kinds: Vec<String>,

    /// Default region for the generated variables
    #[arg(long)]
    region: Option<String>,

    /// Do not write the inventory snapshot next to the units
    #[arg(long)]
    no_save_inventory: bool,

    /// Exit with an error when any record was skipped
    #[arg(long)]
    strict: bool,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Log to a file under the config directory instead of stderr
    #[arg(long)]
    log_file: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn setup_logging(level: LogLevel, to_file: bool) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let (writer, guard) = if to_file {
        let path = get_log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(!to_file)
        .with_target(to_file)
        .init();

    Ok(guard)
}

fn get_log_path() -> PathBuf {
    Config::log_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".gcp2tf")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gcp2tf.log")
}

/// Kinds requested on the command line minus the disabled ones;
/// `None` means everything
fn kind_selection(requested: &[String], disabled: &BTreeSet<String>) -> Result<Option<BTreeSet<String>>> {
    if requested.is_empty() && disabled.is_empty() {
        return Ok(None);
    }

    let registry = get_registry();
    let canonical = |name: &str| -> Result<String> {
        registry
            .canonical_kind(name.trim())
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "Unknown kind '{}'. Known kinds: {}",
                    name,
                    get_all_kind_keys().join(", ")
                )
            })
    };

    let mut kinds: BTreeSet<String> = if requested.is_empty() {
        get_all_kind_keys().into_iter().map(str::to_string).collect()
    } else {
        requested
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| canonical(k.as_str()))
            .collect::<Result<_>>()?
    };
    for name in disabled {
        kinds.remove(&canonical(name.as_str())?);
    }

    Ok(Some(kinds))
}

async fn collect(
    project_id: Option<&str>,
    organization_id: Option<&str>,
    kinds: Option<&BTreeSet<String>>,
) -> Result<(Inventory, CapabilityFilter)> {
    if project_id.is_none() && organization_id.is_none() {
        anyhow::bail!(
            "No project or organization. Pass --project or --organization, \
             set one in the config file, or configure gcloud"
        );
    }

    let client = GcpClient::new().await?;

    let capabilities = match project_id {
        Some(project) => capability::detect(&client, project).await,
        None => CapabilityFilter::unknown(),
    };

    let mut collector = Collector::new(&client, get_registry())
        .project(project_id.map(str::to_string))
        .organization(organization_id.map(str::to_string))
        .capabilities(capabilities.clone());
    if let Some(kinds) = kinds {
        collector = collector.kinds(kinds.clone());
    }

    let report = collector.collect().await;
    for (kind, error) in &report.failures {
        eprintln!("warning: could not collect {}: {}", kind, format_gcp_error(&anyhow::anyhow!(error.clone())));
    }

    Ok((report.inventory, capabilities))
}

fn print_summary(output: &CompileOutput, dir: &Path) {
    println!("Wrote {} resource block(s) to {}", output.emitted, dir.display());
    for unit in &output.units {
        println!("  {:<24} {:>4}", unit.name, unit.blocks);
    }

    let warnings: Vec<_> = output.warnings().collect();
    if !warnings.is_empty() {
        println!("\n{} warning(s):", warnings.len());
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    if output.skipped() > 0 {
        println!("\n{} record(s) skipped", output.skipped());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_file)?;

    let mut config = Config::load();
    let kinds = kind_selection(&args.kinds, &config.disabled_kinds)?;

    let (inventory, capabilities) = match &args.inventory {
        Some(path) => {
            tracing::info!("Compiling snapshot {}", path.display());
            (Inventory::load(path)?, CapabilityFilter::unknown())
        }
        None => {
            let organization_id = config.effective_organization(args.organization.as_deref());
            // organization mode only looks at a project when one is asked for
            let project_id = match (&args.project, &organization_id) {
                (None, Some(_)) => None,
                _ => config.effective_project(args.project.as_deref()),
            };
            collect(project_id.as_deref(), organization_id.as_deref(), kinds.as_ref()).await?
        }
    };

    let project_id = args
        .project
        .clone()
        .or_else(|| inventory.project_id.clone());
    let organization_id = args
        .organization
        .as_deref()
        .map(|o| o.trim_start_matches("organizations/").to_string())
        .or_else(|| inventory.organization_id.clone());

    let context = CompileContext {
        project_id: project_id.clone(),
        organization_id: organization_id.clone(),
        region: config.effective_region(args.region.as_deref()),
        zone: config.effective_zone(),
        provider_version: config.effective_provider_version(),
    };

    let registry = get_registry();
    let graph = inventory.build_graph(registry);
    tracing::info!("Graph holds {} record(s)", graph.len());

    let mut compiler = Compiler::new(context).with_capabilities(capabilities);
    if let Some(kinds) = kinds {
        compiler = compiler.with_kinds(kinds);
    }
    let output = compiler.compile(&graph);

    let name = project_id
        .as_deref()
        .or(organization_id.as_deref())
        .unwrap_or("terraform");
    let dir = config.effective_output_dir(args.output.clone(), name);
    let save_inventory = args.inventory.is_none() && config.effective_save_inventory(args.no_save_inventory);
    write_output(&dir, &output, &inventory, save_inventory)?;

    print_summary(&output, &dir);

    if args.inventory.is_none() {
        if let Err(e) = config.remember(project_id.as_deref(), organization_id.as_deref()) {
            tracing::warn!("Could not save config: {:#}", e);
        }
    }

    if args.strict && output.skipped() > 0 {
        anyhow::bail!("{} record(s) were skipped (--strict)", output.skipped());
    }

    Ok(())
}
