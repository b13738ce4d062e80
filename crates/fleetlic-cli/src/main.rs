//! Fleetlic CLI
//!
//! Runs license simulations against a fleet snapshot:
//! - `simulate`: old/new/delta per product for one attribute change
//! - `metrics`: list metric definitions per family
//! - `types`: print the equipment type forest
//! - `check`: load and validate a snapshot

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use fleetlic_engine::registry::parse_family;
use fleetlic_engine::{MetricRegistry, RequestContext, SimulationRequest, Simulator};
use fleetlic_model::{MetricFamily, TypeForest};
use fleetlic_store::{MemoryGraph, StoreConfig};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod output;

#[derive(Parser)]
#[command(name = "fleetlic")]
#[command(author, version, about = "Fleetlic: software license what-if simulation")]
struct Cli {
    /// Store configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fleet snapshot; overrides the configured path
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Scope to query (repeatable); defaults to the configured scopes
    #[arg(long = "scope", global = true)]
    scopes: Vec<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate an attribute change on one equipment instance
    Simulate {
        /// Simulation request (JSON), or `-` for stdin
        #[arg(long)]
        request: PathBuf,

        /// Abort when the computation runs longer than this
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// List metric definitions
    Metrics {
        /// Only this family (tag or OPS/NUP/IPS/SPS)
        #[arg(long)]
        family: Option<String>,
    },

    /// Print the equipment type forest
    Types,

    /// Load the snapshot and report what it contains
    Check,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Table,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.snapshot)?;
    let graph = MemoryGraph::open(config.clone())
        .with_context(|| format!("loading snapshot {}", config.snapshot_path.display()))?;
    let ctx = RequestContext::new(cli.scopes);

    match cli.command {
        Commands::Simulate {
            request,
            timeout_ms,
            format,
        } => cmd_simulate(&graph, ctx, &request, timeout_ms, format),
        Commands::Metrics { family } => cmd_metrics(&graph, &ctx, family.as_deref()),
        Commands::Types => cmd_types(&graph, &ctx),
        Commands::Check => cmd_check(&graph),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, snapshot: Option<PathBuf>) -> Result<StoreConfig> {
    let mut config = match path {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(snapshot) = snapshot {
        config.snapshot_path = snapshot;
    }
    Ok(config)
}

fn read_request(path: &Path) -> Result<SimulationRequest> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&text).context("parsing simulation request")
}

fn cmd_simulate(
    graph: &MemoryGraph,
    mut ctx: RequestContext,
    request: &Path,
    timeout_ms: Option<u64>,
    format: Format,
) -> Result<()> {
    let request = read_request(request)?;
    if let Some(ms) = timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }

    let response = Simulator::new(graph).simulate(&ctx, &request).map_err(|err| {
        anyhow!(
            "simulation of {} {} failed ({:?}): {err}",
            request.equip_type,
            request.equip_id,
            err.kind()
        )
    })?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        Format::Table => {
            if response.is_empty() {
                eprintln!("{} no products affected", "note".yellow().bold());
            } else {
                print!("{}", output::license_table(&response));
            }
        }
    }
    Ok(())
}

fn cmd_metrics(graph: &MemoryGraph, ctx: &RequestContext, family: Option<&str>) -> Result<()> {
    let families = match family {
        Some(tag) => vec![parse_family(tag)?],
        None => MetricFamily::ALL.to_vec(),
    };
    let registry = MetricRegistry::new(graph);
    for family in families {
        let metrics = registry.list(ctx, family)?;
        println!(
            "{} {} ({})",
            family.short_name().green().bold(),
            family.tag(),
            metrics.len()
        );
        for metric in metrics {
            println!("  {} [{}]", metric.name().bold(), metric.id());
        }
    }
    Ok(())
}

fn cmd_types(graph: &MemoryGraph, ctx: &RequestContext) -> Result<()> {
    use fleetlic_engine::LicenseGraph;

    let types = graph
        .equipment_types(ctx)
        .map_err(|err| anyhow!("listing equipment types: {err}"))?;
    let forest = TypeForest::new(types)?;
    print!("{}", output::type_forest(&forest));
    Ok(())
}

fn cmd_check(graph: &MemoryGraph) -> Result<()> {
    let scopes = graph.scope_names();
    eprintln!(
        "{} {} loaded, {} scope(s): {}",
        "ok".green().bold(),
        graph.config().snapshot_path.display(),
        scopes.len(),
        scopes.join(", ")
    );
    Ok(())
}
