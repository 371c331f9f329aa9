//! # Brinectl Topology Validator
//!
//! Command-line tool for validating the engine configuration and the field
//! topology snapshot before starting the engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use brinectl_core::config::{ConfigManager, TopologyConfig};
use brinectl_core::place::PlaceGraph;

#[derive(Parser)]
#[command(name = "topology-validator")]
#[command(about = "Validate brinectl engine configuration and field topology")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config/brinectl)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the engine configuration and the topology it names
    All,

    /// Validate a standalone topology file
    Topology {
        /// Path to the topology TOML file
        path: PathBuf,
    },

    /// Print places, nodes and rank lists of a topology file
    Summary {
        /// Path to the topology TOML file
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all(&cli),
        Some(Commands::Topology { path }) => validate_topology(path).map(|_| ()),
        Some(Commands::Summary { path }) => show_summary(path),
    };

    match result {
        Ok(()) => {
            info!("Validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn validate_all(cli: &Cli) -> anyhow::Result<()> {
    println!("Validating brinectl configuration");
    println!("Environment: {}", cli.environment);

    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?;
    println!(
        "Engine configuration loaded from {}",
        manager.config_directory().display()
    );
    let config = manager.config();
    println!("  control_mode: {}", config.engine.control_mode);
    println!("  default_rank: {}", config.engine.default_rank);
    println!(
        "  cancel_on_goal_complete: {}",
        config.engine.cancel_on_goal_complete
    );
    println!(
        "  persistence: batch of {} every {} ms",
        config.persistence.batch_size, config.persistence.flush_interval_ms
    );

    let topology = manager.load_topology()?;
    let graph = PlaceGraph::from_topology(&topology)?;
    println!(
        "Topology valid: {} places, {} nodes, {} data loggers",
        graph.places().count(),
        graph.nodes().count(),
        graph.logger_ids().count()
    );
    Ok(())
}

fn validate_topology(path: &PathBuf) -> anyhow::Result<PlaceGraph> {
    let topology = TopologyConfig::from_file(path)?;
    let graph = PlaceGraph::from_topology(&topology)?;
    println!(
        "{}: {} places, {} nodes, {} flow routes, {} set commands, {} scenarios",
        path.display(),
        topology.places.len(),
        graph.nodes().count(),
        topology.flow_routes.len(),
        topology.set_commands.len(),
        topology.scenarios.len()
    );
    Ok(graph)
}

fn show_summary(path: &PathBuf) -> anyhow::Result<()> {
    let graph = validate_topology(path)?;
    for place in graph.places() {
        println!("\n{} ({:?}) {}", place.place_id, place.kind, place.name);
        if let Some(area) = place.area_m2 {
            println!("  area: {area} m2");
        }
        for (node_def_id, node_id) in &place.nodes {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            println!("  {node_def_id:<12} {node_id} [{:?}]", node.device_kind);
            let call = graph.get_call_rank_list(node_id);
            if !call.is_empty() {
                println!("    call: {}", call.join(" > "));
            }
            let put = graph.get_put_rank_list(node_id);
            if !put.is_empty() {
                println!("    put:  {}", put.join(" > "));
            }
        }
    }
    Ok(())
}
