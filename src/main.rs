use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use hiernet::config::ScenarioConfig;
use hiernet::config_loader::{self, ScenarioOverrides};
use hiernet::orchestrator::generate_scenario;
use hiernet::traffic::TrafficMode;
use humantime_serde::re::humantime::parse_duration;

/// Hierarchical wireless scenario builder: clusters, subnets, mobility and traffic
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scenario YAML file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for topology.json, traffic_plan.json and positions.csv
    #[arg(short, long, default_value = "scenario_output")]
    output: PathBuf,

    /// Number of backbone routers
    #[arg(long)]
    backbone_nodes: Option<usize>,

    /// Nodes per cluster in the first tier below the backbone
    #[arg(long)]
    leaf_nodes: Option<usize>,

    /// Simulation stop time, e.g. "20s" or "2m"
    #[arg(long, value_parser = parse_duration)]
    stop_time: Option<Duration>,

    /// Seed for trajectory generation and random traffic
    #[arg(long)]
    seed: Option<u64>,

    /// How flows are assigned between nodes
    #[arg(long, value_enum)]
    traffic_mode: Option<TrafficMode>,

    /// Sample every node's position at this interval into positions.csv
    #[arg(long, value_parser = parse_duration)]
    trace_positions: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ScenarioOverrides {
        ScenarioOverrides {
            backbone_nodes: self.backbone_nodes,
            leaf_nodes: self.leaf_nodes,
            stop_time: self.stop_time,
            seed: self.seed,
            traffic_mode: self.traffic_mode,
            trace_interval: self.trace_positions,
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config_loader::load_config(path)
            .wrap_err_with(|| format!("Failed to load scenario '{}'", path.display()))?,
        None => ScenarioConfig::default(),
    };

    // CLI flag wins over the YAML key, which wins over "info"
    let level = args
        .log_level
        .clone()
        .or_else(|| config.general.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match &args.config {
        Some(path) => info!("Configuration file: {:?}", path),
        None => info!("No configuration file given, using the built-in scenario"),
    }
    info!("Output directory: {:?}", args.output);

    config_loader::apply_overrides(&mut config, &args.overrides())?;

    let scenario = generate_scenario(&config, &args.output)?;

    info!(
        "Scenario ready: {} clusters, {} nodes, {} flows",
        scenario.topology.len(),
        scenario.context.node_count(),
        scenario.plan.len()
    );
    Ok(())
}
