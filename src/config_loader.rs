use crate::config::{ScenarioConfig, TraceConfig};
use crate::traffic::TrafficMode;
use color_eyre::eyre::Context;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Load and parse a scenario from a YAML file
pub fn load_config(config_path: &Path) -> Result<ScenarioConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open configuration {}", config_path.display()))?;

    let config: ScenarioConfig = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse configuration {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct ScenarioOverrides {
    pub backbone_nodes: Option<usize>,
    /// Nodes per cluster of the first tier below the backbone
    pub leaf_nodes: Option<usize>,
    pub stop_time: Option<Duration>,
    pub seed: Option<u64>,
    pub traffic_mode: Option<TrafficMode>,
    pub trace_interval: Option<Duration>,
}

/// Apply CLI overrides to a scenario and re-validate it
pub fn apply_overrides(config: &mut ScenarioConfig, overrides: &ScenarioOverrides) -> Result<()> {
    if let Some(nodes) = overrides.backbone_nodes {
        info!("Overriding backbone nodes: {} -> {}", config.backbone.nodes, nodes);
        config.backbone.nodes = nodes;
    }

    if let Some(nodes) = overrides.leaf_nodes {
        match config.tiers.first_mut() {
            Some(tier) => {
                info!("Overriding leaf nodes: {} -> {}", tier.nodes, nodes);
                tier.nodes = nodes;
            }
            None => log::warn!("Ignoring leaf node override: scenario has no tiers"),
        }
    }

    if let Some(stop_time) = overrides.stop_time {
        info!("Overriding stop time: {:?} -> {:?}", config.general.stop_time, stop_time);
        config.general.stop_time = stop_time;
    }

    if let Some(seed) = overrides.seed {
        config.general.seed = seed;
    }

    if let Some(mode) = overrides.traffic_mode {
        info!("Overriding traffic mode: {} -> {}", config.traffic.mode, mode);
        config.traffic.mode = mode;
    }

    if let Some(interval) = overrides.trace_interval {
        config.trace = Some(TraceConfig { interval });
    }

    config.validate()?;

    Ok(())
}
