//! Scenario orchestrator.
//!
//! Drives one scenario from parsed configuration to the files handed to the
//! simulation engine: the topology snapshot, the traffic plan and, when
//! requested, a sampled position trace.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Context, Result};

use crate::config::ScenarioConfig;
use crate::context::SimContext;
use crate::topology::{build_hierarchy, Topology, TopologyDocument};
use crate::traffic::{format_data_rate, FlowParameters, TrafficPlan};
use crate::utils::validation::validate_topology;

/// Everything produced for one scenario
#[derive(Debug)]
pub struct GeneratedScenario {
    pub topology: Topology,
    pub context: SimContext,
    pub plan: TrafficPlan,
    pub topology_path: PathBuf,
    pub plan_path: PathBuf,
    pub trace_path: Option<PathBuf>,
}

/// Build the topology and traffic plan for `config` and write them to `output_dir`
pub fn generate_scenario(config: &ScenarioConfig, output_dir: &Path) -> Result<GeneratedScenario> {
    config.validate()?;

    let mut ctx = SimContext::new(config.general.seed, config.horizon());
    let topology = build_hierarchy(config, &mut ctx)?;
    validate_topology(&topology, &ctx).map_err(|e| eyre!("Topology validation failed: {}", e))?;

    let params = FlowParameters::from_config(&config.traffic, config.general.stop_time)?;
    let plan = TrafficPlan::generate(&topology, &mut ctx, config.traffic.mode, &params)?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let document = TopologyDocument::from_topology(&topology, &ctx)?;
    let topology_path = output_dir.join("topology.json");
    write_json(&topology_path, &document)?;

    let plan_path = output_dir.join("traffic_plan.json");
    write_json(&plan_path, &plan)?;

    let trace_path = match &config.trace {
        Some(trace) => {
            let path = output_dir.join("positions.csv");
            let csv = format_position_trace(&ctx, trace.interval.as_secs_f64())?;
            fs::write(&path, csv).with_context(|| format!("Failed to write position trace to {}", path.display()))?;
            Some(path)
        }
        None => None,
    };

    println!("Generated scenario in {:?}", output_dir);
    println!("  - Simulation time: {:?}", config.general.stop_time);
    println!("  - Clusters: {} (depth {})", topology.len(), topology.max_depth());
    println!("  - Nodes: {}", ctx.node_count());
    println!(
        "  - Flows: {} {} at {}",
        plan.len(),
        plan.mode,
        format_data_rate(params.rate_bits_per_second)
    );
    let prefix_len = config.backbone.addressing.prefix()?;
    println!("  - Address allocation summary:");
    for (subnet, count) in ctx.addresses.allocation_stats(prefix_len) {
        println!("    - {}/{}: {} addresses assigned", subnet, prefix_len, count);
    }
    if let Some(path) = &trace_path {
        println!("  - Position trace at {:?}", path);
    }

    Ok(GeneratedScenario {
        topology,
        context: ctx,
        plan,
        topology_path,
        plan_path,
        trace_path,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Samples every node's absolute position from 0 to the horizon, inclusive,
/// every `interval` seconds. One `time,node,x,y,z` line per node and sample.
pub fn format_position_trace(ctx: &SimContext, interval: f64) -> Result<String> {
    if interval.is_nan() || interval <= 0.0 {
        return Err(eyre!("Trace interval must be positive, got {}", interval));
    }

    let mut csv = String::from("time,node,x,y,z\n");
    let steps = (ctx.horizon() / interval).floor() as u64;
    for step in 0..=steps {
        let t = step as f64 * interval;
        for node in ctx.nodes() {
            let p = ctx.mobility.position_at(node, t)?;
            writeln!(csv, "{:.3},{},{:.3},{:.3},{:.3}", t, node, p.x, p.y, p.z)?;
        }
    }
    Ok(csv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::traffic::TrafficMode;
    use std::time::Duration;

    #[test]
    fn test_generate_default_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = generate_scenario(&ScenarioConfig::default(), dir.path()).unwrap();

        assert!(scenario.topology_path.exists());
        assert!(scenario.plan_path.exists());
        assert!(scenario.trace_path.is_none());
        assert_eq!(scenario.plan.mode, TrafficMode::FixedRemote);
        assert_eq!(scenario.plan.len(), 1);

        let plan: TrafficPlan = serde_json::from_str(&fs::read_to_string(&scenario.plan_path).unwrap()).unwrap();
        assert_eq!(plan.flows[0].source, scenario.plan.flows[0].source);
    }

    #[test]
    fn test_position_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ScenarioConfig::default();
        config.trace = Some(TraceConfig {
            interval: Duration::from_secs(5),
        });
        let scenario = generate_scenario(&config, dir.path()).unwrap();

        let csv = fs::read_to_string(scenario.trace_path.unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,node,x,y,z");
        // Samples at 0, 5, 10, 15 and 20 s for 20 nodes
        assert_eq!(lines.len(), 1 + 5 * 20);
        assert!(lines[1].starts_with("0.000,n0,"));
        assert!(lines.last().unwrap().starts_with("20.000,n19,"));
    }

    #[test]
    fn test_same_seed_same_plan() {
        let mut config = ScenarioConfig::default();
        config.traffic.mode = TrafficMode::RandomAllToAll;
        let a = generate_scenario(&config, tempfile::tempdir().unwrap().path()).unwrap();
        let b = generate_scenario(&config, tempfile::tempdir().unwrap().path()).unwrap();
        assert_eq!(a.plan, b.plan);
    }
}
