//! Flow assignment between cluster members.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::rate::parse_data_rate;
use crate::config::TrafficConfig;
use crate::context::{NodeId, SimContext};
use crate::topology::Topology;

/// How sources are matched with destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficMode {
    /// Each backbone anchor sends to the leaves of its mirrored sibling cluster
    Paired,
    /// Every node sends to one uniformly drawn other node
    RandomAllToAll,
    /// First leaf of the first child cluster sends to the last leaf of the last one
    #[default]
    FixedRemote,
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrafficMode::Paired => "paired",
            TrafficMode::RandomAllToAll => "random-all-to-all",
            TrafficMode::FixedRemote => "fixed-remote",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while planning traffic
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrafficError {
    #[error("{mode} traffic needs at least {needed} nodes, topology has {available}")]
    InsufficientNodes {
        mode: TrafficMode,
        needed: usize,
        available: usize,
    },

    #[error("{0} traffic needs a root cluster with attached children")]
    NoChildClusters(TrafficMode),

    #[error("node {0} has no address assigned")]
    NoAddress(NodeId),

    #[error("invalid data rate: {0}")]
    InvalidRate(String),

    #[error("flow window [{start}, {stop}) is empty")]
    InvalidWindow { start: f64, stop: f64 },
}

/// Per-flow application parameters shared by every descriptor of a plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowParameters {
    pub start_time: f64,
    pub stop_time: f64,
    pub rate_bits_per_second: u64,
    pub packet_size: u32,
    pub port: u16,
}

impl FlowParameters {
    pub fn from_config(config: &TrafficConfig, run_stop: Duration) -> Result<Self, TrafficError> {
        let (start_time, stop_time) = config.window(run_stop);
        if start_time >= stop_time {
            return Err(TrafficError::InvalidWindow { start: start_time, stop: stop_time });
        }
        Ok(Self {
            start_time,
            stop_time,
            rate_bits_per_second: parse_data_rate(&config.data_rate).map_err(TrafficError::InvalidRate)?,
            packet_size: config.packet_size,
            port: config.port,
        })
    }
}

/// One constant-bit-rate flow for the simulation engine to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDescriptor {
    pub source: NodeId,
    pub destination: NodeId,
    pub source_address: Ipv4Addr,
    pub destination_address: Ipv4Addr,
    pub port: u16,
    pub start_time: f64,
    pub stop_time: f64,
    pub rate_bits_per_second: u64,
    pub packet_size: u32,
}

/// Ordered list of flows produced by one planning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPlan {
    pub mode: TrafficMode,
    pub flows: Vec<FlowDescriptor>,
}

impl TrafficPlan {
    /// Assigns flows between members of `topology` according to `mode`.
    /// Only `RandomAllToAll` draws from the context RNG.
    pub fn generate(
        topology: &Topology,
        ctx: &mut SimContext,
        mode: TrafficMode,
        params: &FlowParameters,
    ) -> Result<Self, TrafficError> {
        let pairs = match mode {
            TrafficMode::Paired => paired(topology)?,
            TrafficMode::RandomAllToAll => random_all_to_all(topology, ctx)?,
            TrafficMode::FixedRemote => fixed_remote(topology)?,
        };

        let mut flows = Vec::with_capacity(pairs.len());
        for (source, destination) in pairs {
            let flow = FlowDescriptor {
                source,
                destination,
                source_address: ctx.addresses.primary_address(source).ok_or(TrafficError::NoAddress(source))?,
                destination_address: ctx
                    .addresses
                    .primary_address(destination)
                    .ok_or(TrafficError::NoAddress(destination))?,
                port: params.port,
                start_time: params.start_time,
                stop_time: params.stop_time,
                rate_bits_per_second: params.rate_bits_per_second,
                packet_size: params.packet_size,
            };
            debug!(
                "Flow {} ({}) -> {} ({})",
                flow.source, flow.source_address, flow.destination, flow.destination_address
            );
            flows.push(flow);
        }

        if flows.is_empty() {
            warn!("{} traffic plan produced no flows", mode);
        } else {
            info!("Planned {} {} flows", flows.len(), mode);
        }
        Ok(Self { mode, flows })
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

/// Anchor of the i-th child of the first root talks to every own member of
/// child `n - 1 - i`.
fn paired(topology: &Topology) -> Result<Vec<(NodeId, NodeId)>, TrafficError> {
    let root = topology
        .roots()
        .next()
        .ok_or(TrafficError::NoChildClusters(TrafficMode::Paired))?;
    let children: Vec<_> = root.children().iter().filter_map(|id| topology.cluster(*id)).collect();
    if children.is_empty() {
        return Err(TrafficError::NoChildClusters(TrafficMode::Paired));
    }

    let n = children.len();
    let mut pairs = Vec::new();
    for (i, inner) in children.iter().enumerate() {
        let Some(source) = inner.anchor() else { continue };
        let outer = children[n - 1 - i];
        for destination in outer.own_members() {
            if *destination != source {
                pairs.push((source, *destination));
            }
        }
    }
    Ok(pairs)
}

/// Every node draws one distinct destination uniformly at random
fn random_all_to_all(topology: &Topology, ctx: &mut SimContext) -> Result<Vec<(NodeId, NodeId)>, TrafficError> {
    let nodes: Vec<NodeId> = topology
        .clusters()
        .iter()
        .flat_map(|c| c.members().iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if nodes.len() < 2 {
        return Err(TrafficError::InsufficientNodes {
            mode: TrafficMode::RandomAllToAll,
            needed: 2,
            available: nodes.len(),
        });
    }

    let rng = ctx.rng();
    let mut pairs = Vec::with_capacity(nodes.len());
    for &source in &nodes {
        let destination = loop {
            let candidate = nodes[rng.gen_range(0..nodes.len())];
            if candidate != source {
                break candidate;
            }
        };
        pairs.push((source, destination));
    }
    Ok(pairs)
}

/// First leaf ever created below the backbone sends to the last one
fn fixed_remote(topology: &Topology) -> Result<Vec<(NodeId, NodeId)>, TrafficError> {
    let leaves: Vec<NodeId> = topology
        .clusters()
        .iter()
        .filter(|c| !c.is_root())
        .flat_map(|c| c.own_members().iter().copied())
        .collect();
    if topology.clusters().iter().all(|c| c.is_root()) {
        return Err(TrafficError::NoChildClusters(TrafficMode::FixedRemote));
    }

    match (leaves.first(), leaves.last()) {
        (Some(&source), Some(&destination)) if source != destination => Ok(vec![(source, destination)]),
        _ => Err(TrafficError::InsufficientNodes {
            mode: TrafficMode::FixedRemote,
            needed: 2,
            available: leaves.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::AddressPool;
    use crate::mobility::{MobilityKind, MobilitySpec};
    use crate::topology::{Attachment, ClusterRequest};

    fn params() -> FlowParameters {
        FlowParameters {
            start_time: 1.0,
            stop_time: 20.0,
            rate_bits_per_second: 100_000,
            packet_size: 1472,
            port: 9,
        }
    }

    /// Backbone of `routers` with one child of `leaves` nodes per router
    fn two_tier(ctx: &mut SimContext, routers: usize, leaves: usize) -> Topology {
        let mut topology = Topology::new();
        let pool = AddressPool::new(Ipv4Addr::new(192, 168, 0, 0), 24, 16).unwrap();
        let root = topology
            .build(ctx, ClusterRequest::root(routers, pool, MobilitySpec::new(MobilityKind::Grid)))
            .unwrap();
        for anchor_index in 0..routers {
            topology
                .build(
                    ctx,
                    ClusterRequest::child(
                        leaves,
                        Attachment { parent: root, anchor_index },
                        MobilitySpec::new(MobilityKind::Grid),
                    ),
                )
                .unwrap();
        }
        topology
    }

    #[test]
    fn test_paired_mirrors_children() {
        let mut ctx = SimContext::new(1, 20.0);
        let topology = two_tier(&mut ctx, 3, 2);
        let plan = TrafficPlan::generate(&topology, &mut ctx, TrafficMode::Paired, &params()).unwrap();

        assert_eq!(plan.len(), 6);
        let root = topology.roots().next().unwrap();
        let children = root.children();
        let last = topology.cluster(children[2]).unwrap();
        let first_flows: Vec<_> = plan.flows.iter().filter(|f| f.source == root.members()[0]).collect();
        assert_eq!(first_flows.len(), 2);
        for (flow, member) in first_flows.iter().zip(last.own_members()) {
            assert_eq!(flow.destination, *member);
            assert_eq!(flow.destination_address, ctx.addresses.primary_address(*member).unwrap());
        }
        assert!(plan.flows.iter().all(|f| f.rate_bits_per_second == 100_000 && f.port == 9));
    }

    #[test]
    fn test_paired_needs_children() {
        let mut ctx = SimContext::new(1, 20.0);
        let topology = two_tier(&mut ctx, 3, 0);
        let plan = TrafficPlan::generate(&topology, &mut ctx, TrafficMode::Paired, &params()).unwrap();
        assert!(plan.is_empty());

        let mut ctx = SimContext::new(1, 20.0);
        let mut bare = Topology::new();
        let pool = AddressPool::new(Ipv4Addr::new(10, 0, 0, 0), 24, 16).unwrap();
        bare.build(&mut ctx, ClusterRequest::root(2, pool, MobilitySpec::new(MobilityKind::Grid)))
            .unwrap();
        assert_eq!(
            TrafficPlan::generate(&bare, &mut ctx, TrafficMode::Paired, &params()),
            Err(TrafficError::NoChildClusters(TrafficMode::Paired))
        );
    }

    #[test]
    fn test_random_all_to_all_never_self() {
        let mut ctx = SimContext::new(7, 20.0);
        let topology = two_tier(&mut ctx, 4, 3);
        let plan = TrafficPlan::generate(&topology, &mut ctx, TrafficMode::RandomAllToAll, &params()).unwrap();

        // 4 routers + 4 * 3 leaves, each node a source exactly once
        assert_eq!(plan.len(), 16);
        let sources: BTreeSet<_> = plan.flows.iter().map(|f| f.source).collect();
        assert_eq!(sources.len(), 16);
        assert!(plan.flows.iter().all(|f| f.source != f.destination));
    }

    #[test]
    fn test_random_all_to_all_reproducible() {
        let run = |seed| {
            let mut ctx = SimContext::new(seed, 20.0);
            let topology = two_tier(&mut ctx, 3, 2);
            TrafficPlan::generate(&topology, &mut ctx, TrafficMode::RandomAllToAll, &params()).unwrap()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_random_all_to_all_single_node() {
        let mut ctx = SimContext::new(1, 20.0);
        let mut topology = Topology::new();
        let pool = AddressPool::new(Ipv4Addr::new(10, 0, 0, 0), 24, 16).unwrap();
        topology
            .build(&mut ctx, ClusterRequest::root(1, pool, MobilitySpec::new(MobilityKind::Grid)))
            .unwrap();
        assert!(matches!(
            TrafficPlan::generate(&topology, &mut ctx, TrafficMode::RandomAllToAll, &params()),
            Err(TrafficError::InsufficientNodes { available: 1, .. })
        ));
    }

    #[test]
    fn test_fixed_remote_first_to_last_leaf() {
        let mut ctx = SimContext::new(1, 20.0);
        let topology = two_tier(&mut ctx, 3, 2);
        let plan = TrafficPlan::generate(&topology, &mut ctx, TrafficMode::FixedRemote, &params()).unwrap();

        assert_eq!(plan.len(), 1);
        let flow = &plan.flows[0];
        // Routers are n0..n2, leaves n3..n8
        assert_eq!(flow.source, NodeId(3));
        assert_eq!(flow.destination, NodeId(8));
        assert_eq!(flow.source_address, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(flow.destination_address, Ipv4Addr::new(192, 168, 5, 2));
    }

    #[test]
    fn test_fixed_remote_single_leaf_rejected() {
        let mut ctx = SimContext::new(1, 20.0);
        let topology = two_tier(&mut ctx, 1, 1);
        assert!(matches!(
            TrafficPlan::generate(&topology, &mut ctx, TrafficMode::FixedRemote, &params()),
            Err(TrafficError::InsufficientNodes { available: 1, .. })
        ));
    }

    #[test]
    fn test_flow_parameters_from_config() {
        let config = TrafficConfig::default();
        let params = FlowParameters::from_config(&config, Duration::from_secs(20)).unwrap();
        assert_eq!(params.start_time, 1.0);
        assert_eq!(params.stop_time, 20.0);
        assert_eq!(params.rate_bits_per_second, 100_000);

        let late = TrafficConfig {
            start: Duration::from_secs(30),
            ..TrafficConfig::default()
        };
        assert!(matches!(
            FlowParameters::from_config(&late, Duration::from_secs(20)),
            Err(TrafficError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_mode_serde_names() {
        let mode: TrafficMode = serde_yaml::from_str("random-all-to-all").unwrap();
        assert_eq!(mode, TrafficMode::RandomAllToAll);
        assert_eq!(TrafficMode::default().to_string(), "fixed-remote");
    }
}
