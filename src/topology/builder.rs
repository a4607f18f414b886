//! Scenario-driven construction of the cluster tree.

use log::info;

use super::cluster::{Attachment, ClusterId, ClusterRequest, Topology, TopologyError};
use crate::config::ScenarioConfig;
use crate::context::SimContext;
use crate::ip::PoolError;

/// Builds the backbone from `config.backbone`, then attaches one child cluster
/// per own member of every cluster, level by level, using `config.tiers[depth]`
/// for clusters at `depth + 1`. The tree stops growing once the tiers run out.
pub fn build_hierarchy(config: &ScenarioConfig, ctx: &mut SimContext) -> Result<Topology, TopologyError> {
    let mut topology = Topology::new();

    let pool = config.backbone.addressing.pool().map_err(root_error)?;
    let root = topology.build(
        ctx,
        ClusterRequest::root(config.backbone.nodes, pool, config.backbone.mobility.clone()),
    )?;

    let mut level = vec![root];
    for (depth, tier) in config.tiers.iter().enumerate() {
        let mut next = Vec::new();
        for parent in level {
            let own_members = match topology.cluster(parent) {
                Some(cluster) => cluster.own_members().len(),
                None => continue,
            };
            for anchor_index in 0..own_members {
                let child = topology.build(
                    ctx,
                    ClusterRequest::child(tier.nodes, Attachment { parent, anchor_index }, tier.mobility.clone()),
                )?;
                next.push(child);
            }
        }
        info!("Tier {} complete: {} clusters", depth + 1, next.len());
        if next.is_empty() {
            break;
        }
        level = next;
    }

    info!(
        "Topology built: {} clusters, {} nodes, depth {}",
        topology.len(),
        ctx.node_count(),
        topology.max_depth()
    );
    Ok(topology)
}

fn root_error(error: PoolError) -> TopologyError {
    TopologyError::Build {
        depth: 0,
        parent: None,
        source: error.into(),
    }
}

/// Clusters in construction order, grouped by depth
pub fn clusters_by_depth(topology: &Topology) -> Vec<Vec<ClusterId>> {
    let mut levels: Vec<Vec<ClusterId>> = vec![Vec::new(); topology.max_depth() + 1];
    for cluster in topology.clusters() {
        levels[cluster.depth()].push(cluster.id());
    }
    if topology.is_empty() {
        levels.clear();
    }
    levels
}
