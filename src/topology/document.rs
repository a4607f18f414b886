//! Serializable snapshot of a built topology, written as `topology.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::cluster::{ClusterId, Topology};
use crate::context::{NodeId, SimContext};
use crate::mobility::{MobilityError, MobilityKind, Vector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    pub seed: u64,
    pub horizon: f64,
    pub clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub id: ClusterId,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ClusterId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<NodeId>,
    pub network: Ipv4Addr,
    pub prefix_len: u8,
    pub mobility: MobilityKind,
    pub members: Vec<MemberEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub node: NodeId,
    pub address: Ipv4Addr,
    /// Absolute position at t = 0
    pub position: Vector,
}

impl TopologyDocument {
    pub fn from_topology(topology: &Topology, ctx: &SimContext) -> Result<Self, MobilityError> {
        let mut clusters = Vec::with_capacity(topology.len());
        for cluster in topology.clusters() {
            let range = cluster.address_range();
            let mut members = Vec::with_capacity(cluster.members().len());
            for (node, address) in cluster.members().iter().zip(range.hosts()) {
                members.push(MemberEntry {
                    node: *node,
                    address,
                    position: ctx.mobility.position_at(*node, 0.0)?,
                });
            }
            clusters.push(ClusterEntry {
                id: cluster.id(),
                depth: cluster.depth(),
                parent: cluster.parent(),
                anchor: cluster.anchor(),
                network: range.network,
                prefix_len: range.prefix_len,
                mobility: cluster.mobility().kind(),
                members,
            });
        }
        Ok(Self {
            seed: ctx.seed(),
            horizon: ctx.horizon(),
            clusters,
        })
    }

    /// Address to node label map, e.g. `192.168.1.1 -> n10`
    pub fn address_labels(&self) -> BTreeMap<Ipv4Addr, String> {
        self.clusters
            .iter()
            .flat_map(|c| c.members.iter())
            .map(|m| (m.address, m.node.to_string()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.clusters
            .iter()
            .flat_map(|c| c.members.iter().map(|m| m.node))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use crate::topology::build_hierarchy;

    #[test]
    fn test_document_json() {
        let config = ScenarioConfig::default();
        let mut ctx = SimContext::new(3, config.horizon());
        let topology = build_hierarchy(&config, &mut ctx).unwrap();
        let document = TopologyDocument::from_topology(&topology, &ctx).unwrap();

        assert_eq!(document.clusters.len(), 11);
        assert_eq!(document.node_count(), 20);

        let json = serde_json::to_string_pretty(&document).unwrap();
        let parsed: TopologyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.address_labels(), document.address_labels());
        for (a, b) in parsed.clusters.iter().zip(&document.clusters) {
            assert_eq!((a.id, a.parent, a.anchor, a.network), (b.id, b.parent, b.anchor, b.network));
            for (m, n) in a.members.iter().zip(&b.members) {
                assert!(m.position.approx_eq(&n.position, 1e-9));
            }
        }
    }

    #[test]
    fn test_anchor_has_one_label_per_cluster() {
        let config = ScenarioConfig::default();
        let mut ctx = SimContext::new(3, config.horizon());
        let topology = build_hierarchy(&config, &mut ctx).unwrap();
        let document = TopologyDocument::from_topology(&topology, &ctx).unwrap();
        let labels = document.address_labels();

        // Router n0 answers on the backbone and inside its child cluster
        let n0: Vec<_> = labels.iter().filter(|(_, label)| label.as_str() == "n0").collect();
        assert_eq!(n0.len(), 2);
        assert_eq!(*n0[0].0, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(*n0[1].0, Ipv4Addr::new(192, 168, 1, 2));
    }
}
