//! Post-build consistency checks.
//!
//! These run after the tree is built and before anything is written, so a
//! broken topology is reported instead of being handed to the simulator.

use crate::context::SimContext;
use crate::ip::AddressRange;
use crate::topology::Topology;

/// Validate that no two clusters share any part of their subnets
///
/// # Examples
/// ```
/// use hiernet::config::ScenarioConfig;
/// use hiernet::context::SimContext;
/// use hiernet::topology::build_hierarchy;
/// use hiernet::utils::validation::validate_disjoint_subnets;
///
/// let config = ScenarioConfig::default();
/// let mut ctx = SimContext::new(1, config.horizon());
/// let topology = build_hierarchy(&config, &mut ctx).unwrap();
/// assert!(validate_disjoint_subnets(&topology).is_ok());
/// ```
pub fn validate_disjoint_subnets(topology: &Topology) -> Result<(), String> {
    let mut ranges: Vec<(&AddressRange, String)> = topology
        .clusters()
        .iter()
        .map(|c| (c.address_range(), c.id().to_string()))
        .collect();
    ranges.sort_by_key(|(range, _)| (u32::from(range.network), range.prefix_len));

    // Aligned blocks sorted by network overlap only if some neighbours do
    for pair in ranges.windows(2) {
        let (a, a_id) = &pair[0];
        let (b, b_id) = &pair[1];
        if a.subnet_overlaps(b) {
            return Err(format!("Subnet {} of cluster {} overlaps subnet {} of cluster {}", a, a_id, b, b_id));
        }
    }

    log::debug!("Validated {} disjoint subnets", ranges.len());
    Ok(())
}

/// Validate the parent/child links of every cluster
///
/// Checks for:
/// - Anchor present in the parent and appended last in the child
/// - Own members bound relative to the anchor
/// - Every member owning the address of its slot in the cluster range
pub fn validate_anchor_consistency(topology: &Topology, ctx: &SimContext) -> Result<(), String> {
    for cluster in topology.clusters() {
        if let (Some(parent_id), Some(anchor)) = (cluster.parent(), cluster.anchor()) {
            let parent = topology
                .cluster(parent_id)
                .ok_or_else(|| format!("Cluster {} points at missing parent {}", cluster.id(), parent_id))?;
            if !parent.members().contains(&anchor) {
                return Err(format!(
                    "Anchor {} of cluster {} is not a member of parent {}",
                    anchor,
                    cluster.id(),
                    parent_id
                ));
            }
            if cluster.members().last() != Some(&anchor) {
                return Err(format!("Anchor {} is not the last member of cluster {}", anchor, cluster.id()));
            }
            for member in cluster.own_members() {
                let reference = ctx.mobility.get(*member).and_then(|m| m.reference);
                if reference != Some(anchor) {
                    return Err(format!(
                        "Member {} of cluster {} is not positioned relative to anchor {}",
                        member,
                        cluster.id(),
                        anchor
                    ));
                }
            }
        } else if cluster.parent().is_some() != cluster.anchor().is_some() {
            return Err(format!("Cluster {} has a parent without an anchor", cluster.id()));
        }

        for (member, address) in cluster.members().iter().zip(cluster.address_range().hosts()) {
            if ctx.addresses.owner_of(address) != Some(*member) {
                return Err(format!(
                    "Address {} of cluster {} is not assigned to member {}",
                    address,
                    cluster.id(),
                    member
                ));
            }
        }
    }
    Ok(())
}

/// Run every post-build check
pub fn validate_topology(topology: &Topology, ctx: &SimContext) -> Result<(), String> {
    validate_disjoint_subnets(topology)?;
    validate_anchor_consistency(topology, ctx)
}
