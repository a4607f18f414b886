//! Address ownership registry.
//!
//! Records which node owns every allocated host address so that duplicate
//! assignments are caught at build time and post-run reports can translate
//! addresses back to node labels.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use crate::context::NodeId;

/// Raised when an address is handed to a second node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("address {address} already assigned to {owner}, cannot assign to {requested_by}")]
pub struct AddressConflict {
    pub address: Ipv4Addr,
    pub owner: NodeId,
    pub requested_by: NodeId,
}

/// Central address registry shared by every cluster of a topology
#[derive(Debug, Default, Clone)]
pub struct AddressRegistry {
    /// Address -> owning node
    owners: HashMap<Ipv4Addr, NodeId>,
    /// Node -> addresses in assignment order (one per attached interface)
    by_node: BTreeMap<NodeId, Vec<Ipv4Addr>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address` for `node`. Registering the same pair twice is a no-op.
    pub fn register(&mut self, address: Ipv4Addr, node: NodeId) -> Result<(), AddressConflict> {
        if let Some(owner) = self.owners.get(&address) {
            if *owner == node {
                return Ok(());
            }
            return Err(AddressConflict {
                address,
                owner: *owner,
                requested_by: node,
            });
        }
        self.owners.insert(address, node);
        self.by_node.entry(node).or_default().push(address);
        Ok(())
    }

    pub fn is_assigned(&self, address: Ipv4Addr) -> bool {
        self.owners.contains_key(&address)
    }

    pub fn owner_of(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.owners.get(&address).copied()
    }

    pub fn addresses_of(&self, node: NodeId) -> &[Ipv4Addr] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First address assigned to the node, i.e. the interface of its home cluster
    pub fn primary_address(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.addresses_of(node).first().copied()
    }

    /// Drops every address owned by `node`
    pub fn release(&mut self, node: NodeId) {
        if let Some(addresses) = self.by_node.remove(&node) {
            for address in addresses {
                self.owners.remove(&address);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of assigned addresses per `/prefix_len` subnet, for logging
    pub fn allocation_stats(&self, prefix_len: u8) -> BTreeMap<Ipv4Addr, usize> {
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len.min(32))).unwrap_or(0);
        let mut stats = BTreeMap::new();
        for address in self.owners.keys() {
            let block = Ipv4Addr::from(u32::from(*address) & mask);
            *stats.entry(block).or_insert(0) += 1;
        }
        stats
    }
}
