//! Simulation context.
//!
//! Everything the topology builder and traffic planner would otherwise read
//! from process-wide framework state lives here: the node registry, the seeded
//! random source, the run horizon, address ownership and mobility bindings.
//! One context is created per scenario and threaded through construction.

use std::collections::BTreeSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::ip::AddressRegistry;
use crate::mobility::MobilityRegistry;

/// Opaque node handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Explicit replacement for the simulator's global node list and RNG seed
#[derive(Debug)]
pub struct SimContext {
    seed: u64,
    horizon: f64,
    next_node: u32,
    destroyed: BTreeSet<NodeId>,
    rng: StdRng,
    pub addresses: AddressRegistry,
    pub mobility: MobilityRegistry,
}

impl SimContext {
    /// `horizon` is the simulated stop time in seconds; trajectories are
    /// generated up to it.
    pub fn new(seed: u64, horizon: f64) -> Self {
        Self {
            seed,
            horizon,
            next_node: 0,
            destroyed: BTreeSet::new(),
            rng: StdRng::seed_from_u64(seed),
            addresses: AddressRegistry::new(),
            mobility: MobilityRegistry::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Handles the next `create_nodes(count)` call will return
    pub fn upcoming_nodes(&self, count: usize) -> Vec<NodeId> {
        (self.next_node..self.next_node + count as u32).map(NodeId).collect()
    }

    /// Creates `count` fresh node handles, numbered in creation order
    pub fn create_nodes(&mut self, count: usize) -> Vec<NodeId> {
        let nodes = self.upcoming_nodes(count);
        self.next_node += count as u32;
        nodes
    }

    /// Live nodes: created and not destroyed
    pub fn node_count(&self) -> usize {
        self.next_node as usize - self.destroyed.len()
    }

    /// Every live node, in creation order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.next_node).map(NodeId).filter(move |n| !self.destroyed.contains(n))
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        node.0 < self.next_node && !self.destroyed.contains(&node)
    }

    /// Tears down a node's attached state. Bindings that reference it fail on
    /// their next evaluation instead of reusing stale coordinates. Handles are
    /// never reused.
    pub fn destroy_node(&mut self, node: NodeId) {
        if !self.is_live(node) {
            return;
        }
        log::debug!("Destroying node {}", node);
        self.mobility.unbind(node);
        self.addresses.release(node);
        self.destroyed.insert(node);
    }
}
