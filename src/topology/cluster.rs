//! Hierarchical node clusters.
//!
//! Clusters live in a [`Topology`] arena and point at each other by
//! [`ClusterId`]. A child cluster borrows one member of its parent (the
//! anchor), takes its subnet from the parent's shared pool and positions its
//! own members relative to the anchor's live position.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{NodeId, SimContext};
use crate::ip::{AddressConflict, AddressPool, AddressRange, PoolError, PoolId};
use crate::mobility::{MobilityBinding, MobilityError, MobilitySpec};

/// Index of a cluster inside the topology arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Where a child cluster hangs off its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub parent: ClusterId,
    /// Index into the parent's member list of the node shared by both clusters
    pub anchor_index: usize,
}

/// Failure building a single cluster
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    #[error("anchor index {index} out of range for parent with {len} members")]
    InvalidAnchor { index: usize, len: usize },

    #[error("unknown parent cluster {0}")]
    UnknownParent(ClusterId),

    #[error("address allocation failed: {0}")]
    Pool(#[from] PoolError),

    #[error("address registration failed: {0}")]
    Address(#[from] AddressConflict),

    #[error("mobility installation failed: {0}")]
    Mobility(#[from] MobilityError),
}

/// Construction failure, tagged with the position of the cluster in the tree
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to build {} cluster at depth {depth}: {source}", parent_label(.parent))]
    Build {
        depth: usize,
        parent: Option<ClusterId>,
        #[source]
        source: ClusterError,
    },
}

fn parent_label(parent: &Option<ClusterId>) -> String {
    match parent {
        Some(id) => format!("child of {}", id),
        None => "root".to_string(),
    }
}

impl TopologyError {
    pub fn depth(&self) -> usize {
        match self {
            TopologyError::Build { depth, .. } => *depth,
        }
    }

    pub fn cause(&self) -> &ClusterError {
        match self {
            TopologyError::Build { source, .. } => source,
        }
    }
}

/// Input of a single [`Topology::build`] call
#[derive(Debug, Clone)]
pub struct ClusterRequest {
    pub member_count: usize,
    pub mobility: MobilitySpec,
    pub placement: Placement,
}

/// Root clusters bring a fresh pool; children attach to an existing cluster
#[derive(Debug, Clone)]
pub enum Placement {
    Root(AddressPool),
    Child(Attachment),
}

impl ClusterRequest {
    pub fn root(member_count: usize, pool: AddressPool, mobility: MobilitySpec) -> Self {
        Self {
            member_count,
            mobility,
            placement: Placement::Root(pool),
        }
    }

    pub fn child(member_count: usize, attachment: Attachment, mobility: MobilitySpec) -> Self {
        Self {
            member_count,
            mobility,
            placement: Placement::Child(attachment),
        }
    }
}

/// A group of nodes sharing one subnet and one mobility binding
#[derive(Debug, Clone)]
pub struct NetworkCluster {
    id: ClusterId,
    depth: usize,
    members: Vec<NodeId>,
    parent: Option<ClusterId>,
    anchor: Option<NodeId>,
    pool: PoolId,
    range: AddressRange,
    binding: MobilityBinding,
    children: Vec<ClusterId>,
}

impl NetworkCluster {
    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Every member in insertion order; for a child the borrowed anchor is last
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Members created by this cluster, i.e. without the borrowed anchor
    pub fn own_members(&self) -> &[NodeId] {
        match self.anchor {
            Some(_) => &self.members[..self.members.len() - 1],
            None => &self.members,
        }
    }

    /// Gateway node, conventionally the first member
    pub fn gateway(&self) -> Option<NodeId> {
        self.members.first().copied()
    }

    pub fn parent(&self) -> Option<ClusterId> {
        self.parent
    }

    /// Parent member this cluster is attached through
    pub fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn address_range(&self) -> &AddressRange {
        &self.range
    }

    pub fn mobility(&self) -> &MobilityBinding {
        &self.binding
    }

    pub fn children(&self) -> &[ClusterId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena owning every cluster and address pool of a scenario
#[derive(Debug, Default, Clone)]
pub struct Topology {
    clusters: Vec<NetworkCluster>,
    pools: Vec<AddressPool>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&NetworkCluster> {
        self.clusters.get(id.0)
    }

    pub fn clusters(&self) -> &[NetworkCluster] {
        &self.clusters
    }

    pub fn pool(&self, id: PoolId) -> Option<&AddressPool> {
        self.pools.get(id.0)
    }

    pub fn roots(&self) -> impl Iterator<Item = &NetworkCluster> {
        self.clusters.iter().filter(|c| c.is_root())
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Deepest tier present in the tree
    pub fn max_depth(&self) -> usize {
        self.clusters.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// Builds one cluster:
    ///
    /// 1. validates the attachment, if any;
    /// 2. allocates a subnet sized to the full member list, from a fresh pool for
    ///    a root or from the parent's shared pool, which then moves to a new network;
    /// 3. creates the member handles (plus the parent's anchor for a child) and
    ///    registers their addresses;
    /// 4. installs the mobility binding, relative to the anchor for a child.
    ///
    /// Any failure aborts the build and reports the depth and parent.
    pub fn build(&mut self, ctx: &mut SimContext, request: ClusterRequest) -> Result<ClusterId, TopologyError> {
        let (depth, parent) = match &request.placement {
            Placement::Root(_) => (0, None),
            Placement::Child(attachment) => (
                self.cluster(attachment.parent).map(|p| p.depth + 1).unwrap_or(1),
                Some(attachment.parent),
            ),
        };
        self.build_inner(ctx, request)
            .map_err(|source| TopologyError::Build { depth, parent, source })
    }

    fn build_inner(&mut self, ctx: &mut SimContext, request: ClusterRequest) -> Result<ClusterId, ClusterError> {
        let id = ClusterId(self.clusters.len());

        let (mut pool, pool_id, depth, parent, anchor, binding) = match request.placement {
            Placement::Root(pool) => (
                pool,
                PoolId(self.pools.len()),
                0,
                None,
                None,
                MobilityBinding::new(request.mobility),
            ),
            Placement::Child(attachment) => {
                let parent = self
                    .cluster(attachment.parent)
                    .ok_or(ClusterError::UnknownParent(attachment.parent))?;
                let anchor = *parent.members.get(attachment.anchor_index).ok_or(ClusterError::InvalidAnchor {
                    index: attachment.anchor_index,
                    len: parent.members.len(),
                })?;
                (
                    self.pools[parent.pool.0].clone(),
                    parent.pool,
                    parent.depth + 1,
                    Some(attachment.parent),
                    Some(anchor),
                    MobilityBinding::relative_to(request.mobility, anchor),
                )
            }
        };

        // Every failure is detected on the working copy of the pool, before
        // the arena, node list or registries change
        binding.check(ctx)?;
        let host_count = request.member_count + usize::from(anchor.is_some());
        let range = pool.allocate(host_count)?;
        if anchor.is_some() {
            pool.new_network()?;
        }

        let mut members = ctx.upcoming_nodes(request.member_count);
        members.extend(anchor);
        for (member, address) in members.iter().zip(range.hosts()) {
            if let Some(owner) = ctx.addresses.owner_of(address).filter(|owner| owner != member) {
                return Err(AddressConflict {
                    address,
                    owner,
                    requested_by: *member,
                }
                .into());
            }
        }

        let own = ctx.create_nodes(request.member_count);
        binding.install(&own, ctx)?;
        for (member, address) in members.iter().zip(range.hosts()) {
            ctx.addresses.register(address, *member)?;
        }

        match self.pools.get_mut(pool_id.0) {
            Some(shared) => *shared = pool,
            None => self.pools.push(pool),
        }

        log::info!(
            "Built cluster {} at depth {}: {} members on {}{}",
            id,
            depth,
            members.len(),
            range,
            anchor.map(|a| format!(", anchored at {}", a)).unwrap_or_default()
        );

        if let Some(parent) = parent {
            self.clusters[parent.0].children.push(id);
        }

        self.clusters.push(NetworkCluster {
            id,
            depth,
            members,
            parent,
            anchor,
            pool: pool_id,
            range,
            binding,
            children: Vec::new(),
        });
        Ok(id)
    }
}
