//! Cluster tree construction.
//!
//! [`cluster`] holds the arena and the single-cluster build step, [`builder`]
//! drives it from a scenario, and [`document`] snapshots the result.

pub mod builder;
pub mod cluster;
pub mod document;

pub use builder::{build_hierarchy, clusters_by_depth};
pub use cluster::{
    Attachment, ClusterError, ClusterId, ClusterRequest, NetworkCluster, Placement, Topology, TopologyError,
};
pub use document::{ClusterEntry, MemberEntry, TopologyDocument};
