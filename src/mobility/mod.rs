//! Node mobility.
//!
//! Position allocation, trajectory generation and reference composition for
//! cluster members. Trajectories are generated at install time; sampling them
//! at simulated instants is left to the caller's clock.

pub mod binding;
pub mod model;
pub mod options;

pub use binding::{MobilityBinding, MobilityRegistry, MobilitySpec, NodeMobility};
pub use model::{GridLayout, MobilityKind, Rect, Trajectory, Vector};
pub use options::{Distribution, MobilityOptions, OptionValue};

use crate::context::NodeId;

/// Errors raised while configuring, installing or evaluating mobility
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MobilityError {
    #[error("reference node {reference} has no mobility bound")]
    UnboundReference { reference: NodeId },

    #[error("node {0} cannot be positioned relative to itself")]
    SelfReference(NodeId),

    #[error("node {0} already has mobility bound")]
    AlreadyBound(NodeId),

    #[error("node {0} has no mobility bound")]
    UnknownNode(NodeId),

    #[error("reference chain starting at {0} is cyclic")]
    ReferenceCycle(NodeId),

    #[error("invalid mobility option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("mobility kind {0} needs an explicit positions list")]
    MissingPositions(MobilityKind),

    #[error("unknown mobility kind '{0}'")]
    UnknownKind(String),
}
