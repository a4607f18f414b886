//! Mobility bindings and the live position registry.
//!
//! A [`MobilityBinding`] describes how a set of nodes move. When it carries a
//! reference node, every member's trajectory is expressed in the reference's
//! frame and [`MobilityRegistry::position_at`] adds the reference's own
//! evaluated position at the same instant, recursively, so offsets compose
//! through any number of tiers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::model::{generate_trajectory, validate_options, GridLayout, MobilityKind, Trajectory, Vector};
use super::options::MobilityOptions;
use super::MobilityError;
use crate::context::{NodeId, SimContext};

/// Scenario-level description of a binding: model kind, explicit positions
/// and the named-option record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobilitySpec {
    pub kind: MobilityKind,
    /// Fixed-list positions, or explicit starting positions for the random kinds.
    /// Members beyond the end of the list wrap around.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<Vector>,
    #[serde(default)]
    pub options: MobilityOptions,
}

impl MobilitySpec {
    pub fn new(kind: MobilityKind) -> Self {
        Self {
            kind,
            positions: Vec::new(),
            options: MobilityOptions::new(),
        }
    }

    pub fn with_options(mut self, options: MobilityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_positions(mut self, positions: Vec<Vector>) -> Self {
        self.positions = positions;
        self
    }

    /// Starting position of the `index`-th member in the binding's frame
    pub fn initial_position(&self, index: usize) -> Result<Vector, MobilityError> {
        if !self.positions.is_empty() {
            return Ok(self.positions[index % self.positions.len()]);
        }
        match self.kind {
            MobilityKind::FixedList => Err(MobilityError::MissingPositions(self.kind)),
            MobilityKind::Grid => Ok(GridLayout::from_options(&self.options)?.position(index)),
            _ if self.options.contains("grid_width") => Ok(GridLayout::from_options(&self.options)?.position(index)),
            _ => Ok(Vector::ZERO),
        }
    }

    pub fn validate(&self) -> Result<(), MobilityError> {
        if self.kind == MobilityKind::FixedList && self.positions.is_empty() {
            return Err(MobilityError::MissingPositions(self.kind));
        }
        if self.options.contains("grid_width") {
            GridLayout::from_options(&self.options)?;
        }
        validate_options(self.kind, &self.options)
    }
}

/// Installed mobility state of one node
#[derive(Debug, Clone)]
pub struct NodeMobility {
    pub kind: MobilityKind,
    pub trajectory: Trajectory,
    pub reference: Option<NodeId>,
}

/// Associates nodes with a trajectory generator, optionally relative to
/// another node's live position.
#[derive(Debug, Clone, PartialEq)]
pub struct MobilityBinding {
    spec: MobilitySpec,
    reference: Option<NodeId>,
}

impl MobilityBinding {
    pub fn new(spec: MobilitySpec) -> Self {
        Self { spec, reference: None }
    }

    pub fn relative_to(spec: MobilitySpec, reference: NodeId) -> Self {
        Self {
            spec,
            reference: Some(reference),
        }
    }

    pub fn kind(&self) -> MobilityKind {
        self.spec.kind
    }

    pub fn spec(&self) -> &MobilitySpec {
        &self.spec
    }

    pub fn reference(&self) -> Option<NodeId> {
        self.reference
    }

    /// Fails exactly when `install` would fail for fresh, unbound members
    pub fn check(&self, ctx: &SimContext) -> Result<(), MobilityError> {
        if let Some(reference) = self.reference {
            if !ctx.mobility.is_bound(reference) {
                return Err(MobilityError::UnboundReference { reference });
            }
        }
        self.spec.validate()
    }

    /// Attaches a trajectory to every node in `members`. Either all members
    /// are bound or, on error, none are.
    pub fn install(&self, members: &[NodeId], ctx: &mut SimContext) -> Result<(), MobilityError> {
        if let Some(reference) = self.reference {
            if members.contains(&reference) {
                return Err(MobilityError::SelfReference(reference));
            }
        }
        self.check(ctx)?;
        if let Some(bound) = members.iter().find(|m| ctx.mobility.is_bound(**m)) {
            return Err(MobilityError::AlreadyBound(*bound));
        }

        let horizon = ctx.horizon();
        let mut generated = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            let initial = self.spec.initial_position(index)?;
            let trajectory = generate_trajectory(self.spec.kind, &self.spec.options, initial, horizon, ctx.rng())?;
            generated.push((*member, trajectory));
        }

        for (member, trajectory) in generated {
            log::debug!(
                "Bound {} to {} at {}{}",
                member,
                self.spec.kind,
                trajectory.initial_position(),
                self.reference.map(|r| format!(" relative to {}", r)).unwrap_or_default()
            );
            ctx.mobility.bind(
                member,
                NodeMobility {
                    kind: self.spec.kind,
                    trajectory,
                    reference: self.reference,
                },
            );
        }
        Ok(())
    }
}

/// Installed trajectories of every node, keyed by handle
#[derive(Debug, Default, Clone)]
pub struct MobilityRegistry {
    entries: HashMap<NodeId, NodeMobility>,
}

impl MobilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeMobility> {
        self.entries.get(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn bind(&mut self, node: NodeId, mobility: NodeMobility) {
        self.entries.insert(node, mobility);
    }

    pub fn unbind(&mut self, node: NodeId) -> Option<NodeMobility> {
        self.entries.remove(&node)
    }

    /// Position in the node's own frame, ignoring any reference
    pub fn local_position_at(&self, node: NodeId, t: f64) -> Result<Vector, MobilityError> {
        self.entries
            .get(&node)
            .map(|entry| entry.trajectory.position_at(t))
            .ok_or(MobilityError::UnknownNode(node))
    }

    /// Absolute position at time `t`: the local position plus the evaluated
    /// position of every reference up the chain.
    pub fn position_at(&self, node: NodeId, t: f64) -> Result<Vector, MobilityError> {
        let mut entry = self.entries.get(&node).ok_or(MobilityError::UnknownNode(node))?;
        let mut position = entry.trajectory.position_at(t);
        let mut hops = 0;

        while let Some(reference) = entry.reference {
            hops += 1;
            if hops > self.entries.len() {
                return Err(MobilityError::ReferenceCycle(node));
            }
            entry = self
                .entries
                .get(&reference)
                .ok_or(MobilityError::UnboundReference { reference })?;
            position = position + entry.trajectory.position_at(t);
        }
        Ok(position)
    }

    /// References from `node` up to the first unreferenced ancestor
    pub fn reference_chain(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.entries.get(&node).and_then(|e| e.reference);
        while let Some(reference) = current {
            if chain.contains(&reference) {
                break;
            }
            chain.push(reference);
            current = self.entries.get(&reference).and_then(|e| e.reference);
        }
        chain
    }

    /// Shifts a node's whole trajectory; nodes referencing it follow
    pub fn translate(&mut self, node: NodeId, delta: Vector) -> Result<(), MobilityError> {
        let entry = self.entries.get_mut(&node).ok_or(MobilityError::UnknownNode(node))?;
        entry.trajectory.translate(delta);
        Ok(())
    }
}
