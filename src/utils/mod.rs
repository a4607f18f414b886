//! Utility functions and helpers.

pub mod validation;

pub use validation::{validate_anchor_consistency, validate_disjoint_subnets, validate_topology};
