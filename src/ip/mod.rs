//! IP address allocation and management module.
//!
//! This module hands out per-cluster subnets from shared pools and keeps a
//! registry of which node owns each assigned address.

pub mod pool;
pub mod registry;

// Re-export commonly used types
pub use pool::{mask_to_prefix, AddressPool, AddressRange, PoolError, PoolId};
pub use registry::{AddressConflict, AddressRegistry};
