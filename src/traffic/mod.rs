//! Traffic planning.
//!
//! Produces constant-bit-rate flow descriptors between cluster members. The
//! plan is handed to the external simulation engine; nothing here runs traffic.

pub mod plan;
pub mod rate;

pub use plan::{FlowDescriptor, FlowParameters, TrafficError, TrafficMode, TrafficPlan};
pub use rate::{format_data_rate, parse_data_rate};
