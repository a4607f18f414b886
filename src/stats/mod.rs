//! Post-run flow statistics.
//!
//! Turns the raw per-flow counters exported by the simulator into per-flow
//! metrics, per-source and per-pair aggregates, and the reports built on them.

pub mod aggregator;
pub mod loader;
pub mod report;
pub mod types;

pub use aggregator::{compute_flow_row, FlowStatsAggregator};
pub use loader::{load_address_labels, load_flow_records};
pub use report::{generate_json_report, generate_text_report, write_tables};
pub use types::*;
