//! # Hiernet - Hierarchical topology builder for mixed wireless simulations
//!
//! This library builds nested ad-hoc network scenarios and aggregates the
//! per-flow counters a simulation run produces.
//!
//! ## Overview
//!
//! A scenario is a tree of clusters. The root cluster is a backbone of
//! routers; every member of a cluster anchors a child cluster one tier down.
//! Each cluster gets its own subnet from a shared address pool and its own
//! mobility model, with member positions expressed relative to the anchor.
//!
//! ## Architecture
//!
//! - `config`: Scenario structures and validation
//! - `config_loader`: Scenario file loading and CLI overrides
//! - `context`: Seeded simulation context (node ids, addresses, mobility)
//! - `ip`: Subnet pools and address registry
//! - `mobility`: Position allocation, trajectories and reference chains
//! - `topology`: Clusters, hierarchy builder and the JSON snapshot
//! - `traffic`: Flow assignment between nodes
//! - `stats`: Flow statistics aggregation and reports
//! - `utils`: Topology validation
//! - `orchestrator`: End-to-end scenario generation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use hiernet::{config_loader, orchestrator};
//!
//! let config = config_loader::load_config(Path::new("scenario.yaml"))?;
//! let scenario = orchestrator::generate_scenario(&config, Path::new("scenario_output"))?;
//!
//! // scenario_output now contains topology.json and traffic_plan.json
//! println!("{} flows planned", scenario.plan.len());
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   stop_time: "20s"
//!   seed: 1
//!
//! backbone:
//!   nodes: 10
//!   addressing:
//!     base: 192.168.0.0
//!     prefix_len: 24
//!   mobility:
//!     kind: random-direction
//!
//! tiers:
//!   - nodes: 1
//!     mobility:
//!       kind: random-waypoint
//!
//! traffic:
//!   mode: fixed-remote
//!   data_rate: "100kb/s"
//! ```
//!
//! ## Error Handling
//!
//! Library modules return typed errors built with `thiserror`; the loader,
//! orchestrator and binaries wrap them with `color_eyre` context.

pub mod config;
pub mod config_loader;
pub mod context;
pub mod ip;
pub mod mobility;
pub mod orchestrator;
pub mod stats;
pub mod topology;
pub mod traffic;
pub mod utils;
