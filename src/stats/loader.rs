//! Loading flow records and address labels from disk.

use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::Deserialize;

use super::types::FlowRecord;
use crate::topology::TopologyDocument;

/// Either a bare array of records or an object with a `flows` array
#[derive(Deserialize)]
#[serde(untagged)]
enum FlowDocument {
    List(Vec<FlowRecord>),
    Wrapped { flows: Vec<FlowRecord> },
}

impl FlowDocument {
    fn into_records(self) -> Vec<FlowRecord> {
        match self {
            FlowDocument::List(records) | FlowDocument::Wrapped { flows: records } => records,
        }
    }
}

/// Load flow records from a JSON file, or YAML when the extension says so
pub fn load_flow_records(path: &Path) -> Result<Vec<FlowRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read flow records from {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let document: FlowDocument = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse flow records YAML {}", path.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse flow records JSON {}", path.display()))?
    };

    let records = document.into_records();
    log::info!("Loaded {} flow records from {}", records.len(), path.display());
    Ok(records)
}

/// Address to node label map from a `topology.json` written by `hiernet`
pub fn load_address_labels(path: &Path) -> Result<BTreeMap<IpAddr, String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read topology from {}", path.display()))?;
    let document: TopologyDocument =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse topology {}", path.display()))?;

    let labels: BTreeMap<IpAddr, String> = document
        .address_labels()
        .into_iter()
        .map(|(address, label)| (IpAddr::V4(address), label))
        .collect();
    log::debug!("Loaded {} address labels from {}", labels.len(), path.display());
    Ok(labels)
}
