//! Core data types for flow statistics.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Simulation timestamp in seconds since the start of the run
pub type SimTime = f64;

/// Five-tuple identifying a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId {
    pub source_address: IpAddr,
    pub destination_address: IpAddr,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.source_address, self.source_port, self.destination_address, self.destination_port, self.protocol
        )
    }
}

/// Raw per-flow counters exported by the simulator after a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub source_address: IpAddr,
    pub destination_address: IpAddr,
    #[serde(default = "default_protocol")]
    pub protocol: u8,
    #[serde(default)]
    pub source_port: u16,
    #[serde(default)]
    pub destination_port: u16,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub first_tx_time: SimTime,
    pub last_tx_time: SimTime,
    /// Sum of end-to-end delays of received packets, in seconds
    #[serde(default)]
    pub delay_sum: f64,
    /// Sum of delay differences between consecutive received packets, in seconds
    #[serde(default)]
    pub jitter_sum: f64,
}

fn default_protocol() -> u8 {
    17
}

impl FlowRecord {
    pub fn flow_id(&self) -> FlowId {
        FlowId {
            source_address: self.source_address,
            destination_address: self.destination_address,
            protocol: self.protocol,
            source_port: self.source_port,
            destination_port: self.destination_port,
        }
    }
}

/// A derived value that may be undefined for the inputs it came from.
///
/// Serialized as a number or `null`; printed as the number or `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Metric {
    Value(f64),
    #[default]
    Undefined,
}

impl Metric {
    /// `numerator / denominator`, undefined when the denominator is zero
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Metric::Undefined
        } else {
            Metric::Value(numerator / denominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Value(_))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, f.precision()) {
            (Metric::Value(v), Some(precision)) => write!(f, "{:.*}", precision, v),
            (Metric::Value(v), None) => write!(f, "{}", v),
            (Metric::Undefined, _) => write!(f, "NaN"),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.map_or(Metric::Undefined, Metric::Value))
    }
}

/// Per-flow metrics that can be undefined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    MeanDelay,
    MeanJitter,
    LossRatio,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricName::MeanDelay => write!(f, "mean_delay"),
            MetricName::MeanJitter => write!(f, "mean_jitter"),
            MetricName::LossRatio => write!(f, "loss_ratio"),
        }
    }
}

/// Recoverable issue found while deriving a flow's metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowAnomaly {
    /// Active window of zero or negative length; rate metrics are reported as 0
    DegenerateFlow,
    /// A metric whose denominator was zero; reported as undefined
    DivideByZeroMetric { metric: MetricName },
}

impl fmt::Display for FlowAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAnomaly::DegenerateFlow => write!(f, "degenerate_flow"),
            FlowAnomaly::DivideByZeroMetric { metric } => write!(f, "undefined_{}", metric),
        }
    }
}

/// Derived per-flow metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRow {
    pub flow: FlowId,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub first_tx_time: SimTime,
    pub last_tx_time: SimTime,
    pub duration: f64,
    pub mean_delay: Metric,
    pub mean_jitter: Metric,
    pub loss_ratio: Metric,
    pub bitrate_kbps: f64,
    /// Share of the elapsed run, up to the last transmission, the flow was active
    pub observed_window_fraction: f64,
    pub weighted_traffic: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<FlowAnomaly>,
}

impl FlowRow {
    pub fn is_degenerate(&self) -> bool {
        self.anomalies.contains(&FlowAnomaly::DegenerateFlow)
    }
}

/// Weighted traffic summed over every flow sharing a source address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAggregate {
    pub source_address: IpAddr,
    /// Node label resolved from a topology document, e.g. `n12`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    pub weighted_traffic_sum: f64,
    pub flow_count: usize,
    #[serde(default)]
    pub degenerate_flows: usize,
}

/// Weighted traffic summed over repeated observations of one endpoint pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAggregate {
    pub source_address: IpAddr,
    pub destination_address: IpAddr,
    pub weighted_traffic_sum: f64,
    pub sample_count: usize,
}

/// Totals over the whole batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub total_flows: usize,
    pub total_sources: usize,
    pub degenerate_flows: usize,
    pub undefined_metrics: usize,
    pub total_tx_bytes: u64,
    pub total_rx_bytes: u64,
    pub total_lost_packets: u64,
    pub total_weighted_traffic: f64,
}

/// Output of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowReport {
    pub generated_at: String,
    pub summary: FlowSummary,
    pub flows: Vec<FlowRow>,
    pub sources: Vec<SourceAggregate>,
    pub pairs: Vec<PairAggregate>,
}
