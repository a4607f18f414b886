use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::ip::{mask_to_prefix, AddressPool, PoolError};
use crate::mobility::{MobilityKind, MobilityOptions, MobilitySpec, OptionValue};
use crate::traffic::{parse_data_rate, TrafficMode};

/// Shortest run the scenario accepts; shorter runs end before flows settle
pub const MIN_STOP_TIME: Duration = Duration::from_secs(10);

/// Complete scenario description, as read from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub backbone: BackboneConfig,
    /// One entry per nesting level below the backbone. Every member created at
    /// level `i` gets a child cluster described by `tiers[i]`.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceConfig>,
}

impl ScenarioConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.stop_time < MIN_STOP_TIME {
            return Err(ValidationError::InvalidGeneral(format!(
                "stop_time must be at least {}s, got {:?}",
                MIN_STOP_TIME.as_secs(),
                self.general.stop_time
            )));
        }

        let pool = self
            .backbone
            .addressing
            .pool()
            .map_err(|e| ValidationError::InvalidBackbone(e.to_string()))?;
        if self.backbone.nodes == 0 {
            return Err(ValidationError::InvalidBackbone("nodes must be at least 1".to_string()));
        }
        if self.backbone.nodes as u64 > pool.host_capacity() {
            return Err(ValidationError::InvalidBackbone(format!(
                "{} nodes do not fit a /{} subnet ({} hosts)",
                self.backbone.nodes,
                pool.prefix_len(),
                pool.host_capacity()
            )));
        }
        self.backbone
            .mobility
            .validate()
            .map_err(|e| ValidationError::InvalidBackbone(e.to_string()))?;

        for (index, tier) in self.tiers.iter().enumerate() {
            // The anchor borrowed from the parent needs an address too
            if tier.nodes as u64 + 1 > pool.host_capacity() {
                return Err(ValidationError::InvalidTier {
                    index,
                    reason: format!("{} nodes plus the anchor exceed {} hosts", tier.nodes, pool.host_capacity()),
                });
            }
            tier.mobility.validate().map_err(|e| ValidationError::InvalidTier {
                index,
                reason: e.to_string(),
            })?;
        }

        self.traffic.validate(self.general.stop_time)?;

        if let Some(trace) = &self.trace {
            if trace.interval.is_zero() {
                return Err(ValidationError::InvalidTrace("interval must be greater than zero".to_string()));
            }
        }

        Ok(())
    }

    /// Stop time in seconds
    pub fn horizon(&self) -> f64 {
        self.general.stop_time.as_secs_f64()
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            backbone: BackboneConfig::default(),
            tiers: default_tiers(),
            traffic: TrafficConfig::default(),
            trace: None,
        }
    }
}

/// Shared general configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(with = "humantime_serde")]
    pub stop_time: Duration,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Top-level router set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneConfig {
    pub nodes: usize,
    #[serde(default)]
    pub addressing: AddressingConfig,
    #[serde(default = "default_backbone_mobility")]
    pub mobility: MobilitySpec,
}

/// Address plan for the root pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    pub base: Ipv4Addr,
    /// Dotted netmask; takes precedence over `prefix_len` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Ipv4Addr>,
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,
    #[serde(default = "default_supernet_prefix")]
    pub supernet_prefix: u8,
}

impl AddressingConfig {
    pub fn prefix(&self) -> Result<u8, PoolError> {
        match self.mask {
            Some(mask) => mask_to_prefix(mask),
            None => Ok(self.prefix_len),
        }
    }

    /// Fresh pool for the root cluster
    pub fn pool(&self) -> Result<AddressPool, PoolError> {
        AddressPool::new(self.base, self.prefix()?, self.supernet_prefix)
    }
}

/// One nesting level below the backbone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Nodes created per child cluster, not counting the borrowed anchor
    pub nodes: usize,
    #[serde(default = "default_tier_mobility")]
    pub mobility: MobilitySpec,
}

/// Traffic planning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    #[serde(default)]
    pub mode: TrafficMode,
    #[serde(default = "default_traffic_start", with = "humantime_serde")]
    pub start: Duration,
    /// Defaults to the general stop time
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub stop: Option<Duration>,
    /// Constant bit rate, e.g. `100kb/s`
    #[serde(default = "default_data_rate")]
    pub data_rate: String,
    #[serde(default = "default_packet_size")]
    pub packet_size: u32,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl TrafficConfig {
    /// Flow window `(start, stop)` in seconds for a run ending at `stop_time`
    pub fn window(&self, stop_time: Duration) -> (f64, f64) {
        (self.start.as_secs_f64(), self.stop.unwrap_or(stop_time).as_secs_f64())
    }

    fn validate(&self, stop_time: Duration) -> Result<(), ValidationError> {
        parse_data_rate(&self.data_rate).map_err(ValidationError::InvalidTraffic)?;
        if self.packet_size == 0 {
            return Err(ValidationError::InvalidTraffic("packet_size must be greater than zero".to_string()));
        }
        let stop = self.stop.unwrap_or(stop_time);
        if self.start >= stop {
            return Err(ValidationError::InvalidTraffic(format!(
                "start {:?} must be before stop {:?}",
                self.start, stop
            )));
        }
        if stop > stop_time {
            return Err(ValidationError::InvalidTraffic(format!(
                "stop {:?} is after the simulation stop time {:?}",
                stop, stop_time
            )));
        }
        Ok(())
    }
}

/// Periodic position sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid backbone configuration: {0}")]
    InvalidBackbone(String),
    #[error("Invalid tier {index} configuration: {reason}")]
    InvalidTier { index: usize, reason: String },
    #[error("Invalid traffic configuration: {0}")]
    InvalidTraffic(String),
    #[error("Invalid trace configuration: {0}")]
    InvalidTrace(String),
}

fn default_seed() -> u64 {
    1
}

fn default_prefix_len() -> u8 {
    24
}

fn default_supernet_prefix() -> u8 {
    16
}

fn default_traffic_start() -> Duration {
    Duration::from_secs(1)
}

fn default_data_rate() -> String {
    "100kb/s".to_string()
}

fn default_packet_size() -> u32 {
    1472
}

fn default_port() -> u16 {
    9
}

fn default_tiers() -> Vec<TierConfig> {
    vec![TierConfig {
        nodes: 1,
        mobility: default_tier_mobility(),
    }]
}

/// Backbone routers start on a 5-wide grid and wander a 1 km square
fn default_backbone_mobility() -> MobilitySpec {
    MobilitySpec::new(MobilityKind::RandomDirection).with_options(
        MobilityOptions::new()
            .with("min_x", OptionValue::Number(20.0))
            .with("min_y", OptionValue::Number(20.0))
            .with("delta_x", OptionValue::Number(20.0))
            .with("delta_y", OptionValue::Number(20.0))
            .with("grid_width", OptionValue::Number(5.0))
            .with("layout", OptionValue::String("row_first".to_string()))
            .with("bounds", OptionValue::String("-500,500,-500,500".to_string()))
            .with("speed", OptionValue::Number(2.0))
            .with("pause", OptionValue::Number(0.2)),
    )
}

/// Leaf nodes start in a column at (0, j) and roam 10 m around their anchor
fn default_tier_mobility() -> MobilitySpec {
    MobilitySpec::new(MobilityKind::RandomDirection).with_options(
        MobilityOptions::new()
            .with("grid_width", OptionValue::Number(1.0))
            .with("delta_y", OptionValue::Number(1.0))
            .with("bounds", OptionValue::String("-10,10,-10,10".to_string()))
            .with("speed", OptionValue::Number(3.0))
            .with("pause", OptionValue::Number(0.4)),
    )
}

/// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            stop_time: Duration::from_secs(20),
            seed: default_seed(),
            log_level: Some("info".to_string()),
        }
    }
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            addressing: AddressingConfig::default(),
            mobility: default_backbone_mobility(),
        }
    }
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            base: Ipv4Addr::new(192, 168, 0, 0),
            mask: None,
            prefix_len: default_prefix_len(),
            supernet_prefix: default_supernet_prefix(),
        }
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            mode: TrafficMode::default(),
            start: default_traffic_start(),
            stop: None,
            data_rate: default_data_rate(),
            packet_size: default_packet_size(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.horizon(), 20.0);
        assert_eq!(config.traffic.window(config.general.stop_time), (1.0, 20.0));
    }

    #[test]
    fn test_scenario_parsing() {
        let yaml = r#"
general:
  stop_time: "30s"
  seed: 42
  log_level: debug
backbone:
  nodes: 4
  addressing:
    base: 10.1.0.0
    mask: 255.255.255.0
  mobility:
    kind: grid
    options:
      grid_width: 2
      delta_x: 50
tiers:
  - nodes: 3
    mobility:
      kind: fixed-list
      positions:
        - { x: 0, y: 0 }
        - { x: 0, y: 1 }
  - nodes: 1
traffic:
  mode: random-all-to-all
  start: 2s
  stop: 25s
  data_rate: 1Mb/s
trace:
  interval: 500ms
"#;

        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.seed, 42);
        assert_eq!(config.backbone.addressing.prefix().unwrap(), 24);
        assert_eq!(config.tiers.len(), 2);
        assert_eq!(config.tiers[0].mobility.kind, MobilityKind::FixedList);
        assert_eq!(config.tiers[1].mobility.kind, MobilityKind::RandomDirection);
        assert_eq!(config.traffic.mode, TrafficMode::RandomAllToAll);
        assert_eq!(config.traffic.window(config.general.stop_time), (2.0, 25.0));
        assert_eq!(config.trace.unwrap().interval, Duration::from_millis(500));
    }

    #[test]
    fn test_short_stop_time_rejected() {
        let mut config = ScenarioConfig::default();
        config.general.stop_time = Duration::from_secs(5);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));
    }

    #[test]
    fn test_oversized_tier_rejected() {
        let mut config = ScenarioConfig::default();
        config.tiers[0].nodes = 254;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTier { index: 0, .. })));
    }

    #[test]
    fn test_traffic_window_checked() {
        let mut config = ScenarioConfig::default();
        config.traffic.stop = Some(Duration::from_secs(30));
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTraffic(_))));

        config.traffic.stop = Some(Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTraffic(_))));

        config.traffic.stop = None;
        config.traffic.data_rate = "fast".to_string();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTraffic(_))));
    }

    #[test]
    fn test_fixed_list_tier_without_positions_rejected() {
        let mut config = ScenarioConfig::default();
        config.tiers[0].mobility = MobilitySpec::new(MobilityKind::FixedList);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTier { index: 0, .. })));
    }
}
