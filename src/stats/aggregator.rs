//! Per-flow metric derivation and per-source aggregation.
//!
//! The aggregator is a fold over flow records: partial aggregators built over
//! disjoint partitions combine with [`FlowStatsAggregator::merge`], so the
//! batch can be split across rayon workers and reduced at the end.

use std::collections::BTreeMap;
use std::net::IpAddr;

use log::{info, warn};
use rayon::prelude::*;

use super::types::*;

/// Derive the metrics of one record. Never fails: unusable inputs are
/// reported through the row's anomaly flags.
pub fn compute_flow_row(record: &FlowRecord) -> FlowRow {
    let mut anomalies = Vec::new();

    let duration = record.last_tx_time - record.first_tx_time;
    let degenerate = !(duration > 0.0 && record.last_tx_time > 0.0 && duration.is_finite());
    let (duration, bitrate_kbps, observed_window_fraction) = if degenerate {
        anomalies.push(FlowAnomaly::DegenerateFlow);
        (0.0, 0.0, 0.0)
    } else {
        (
            duration,
            (record.tx_bytes as f64 * 8.0) / duration / 1000.0,
            duration / record.last_tx_time,
        )
    };

    let mean_delay = Metric::ratio(record.delay_sum, record.rx_packets as f64);
    let mean_jitter = Metric::ratio(record.jitter_sum, record.rx_packets.saturating_sub(1) as f64);
    let loss_ratio = Metric::ratio(
        record.lost_packets as f64,
        record.rx_packets as f64 + record.lost_packets as f64,
    );
    for (metric, value) in [
        (MetricName::MeanDelay, mean_delay),
        (MetricName::MeanJitter, mean_jitter),
        (MetricName::LossRatio, loss_ratio),
    ] {
        if !value.is_defined() {
            anomalies.push(FlowAnomaly::DivideByZeroMetric { metric });
        }
    }

    if !anomalies.is_empty() {
        let flags: Vec<String> = anomalies.iter().map(|a| a.to_string()).collect();
        warn!("Flow {} flagged: {}", record.flow_id(), flags.join(", "));
    }

    FlowRow {
        flow: record.flow_id(),
        tx_bytes: record.tx_bytes,
        rx_bytes: record.rx_bytes,
        rx_packets: record.rx_packets,
        lost_packets: record.lost_packets,
        first_tx_time: record.first_tx_time,
        last_tx_time: record.last_tx_time,
        duration,
        mean_delay,
        mean_jitter,
        loss_ratio,
        bitrate_kbps,
        observed_window_fraction,
        weighted_traffic: bitrate_kbps * observed_window_fraction,
        anomalies,
    }
}

/// Partial aggregation state
#[derive(Debug, Default, Clone)]
pub struct FlowStatsAggregator {
    rows: Vec<FlowRow>,
    sources: BTreeMap<IpAddr, SourceAggregate>,
    pairs: BTreeMap<(IpAddr, IpAddr), PairAggregate>,
}

impl FlowStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequential fold over `records`
    pub fn ingest(records: &[FlowRecord]) -> FlowReport {
        let mut aggregator = Self::new();
        aggregator.extend(records);
        aggregator.finish()
    }

    /// Fold over rayon partitions of `records`, then merge the partial states
    pub fn ingest_parallel(records: &[FlowRecord]) -> FlowReport {
        records
            .par_iter()
            .fold(Self::new, |mut aggregator, record| {
                aggregator.push(record);
                aggregator
            })
            .reduce(Self::new, Self::merge)
            .finish()
    }

    pub fn push(&mut self, record: &FlowRecord) {
        let row = compute_flow_row(record);
        let flow = row.flow;

        let source = self.sources.entry(flow.source_address).or_insert_with(|| SourceAggregate {
            source_address: flow.source_address,
            source_label: None,
            weighted_traffic_sum: 0.0,
            flow_count: 0,
            degenerate_flows: 0,
        });
        source.weighted_traffic_sum += row.weighted_traffic;
        source.flow_count += 1;
        if row.is_degenerate() {
            source.degenerate_flows += 1;
        }

        let pair = self
            .pairs
            .entry((flow.source_address, flow.destination_address))
            .or_insert_with(|| PairAggregate {
                source_address: flow.source_address,
                destination_address: flow.destination_address,
                weighted_traffic_sum: 0.0,
                sample_count: 0,
            });
        pair.weighted_traffic_sum += row.weighted_traffic;
        pair.sample_count += 1;

        self.rows.push(row);
    }

    pub fn extend<'a, I: IntoIterator<Item = &'a FlowRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    /// Combine two partial states. Associative and commutative up to the
    /// order of the floating-point additions.
    pub fn merge(mut self, other: Self) -> Self {
        self.rows.extend(other.rows);
        for (address, theirs) in other.sources {
            match self.sources.get_mut(&address) {
                Some(ours) => {
                    ours.weighted_traffic_sum += theirs.weighted_traffic_sum;
                    ours.flow_count += theirs.flow_count;
                    ours.degenerate_flows += theirs.degenerate_flows;
                }
                None => {
                    self.sources.insert(address, theirs);
                }
            }
        }
        for (key, theirs) in other.pairs {
            match self.pairs.get_mut(&key) {
                Some(ours) => {
                    ours.weighted_traffic_sum += theirs.weighted_traffic_sum;
                    ours.sample_count += theirs.sample_count;
                }
                None => {
                    self.pairs.insert(key, theirs);
                }
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Seal the aggregation. Rows are ordered by five-tuple, then by time.
    pub fn finish(self) -> FlowReport {
        let mut flows = self.rows;
        flows.sort_by(|a, b| {
            a.flow
                .cmp(&b.flow)
                .then(a.first_tx_time.total_cmp(&b.first_tx_time))
                .then(a.last_tx_time.total_cmp(&b.last_tx_time))
                .then(a.tx_bytes.cmp(&b.tx_bytes))
        });

        let summary = FlowSummary {
            total_flows: flows.len(),
            total_sources: self.sources.len(),
            degenerate_flows: flows.iter().filter(|r| r.is_degenerate()).count(),
            undefined_metrics: flows
                .iter()
                .flat_map(|r| r.anomalies.iter())
                .filter(|a| matches!(a, FlowAnomaly::DivideByZeroMetric { .. }))
                .count(),
            // Counters come from outside; saturate rather than wrap
            total_tx_bytes: flows.iter().map(|r| r.tx_bytes).fold(0, u64::saturating_add),
            total_rx_bytes: flows.iter().map(|r| r.rx_bytes).fold(0, u64::saturating_add),
            total_lost_packets: flows.iter().map(|r| r.lost_packets).fold(0, u64::saturating_add),
            total_weighted_traffic: self.sources.values().map(|s| s.weighted_traffic_sum).sum(),
        };

        info!(
            "Aggregated {} flows from {} sources ({} degenerate, {} undefined metrics)",
            summary.total_flows, summary.total_sources, summary.degenerate_flows, summary.undefined_metrics
        );

        FlowReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            summary,
            flows,
            sources: self.sources.into_values().collect(),
            pairs: self.pairs.into_values().collect(),
        }
    }
}

impl FlowReport {
    /// Attach node labels to the source table
    pub fn label_sources(&mut self, labels: &BTreeMap<IpAddr, String>) {
        for source in &mut self.sources {
            source.source_label = labels.get(&source.source_address).cloned();
        }
    }

    pub fn source(&self, address: IpAddr) -> Option<&SourceAggregate> {
        self.sources.iter().find(|s| s.source_address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn record(source: &str, destination: &str, tx_bytes: u64, first: f64, last: f64) -> FlowRecord {
        FlowRecord {
            source_address: source.parse().unwrap(),
            destination_address: destination.parse().unwrap(),
            protocol: 17,
            source_port: 49153,
            destination_port: 9,
            tx_bytes,
            rx_bytes: tx_bytes,
            tx_packets: 10,
            rx_packets: 10,
            lost_packets: 0,
            first_tx_time: first,
            last_tx_time: last,
            delay_sum: 0.05,
            jitter_sum: 0.009,
        }
    }

    fn random_records(seed: u64, count: usize) -> Vec<FlowRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let first = rng.gen_range(0.0..5.0);
                let mut r = record(
                    &format!("10.0.{}.1", rng.gen_range(0..6)),
                    &format!("10.0.{}.2", rng.gen_range(0..6)),
                    rng.gen_range(0..1_000_000),
                    first,
                    first + rng.gen_range(0.0..15.0),
                );
                r.rx_packets = rng.gen_range(0..50);
                r.lost_packets = rng.gen_range(0..5);
                r.source_port = rng.gen_range(49152..49200);
                r
            })
            .collect()
    }

    fn assert_same_sources(a: &FlowReport, b: &FlowReport) {
        assert_eq!(a.sources.len(), b.sources.len());
        for (x, y) in a.sources.iter().zip(&b.sources) {
            assert_eq!(x.source_address, y.source_address);
            assert_eq!(x.flow_count, y.flow_count);
            let tolerance = 1e-9 * x.weighted_traffic_sum.abs().max(1.0);
            assert!((x.weighted_traffic_sum - y.weighted_traffic_sum).abs() < tolerance);
        }
    }

    #[test]
    fn test_weighted_traffic_per_source() {
        let records = vec![
            record("10.0.0.1", "10.0.0.2", 1000, 0.0, 1.0),
            record("10.0.0.1", "10.0.0.3", 2000, 0.0, 2.0),
        ];
        let report = FlowStatsAggregator::ingest(&records);

        assert!((report.flows[0].bitrate_kbps - 8.0).abs() < 1e-12);
        assert!((report.flows[1].bitrate_kbps - 8.0).abs() < 1e-12);
        let source = report.source("10.0.0.1".parse().unwrap()).unwrap();
        assert!((source.weighted_traffic_sum - 16.0).abs() < 1e-12);
        assert_eq!(source.flow_count, 2);
        assert_eq!(report.pairs.len(), 2);
        assert!((report.summary.total_weighted_traffic - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_observed_window_fraction() {
        let row = compute_flow_row(&record("10.0.0.1", "10.0.0.2", 5000, 2.0, 10.0));
        assert_eq!(row.duration, 8.0);
        assert_eq!(row.bitrate_kbps, 5.0);
        assert_eq!(row.observed_window_fraction, 0.8);
        assert!((row.weighted_traffic - 4.0).abs() < 1e-12);
        assert!((row.mean_delay.value().unwrap() - 0.005).abs() < 1e-15);
        assert!((row.mean_jitter.value().unwrap() - 0.001).abs() < 1e-15);
        assert_eq!(row.loss_ratio, Metric::Value(0.0));
        assert!(row.anomalies.is_empty());
    }

    #[test]
    fn test_no_received_packets_is_undefined() {
        let mut r = record("10.0.0.1", "10.0.0.2", 1000, 0.0, 1.0);
        r.rx_packets = 0;
        r.lost_packets = 4;
        let row = compute_flow_row(&r);

        assert_eq!(row.mean_delay, Metric::Undefined);
        assert_eq!(row.mean_jitter, Metric::Undefined);
        assert_eq!(row.loss_ratio, Metric::Value(1.0));
        assert!(row.anomalies.contains(&FlowAnomaly::DivideByZeroMetric {
            metric: MetricName::MeanDelay
        }));
        assert!(row.anomalies.contains(&FlowAnomaly::DivideByZeroMetric {
            metric: MetricName::MeanJitter
        }));
        assert_eq!(row.mean_delay.to_string(), "NaN");
        assert_eq!(serde_json::to_value(row.mean_delay).unwrap(), serde_json::Value::Null);
        // Rate metrics are unaffected
        assert_eq!(row.bitrate_kbps, 8.0);
    }

    #[test]
    fn test_single_packet_jitter_undefined() {
        let mut r = record("10.0.0.1", "10.0.0.2", 1000, 0.0, 1.0);
        r.rx_packets = 1;
        let row = compute_flow_row(&r);
        assert!(row.mean_delay.is_defined());
        assert_eq!(row.mean_jitter, Metric::Undefined);
        assert_eq!(row.anomalies.len(), 1);
    }

    #[test]
    fn test_degenerate_flows_reported_as_zero() {
        let records = vec![
            record("10.0.0.1", "10.0.0.2", 1000, 3.0, 3.0),
            record("10.0.0.1", "10.0.0.2", 1000, 0.0, 0.0),
            record("10.0.0.1", "10.0.0.2", 1000, 4.0, 2.0),
            record("10.0.0.1", "10.0.0.3", 1000, 0.0, 1.0),
        ];
        let report = FlowStatsAggregator::ingest(&records);

        let degenerate: Vec<_> = report.flows.iter().filter(|r| r.is_degenerate()).collect();
        assert_eq!(degenerate.len(), 3);
        for row in degenerate {
            assert_eq!((row.duration, row.bitrate_kbps, row.weighted_traffic), (0.0, 0.0, 0.0));
        }
        let source = report.source("10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(source.flow_count, 4);
        assert_eq!(source.degenerate_flows, 3);
        assert!((source.weighted_traffic_sum - 8.0).abs() < 1e-12);
        assert_eq!(report.summary.degenerate_flows, 3);
    }

    #[test]
    fn test_order_independent() {
        for seed in 0..10 {
            let records = random_records(seed, 200);
            let mut shuffled = records.clone();
            shuffled.shuffle(&mut StdRng::seed_from_u64(seed + 100));

            let a = FlowStatsAggregator::ingest(&records);
            let b = FlowStatsAggregator::ingest(&shuffled);
            assert_same_sources(&a, &b);
            assert_eq!(a.flows, b.flows);
            assert_eq!(a.summary.total_flows, 200);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let records = random_records(42, 1000);
        let sequential = FlowStatsAggregator::ingest(&records);
        let parallel = FlowStatsAggregator::ingest_parallel(&records);
        assert_same_sources(&sequential, &parallel);
        assert_eq!(sequential.flows, parallel.flows);
        assert_eq!(sequential.pairs.len(), parallel.pairs.len());
    }

    #[test]
    fn test_merge_is_associative() {
        let records = random_records(3, 90);
        let part = |range: std::ops::Range<usize>| {
            let mut aggregator = FlowStatsAggregator::new();
            aggregator.extend(&records[range]);
            aggregator
        };

        let left = part(0..30).merge(part(30..60)).merge(part(60..90)).finish();
        let right = part(60..90).merge(part(0..30).merge(part(30..60))).finish();
        assert_same_sources(&left, &right);
        assert_eq!(left.summary.total_flows, 90);
    }

    #[test]
    fn test_empty_batch() {
        let report = FlowStatsAggregator::ingest(&[]);
        assert!(report.flows.is_empty());
        assert!(report.sources.is_empty());
        assert_eq!(report.summary, FlowSummary::default());
    }

    #[test]
    fn test_huge_counters_do_not_abort_batch() {
        let mut a = record("10.0.0.1", "10.0.0.2", u64::MAX, 0.0, 1.0);
        a.rx_packets = u64::MAX;
        a.lost_packets = 1;
        a.rx_bytes = u64::MAX;
        let mut b = record("10.0.0.1", "10.0.0.3", u64::MAX, 0.0, 2.0);
        b.lost_packets = u64::MAX;
        b.rx_bytes = 10;

        let report = FlowStatsAggregator::ingest(&[a, b]);
        assert_eq!(report.flows.len(), 2);
        assert!(report.flows[0].loss_ratio.is_defined());
        assert_eq!(report.summary.total_tx_bytes, u64::MAX);
        assert_eq!(report.summary.total_rx_bytes, u64::MAX);
        assert_eq!(report.summary.total_lost_packets, u64::MAX);
    }

    #[test]
    fn test_label_sources() {
        let records = vec![record("192.168.1.1", "192.168.5.2", 1000, 0.0, 1.0)];
        let mut report = FlowStatsAggregator::ingest(&records);
        let labels = BTreeMap::from([("192.168.1.1".parse().unwrap(), "n10".to_string())]);
        report.label_sources(&labels);
        assert_eq!(report.sources[0].source_label.as_deref(), Some("n10"));
    }
}
