//! Report generation for flow statistics.
//!
//! Delimited tables for spreadsheets and plotting scripts, plus JSON and
//! human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::types::*;

const FLOW_COLUMNS: [&str; 17] = [
    "source_address",
    "destination_address",
    "protocol",
    "source_port",
    "destination_port",
    "tx_bytes",
    "rx_bytes",
    "first_tx_time",
    "last_tx_time",
    "duration",
    "mean_delay",
    "mean_jitter",
    "lost_packets",
    "loss_ratio",
    "bitrate_kbps",
    "weighted_traffic",
    "anomalies",
];

const SOURCE_COLUMNS: [&str; 5] = [
    "source_address",
    "source_label",
    "weighted_traffic_sum",
    "flow_count",
    "degenerate_flows",
];

const PAIR_COLUMNS: [&str; 4] = ["source_address", "destination_address", "weighted_traffic_sum", "sample_count"];

fn header(columns: &[&str], delimiter: char) -> String {
    columns.join(&delimiter.to_string())
}

/// Flow table, one line per flow, undefined metrics printed as `NaN`
pub fn format_flow_table(report: &FlowReport, delimiter: char) -> String {
    let d = delimiter;
    let mut lines = vec![header(&FLOW_COLUMNS, d)];
    for row in &report.flows {
        let anomalies: Vec<String> = row.anomalies.iter().map(|a| a.to_string()).collect();
        lines.push(format!(
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{:.6}{d}{:.6}{d}{:.6}{d}{:.6}{d}{:.6}{d}{}{d}{:.6}{d}{:.3}{d}{:.3}{d}{}",
            row.flow.source_address,
            row.flow.destination_address,
            row.flow.protocol,
            row.flow.source_port,
            row.flow.destination_port,
            row.tx_bytes,
            row.rx_bytes,
            row.first_tx_time,
            row.last_tx_time,
            row.duration,
            row.mean_delay,
            row.mean_jitter,
            row.lost_packets,
            row.loss_ratio,
            row.bitrate_kbps,
            row.weighted_traffic,
            anomalies.join("+"),
        ));
    }
    lines.join("\n") + "\n"
}

/// Per-source aggregate table
pub fn format_source_table(report: &FlowReport, delimiter: char) -> String {
    let d = delimiter;
    let mut lines = vec![header(&SOURCE_COLUMNS, d)];
    for source in &report.sources {
        lines.push(format!(
            "{}{d}{}{d}{:.3}{d}{}{d}{}",
            source.source_address,
            source.source_label.as_deref().unwrap_or(""),
            source.weighted_traffic_sum,
            source.flow_count,
            source.degenerate_flows,
        ));
    }
    lines.join("\n") + "\n"
}

/// Per-pair aggregate table
pub fn format_pair_table(report: &FlowReport, delimiter: char) -> String {
    let d = delimiter;
    let mut lines = vec![header(&PAIR_COLUMNS, d)];
    for pair in &report.pairs {
        lines.push(format!(
            "{}{d}{}{d}{:.3}{d}{}",
            pair.source_address, pair.destination_address, pair.weighted_traffic_sum, pair.sample_count,
        ));
    }
    lines.join("\n") + "\n"
}

/// Write `flows.csv`, `sources.csv` and `pairs.csv` into `output_dir`
pub fn write_tables(report: &FlowReport, output_dir: &Path, delimiter: char) -> Result<()> {
    let tables = [
        ("flows.csv", format_flow_table(report, delimiter)),
        ("sources.csv", format_source_table(report, delimiter)),
        ("pairs.csv", format_pair_table(report, delimiter)),
    ];
    for (name, content) in tables {
        write_table(&output_dir.join(name), &content)?;
    }
    Ok(())
}

pub fn write_table(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write table to {}", path.display()))?;
    log::info!("Table written to {}", path.display());
    Ok(())
}

/// Generate JSON report
pub fn generate_json_report(report: &FlowReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate human-readable text report
pub fn generate_text_report(report: &FlowReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, format_text_report(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

pub fn format_text_report(report: &FlowReport) -> String {
    let summary = &report.summary;
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(80));
    lines.push("                          FLOW STATISTICS REPORT".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    lines.push(format!("Generated: {}", report.generated_at));
    lines.push(format!("Flows: {}", summary.total_flows));
    lines.push(format!("Sources: {}", summary.total_sources));
    lines.push(format!("Transmitted: {} bytes", summary.total_tx_bytes));
    lines.push(format!("Received: {} bytes", summary.total_rx_bytes));
    lines.push(format!("Lost packets: {}", summary.total_lost_packets));
    lines.push(format!("Total weighted traffic: {:.3} kbps", summary.total_weighted_traffic));
    lines.push(String::new());

    if summary.degenerate_flows > 0 || summary.undefined_metrics > 0 {
        lines.push("Anomalies:".to_string());
        lines.push(format!(
            "  Degenerate flows: {} (reported with zero duration and bitrate)",
            summary.degenerate_flows
        ));
        lines.push(format!(
            "  Undefined metrics: {} (reported as NaN / null)",
            summary.undefined_metrics
        ));
        lines.push(String::new());
    }

    lines.push("-".repeat(80));
    lines.push("Traffic by source".to_string());
    lines.push("-".repeat(80));
    let mut sources: Vec<&SourceAggregate> = report.sources.iter().collect();
    sources.sort_by(|a, b| b.weighted_traffic_sum.total_cmp(&a.weighted_traffic_sum));
    for source in sources {
        let label = source
            .source_label
            .as_ref()
            .map(|l| format!(" ({})", l))
            .unwrap_or_default();
        lines.push(format!(
            "  {}{:<8} {:>12.3} kbps  {} flows",
            source.source_address, label, source.weighted_traffic_sum, source.flow_count
        ));
    }
    lines.push(String::new());

    let flagged: Vec<&FlowRow> = report.flows.iter().filter(|r| !r.anomalies.is_empty()).collect();
    if !flagged.is_empty() {
        lines.push("-".repeat(80));
        lines.push("Flagged flows".to_string());
        lines.push("-".repeat(80));
        for row in flagged {
            let anomalies: Vec<String> = row.anomalies.iter().map(|a| a.to_string()).collect();
            lines.push(format!("  {}: {}", row.flow, anomalies.join(", ")));
        }
        lines.push(String::new());
    }

    lines.push("=".repeat(80));
    lines.join("\n") + "\n"
}

/// Print a short summary to stdout
pub fn print_summary(report: &FlowReport) {
    let summary = &report.summary;
    println!();
    println!("=== FLOW STATISTICS SUMMARY ===");
    println!();
    println!("Flows:    {}", summary.total_flows);
    println!("Sources:  {}", summary.total_sources);
    println!("Weighted traffic: {:.3} kbps", summary.total_weighted_traffic);
    if summary.degenerate_flows > 0 {
        println!("Degenerate flows: {}", summary.degenerate_flows);
    }
    if summary.undefined_metrics > 0 {
        println!("Undefined metrics: {}", summary.undefined_metrics);
    }
    if let Some(top) = report
        .sources
        .iter()
        .max_by(|a, b| a.weighted_traffic_sum.total_cmp(&b.weighted_traffic_sum))
    {
        println!(
            "Top source: {} ({:.3} kbps over {} flows)",
            top.source_label.as_deref().unwrap_or(&top.source_address.to_string()),
            top.weighted_traffic_sum,
            top.flow_count
        );
    }
    println!();
}
