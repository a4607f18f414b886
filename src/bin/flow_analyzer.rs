//! Flow statistics CLI for hiernet scenarios.
//!
//! Reads the per-flow counters exported after a simulation run and writes
//! per-flow, per-source and per-pair tables plus JSON and text reports.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};

use hiernet::stats::{self, FlowRecord, FlowReport, FlowStatsAggregator};

#[derive(Parser)]
#[command(name = "flow-analyzer")]
#[command(about = "Flow statistics aggregation for hiernet simulations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Flow records exported by the simulator (JSON, or YAML by extension)
    #[arg(short, long, default_value = "flows.json")]
    input: PathBuf,

    /// Output directory for tables and reports
    #[arg(short, long, default_value = "analysis_output")]
    output: PathBuf,

    /// topology.json written by hiernet, used to label source addresses
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Field delimiter for the tables
    #[arg(short, long, default_value = ",")]
    delimiter: char,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the records and write every table and report
    Report {
        /// Leave out the per-pair table
        #[arg(long)]
        no_pairs: bool,

        /// Aggregate on the calling thread only
        #[arg(long)]
        sequential: bool,
    },

    /// Print summary statistics only
    Summary,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }
    if cli.delimiter == '+' || cli.delimiter == '\n' {
        return Err(eyre!("Delimiter {:?} clashes with the table format", cli.delimiter));
    }

    let records = stats::load_flow_records(&cli.input)?;

    match cli.command {
        Commands::Report { no_pairs, sequential } => {
            let report = aggregate(&records, cli.topology.as_deref(), sequential)?;

            fs::create_dir_all(&cli.output)
                .with_context(|| format!("Failed to create output directory: {}", cli.output.display()))?;

            if no_pairs {
                stats::report::write_table(
                    &cli.output.join("flows.csv"),
                    &stats::report::format_flow_table(&report, cli.delimiter),
                )?;
                stats::report::write_table(
                    &cli.output.join("sources.csv"),
                    &stats::report::format_source_table(&report, cli.delimiter),
                )?;
            } else {
                stats::write_tables(&report, &cli.output, cli.delimiter)?;
            }
            stats::generate_json_report(&report, &cli.output.join("report.json"))?;
            stats::generate_text_report(&report, &cli.output.join("report.txt"))?;
            stats::report::print_summary(&report);

            log::info!("Analysis complete. Reports written to {}", cli.output.display());
        }
        Commands::Summary => {
            let report = aggregate(&records, cli.topology.as_deref(), false)?;

            println!("\n=== FLOW DATA SUMMARY ===\n");
            println!("Input: {}", cli.input.display());
            println!("Records: {}", records.len());
            println!(
                "  With losses: {}",
                records.iter().filter(|r| r.lost_packets > 0).count()
            );
            println!(
                "  Nothing received: {}",
                records.iter().filter(|r| r.rx_packets == 0).count()
            );
            stats::report::print_summary(&report);
        }
    }

    Ok(())
}

fn aggregate(records: &[FlowRecord], topology: Option<&Path>, sequential: bool) -> Result<FlowReport> {
    log::info!("Aggregating {} flow records...", records.len());
    let mut report = if sequential {
        FlowStatsAggregator::ingest(records)
    } else {
        FlowStatsAggregator::ingest_parallel(records)
    };

    if let Some(path) = topology {
        let labels = stats::load_address_labels(path)?;
        report.label_sources(&labels);
    }
    Ok(report)
}
