//! Programmatic key to strata
//!
//! Queries vegetation, ground-cover and environment data, computes indicator
//! characters and writes revised physiography labels per site visit.
//!
//! Usage:
//!   cargo run --bin strata_key -- --config strata.json --root /data/npra

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use strata_key_rust::logging::init_tracing;
use strata_key_rust::{run_to_file, QuerySourceConfig, StrataConfig};

#[derive(Parser, Debug)]
#[command(name = "strata_key", about = "Assign revised physiography to survey site visits")]
struct Args {
    /// JSON config; built-in NPR-A defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder that relative config paths are resolved against
    #[arg(long)]
    root: Option<PathBuf>,

    /// Read query results from `<dir>/<query>.csv` instead of the configured source
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Override the output CSV
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write join diagnostics and label counts as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => StrataConfig::load(path)?,
        None => StrataConfig::default(),
    };
    if let Some(dir) = args.snapshot_dir {
        config.source = QuerySourceConfig::CsvSnapshot { dir };
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(root) = &args.root {
        config = config.rooted(root);
    }

    let outcome = run_to_file(&config)?;

    for report in outcome.ledger.reports() {
        tracing::info!(
            join = report.name.as_str(),
            kind = %report.kind,
            rows = report.output_rows,
            dropped = report.dropped_left_rows,
            "join summary"
        );
    }
    for (label, rows) in outcome.label_counts.iter() {
        println!("  {:<12} {}", label, rows);
    }
    println!("Wrote {} rows to {:?}", outcome.table.height(), config.output);

    if let Some(report) = &args.report {
        outcome.write_report(report)?;
        println!("Run report: {:?}", report);
    }

    Ok(())
}
