//! Standardize site photo file names
//!
//! Applies the ordered rename passes (site prefixes, dates, descriptor
//! codes) to every photo below the photo root.
//!
//! Usage:
//!   cargo run --bin standardize_photo_names -- --root npra_photos --dry-run

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use strata_key_rust::logging::init_tracing;
use strata_key_rust::photos::{PhotoRenamer, RenamePlan};
use strata_key_rust::PhotoRenameConfig;

#[derive(Parser, Debug)]
#[command(name = "standardize_photo_names", about = "Rename site photos to the naming standard")]
struct Args {
    /// JSON config with custom passes; NPR-A rules when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the photo root folder
    #[arg(long)]
    root: Option<PathBuf>,

    /// Print planned renames without touching files
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PhotoRenameConfig::load(path)?,
        None => PhotoRenameConfig::default(),
    };
    if let Some(root) = args.root {
        config.photo_root = root;
    }

    let plan = RenamePlan::compile(&config.passes)?;
    let summary = PhotoRenamer::new(plan, &config.extension)
        .dry_run(args.dry_run)
        .run(&config.photo_root)?;

    println!(
        "Examined {} files, renamed {}, skipped {}",
        summary.examined, summary.renamed, summary.skipped
    );
    Ok(())
}
