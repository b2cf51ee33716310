//! Create site photo HTML pages
//!
//! Writes one gallery page per site folder, either from the photo list CSV
//! or by scanning a photo folder tree.
//!
//! Usage:
//!   cargo run --bin create_photo_html -- --photo-list AIM_NPRA_Photo_List.csv

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use strata_key_rust::gallery::{write_gallery, PhotoIndex};
use strata_key_rust::logging::init_tracing;
use strata_key_rust::GalleryConfig;

#[derive(Parser, Debug)]
#[command(name = "create_photo_html", about = "Generate per-site photo gallery pages")]
struct Args {
    /// JSON config; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the photo list CSV
    #[arg(long)]
    photo_list: Option<PathBuf>,

    /// Build the index from `<dir>/<site>/*.<extension>` instead of a photo list
    #[arg(long, conflicts_with = "photo_list")]
    scan_dir: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    url_root: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GalleryConfig::load(path)?,
        None => GalleryConfig::default(),
    };
    if let Some(list) = args.photo_list {
        config.photo_list = list;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(url_root) = args.url_root {
        config.url_root = url_root;
    }

    let index = match &args.scan_dir {
        Some(dir) => PhotoIndex::scan(dir, &config.extension)?,
        None => PhotoIndex::load(&config.photo_list, &config.folder_column, &config.image_column)?,
    };

    let pages = write_gallery(&index, &config.url_root, &config.output_dir)?;
    println!("Wrote {} pages to {:?}", pages, config.output_dir);
    Ok(())
}
