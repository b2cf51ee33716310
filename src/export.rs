//! Column selection and CSV output
//!
//! Output is all-or-nothing: the table is written next to the destination
//! and renamed into place only once the writer has finished.

use crate::error::StrataError;
use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Select `columns` in order, failing with every missing name at once
pub fn select_export(df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    let present: FxHashSet<&str> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();

    let missing: Vec<String> = columns
        .iter()
        .filter(|c| !present.contains(c.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(StrataError::MissingExportColumns(missing).into());
    }

    df.select(columns.iter().map(|c| c.as_str()))
        .with_context(|| "Failed to select export columns")
}

/// Write `df` as comma-separated UTF-8 with a header row and no index
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output folder: {:?}", parent))?;
    }

    let partial = partial_path(path);
    let written = write_partial(df, &partial);
    if let Err(err) = written {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    fs::rename(&partial, path)
        .with_context(|| format!("Failed to move {:?} into place at {:?}", partial, path))?;

    tracing::info!(rows = df.height(), "exported {:?}", path);
    Ok(())
}

fn write_partial(df: &mut DataFrame, partial: &Path) -> Result<()> {
    let mut file = fs::File::create(partial)
        .with_context(|| format!("Failed to create {:?}", partial))?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .with_context(|| format!("Failed to write CSV: {:?}", partial))?;

    file.sync_all()
        .with_context(|| format!("Failed to flush {:?}", partial))
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.csv".to_string());
    path.with_file_name(format!(".{}.partial", name))
}
