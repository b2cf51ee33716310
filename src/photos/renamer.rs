//! Applies a [`RenamePlan`] to photo files on disk
//!
//! Each pass walks the whole tree again, so renames from one pass are seen
//! by the next. Files only ever move within their own folder.

use super::rules::{ConflictPolicy, PassMode, RenamePlan};
use crate::error::StrataError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameSummary {
    /// Files visited, summed over passes
    pub examined: usize,
    pub renamed: usize,
    /// Renames abandoned because the target already existed
    pub skipped: usize,
}

pub struct PhotoRenamer {
    plan: RenamePlan,
    extension: String,
    dry_run: bool,
}

impl PhotoRenamer {
    pub fn new(plan: RenamePlan, extension: &str) -> Self {
        Self {
            plan,
            extension: extension.trim_start_matches('.').to_string(),
            dry_run: false,
        }
    }

    /// Log the planned renames without touching any file
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Photos under `root` with the configured extension, sorted
    pub fn photos(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
            if entry.file_type().is_file() && self.has_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    pub fn run(&self, root: &Path) -> Result<RenameSummary> {
        if !root.is_dir() {
            anyhow::bail!("photo folder not found: {:?}", root);
        }

        if self.dry_run {
            return self.preview(root);
        }

        let mut summary = RenameSummary::default();
        for pass in &self.plan.passes {
            let files = self.photos(root)?;
            tracing::info!(pass = pass.name.as_str(), files = files.len(), "running rename pass");

            for file in files {
                summary.examined += 1;
                let (Some(parent), Some(name)) = (file.parent(), file.file_name().and_then(|n| n.to_str())) else {
                    continue;
                };

                let mut current = name.to_string();
                for rule in &pass.rules {
                    if !rule.applies(&current) {
                        continue;
                    }

                    let renamed = rule.rewrite(&current);
                    if renamed != current {
                        let from = parent.join(&current);
                        let to = parent.join(&renamed);

                        if target_taken(parent, &current, &renamed)? {
                            match rule.on_conflict {
                                ConflictPolicy::Skip => {
                                    tracing::warn!("{} already exists", renamed);
                                    summary.skipped += 1;
                                }
                                ConflictPolicy::Fail => {
                                    return Err(StrataError::RenameCollision { from, to }.into());
                                }
                            }
                        } else {
                            fs::rename(&from, &to)
                                .with_context(|| format!("Failed to rename {:?} to {:?}", from, to))?;
                            tracing::debug!("{} -> {}", current, renamed);
                            summary.renamed += 1;
                            current = renamed;
                        }
                    }

                    if pass.mode == PassMode::FirstMatch {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            renamed = summary.renamed,
            skipped = summary.skipped,
            "photo names standardized"
        );
        Ok(summary)
    }

    /// Walk the plan against the files on disk without renaming anything
    ///
    /// Targets that already exist count as skipped whatever the rule's
    /// conflict policy; a `fail` rule is logged as the point the run would stop.
    fn preview(&self, root: &Path) -> Result<RenameSummary> {
        let mut summary = RenameSummary::default();
        for file in self.photos(root)? {
            summary.examined += 1;
            let (Some(parent), Some(name)) = (file.parent(), file.file_name().and_then(|n| n.to_str())) else {
                continue;
            };

            let mut current = name.to_string();
            let mut blocked = false;
            for pass in &self.plan.passes {
                for rule in &pass.rules {
                    if !rule.applies(&current) {
                        continue;
                    }

                    let renamed = rule.rewrite(&current);
                    if renamed != current {
                        if target_taken(parent, name, &renamed)? {
                            match rule.on_conflict {
                                ConflictPolicy::Skip => tracing::info!("would skip {}: {} exists", current, renamed),
                                ConflictPolicy::Fail => {
                                    tracing::warn!("would stop at {}: {} exists", current, renamed)
                                }
                            }
                            summary.skipped += 1;
                            blocked = rule.on_conflict == ConflictPolicy::Fail;
                        } else {
                            current = renamed;
                        }
                    }

                    if blocked || pass.mode == PassMode::FirstMatch {
                        break;
                    }
                }
                if blocked {
                    break;
                }
            }

            if current != name {
                tracing::info!("would rename {:?} -> {}", file, current);
                summary.renamed += 1;
            }
        }
        Ok(summary)
    }
}

/// True when renaming `current` to `renamed` inside `parent` would replace
/// another photo
///
/// A case-only rename resolves to the file itself on case-insensitive file
/// systems; it only collides when a distinct file holds the new name.
fn target_taken(parent: &Path, current: &str, renamed: &str) -> Result<bool> {
    let to = parent.join(renamed);
    if !to.exists() {
        return Ok(false);
    }
    if !current.eq_ignore_ascii_case(renamed) {
        return Ok(true);
    }

    let from = parent.join(current);
    let same = same_file::is_same_file(&from, &to)
        .with_context(|| format!("Failed to compare {:?} with {:?}", from, to))?;
    Ok(!same)
}
