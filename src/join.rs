//! Key joins with dropped-row diagnostics
//!
//! Inner joins silently lose site visits that are missing from either side.
//! That loss is kept (the key to strata only classifies fully described
//! visits) but every join records what it dropped in a [`JoinReport`].

use crate::utils::{string_values, with_string_key};
use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "inner"),
            JoinKind::Left => write!(f, "left"),
        }
    }
}

/// Diagnostics for a single join
#[derive(Debug, Clone, Serialize)]
pub struct JoinReport {
    pub name: String,
    pub kind: JoinKind,
    pub left_rows: usize,
    pub right_rows: usize,
    pub output_rows: usize,
    /// Left rows whose key has no match on the right (always 0 for left joins)
    pub dropped_left_rows: usize,
    /// Distinct unmatched left keys, sorted
    pub dropped_left_keys: Vec<String>,
    /// Distinct right keys with no match on the left
    pub unmatched_right_keys: usize,
}

/// Ordered record of every join in a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinLedger {
    reports: Vec<JoinReport>,
}

impl JoinLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: JoinReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[JoinReport] {
        &self.reports
    }

    pub fn get(&self, name: &str) -> Option<&JoinReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    /// Rows lost across all inner joins
    pub fn total_dropped(&self) -> usize {
        self.reports.iter().map(|r| r.dropped_left_rows).sum()
    }
}

/// Inner join on `key`; rows without a partner on both sides are dropped
pub fn inner_join(
    name: &str,
    left: &DataFrame,
    right: &DataFrame,
    key: &str,
) -> Result<(DataFrame, JoinReport)> {
    join_on_key(name, JoinKind::Inner, left, right, key)
}

/// Left join on `key`; every left row survives, unmatched right columns are null
pub fn left_join(
    name: &str,
    left: &DataFrame,
    right: &DataFrame,
    key: &str,
) -> Result<(DataFrame, JoinReport)> {
    join_on_key(name, JoinKind::Left, left, right, key)
}

fn join_on_key(
    name: &str,
    kind: JoinKind,
    left: &DataFrame,
    right: &DataFrame,
    key: &str,
) -> Result<(DataFrame, JoinReport)> {
    let left = with_string_key(left, key, &format!("{} (left)", name))?;
    let right = with_string_key(right, key, &format!("{} (right)", name))?;

    let left_keys = string_values(&left, key, name)?;
    let right_keys = string_values(&right, key, name)?;

    let right_set: FxHashSet<&str> = (&right_keys).into_iter().flatten().collect();
    let left_set: FxHashSet<&str> = (&left_keys).into_iter().flatten().collect();

    // Null keys never match
    let mut unmatched_rows = 0usize;
    let mut unmatched_keys: FxHashSet<&str> = FxHashSet::default();
    for k in (&left_keys).into_iter() {
        match k {
            Some(k) if right_set.contains(k) => {}
            Some(k) => {
                unmatched_rows += 1;
                unmatched_keys.insert(k);
            }
            None => unmatched_rows += 1,
        }
    }
    let unmatched_right_keys = right_set.iter().filter(|k| !left_set.contains(*k)).count();

    let join_type = match kind {
        JoinKind::Inner => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
    };

    let joined = left
        .join(&right, [key], [key], JoinArgs::new(join_type), None)
        .with_context(|| format!("{}: {} join on '{}' failed", name, kind, key))?;

    let mut dropped_left_keys: Vec<String> = unmatched_keys.into_iter().map(String::from).collect();
    dropped_left_keys.sort();

    let report = JoinReport {
        name: name.to_string(),
        kind,
        left_rows: left.height(),
        right_rows: right.height(),
        output_rows: joined.height(),
        dropped_left_rows: if kind == JoinKind::Inner { unmatched_rows } else { 0 },
        dropped_left_keys: if kind == JoinKind::Inner { dropped_left_keys } else { Vec::new() },
        unmatched_right_keys,
    };

    if report.dropped_left_rows > 0 {
        tracing::warn!(
            join = name,
            dropped_rows = report.dropped_left_rows,
            keys = ?report.dropped_left_keys,
            "inner join dropped rows without a matching '{}'",
            key
        );
    }
    tracing::debug!(
        join = name,
        left = report.left_rows,
        right = report.right_rows,
        output = report.output_rows,
        "{} join complete",
        kind
    );

    Ok((joined, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vegetation() -> DataFrame {
        df![
            "site_visit_code" => &["V1", "V2", "V3"],
            "erivag" => &[15.0, 3.0, 1.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_inner_join_reports_dropped_keys() {
        let environment = df![
            "site_visit_code" => &["V1", "V3", "V9"],
            "elevation" => &[10.0, 20.0, 30.0],
        ]
        .unwrap();

        let (joined, report) = inner_join("environment", &vegetation(), &environment, "site_visit_code").unwrap();

        assert_eq!(joined.height(), 2);
        assert_eq!(report.dropped_left_rows, 1);
        assert_eq!(report.dropped_left_keys, vec!["V2".to_string()]);
        assert_eq!(report.unmatched_right_keys, 1);
        assert_eq!(report.output_rows, 2);
    }

    #[test]
    fn test_inner_join_fans_out_on_duplicate_keys() {
        let strata = df![
            "site_visit_code" => &["V1", "V1", "V2"],
            "site_code" => &["S1a", "S1b", "S2"],
        ]
        .unwrap();

        let (joined, report) = inner_join("strata", &vegetation(), &strata, "site_visit_code").unwrap();

        assert_eq!(joined.height(), 3);
        assert_eq!(report.dropped_left_rows, 1);
    }

    #[test]
    fn test_left_join_keeps_every_left_row() {
        let sums = df![
            "site_visit_code" => &["V2"],
            "wetsed" => &[25.0],
        ]
        .unwrap();

        let (joined, report) = left_join("wetsed", &vegetation(), &sums, "site_visit_code").unwrap();

        assert_eq!(joined.height(), vegetation().height());
        assert_eq!(report.dropped_left_rows, 0);
        assert_eq!(joined.column("wetsed").unwrap().null_count(), 2);
    }

    #[test]
    fn test_join_matches_numeric_and_text_keys() {
        let left = df![
            "site_visit_code" => &[1i64, 2],
            "a" => &[1.0, 2.0],
        ]
        .unwrap();
        let right = df![
            "site_visit_code" => &["1", "2"],
            "b" => &[3.0, 4.0],
        ]
        .unwrap();

        let (joined, _) = inner_join("mixed", &left, &right, "site_visit_code").unwrap();
        assert_eq!(joined.height(), 2);
    }

    #[test]
    fn test_join_missing_key_column() {
        let right = df![
            "site_code" => &["S1"],
        ]
        .unwrap();

        let err = inner_join("strata", &vegetation(), &right, "site_visit_code").unwrap_err();
        assert!(err.to_string().contains("site_visit_code"));
    }

    #[test]
    fn test_ledger_totals() {
        let mut ledger = JoinLedger::new();
        let environment = df![
            "site_visit_code" => &["V1"],
        ]
        .unwrap();
        let (_, report) = inner_join("environment", &vegetation(), &environment, "site_visit_code").unwrap();
        ledger.push(report);

        assert_eq!(ledger.total_dropped(), 2);
        assert_eq!(ledger.get("environment").unwrap().dropped_left_keys.len(), 2);
    }
}
