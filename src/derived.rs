//! Functional-group cover sums
//!
//! A derived metric is the summed cover, per site visit, of every taxon whose
//! functional-group lookup row carries a given label (wetland sedges, aquatic
//! mosses, ...). One parameterised routine serves any number of metrics.
//!
//! Steps for metric M:
//!   1. inner join observations × lookup on taxon code
//!   2. keep rows where the group column equals M's label
//!   3. group by site visit, sum cover
//!   4. name the sum M
//!   5. left join onto the main table (visits without qualifying taxa → null)

use crate::error::StrataError;
use crate::join::{left_join, JoinLedger};
use crate::utils::require_columns;
use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// A named cover sum over one functional-group label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    /// Output column name
    pub name: String,
    /// Lookup column holding the group label
    pub group_column: String,
    /// Label that qualifies a taxon for the sum
    pub equals: String,
}

impl DerivedMetric {
    pub fn new(name: &str, group_column: &str, equals: &str) -> Self {
        Self {
            name: name.to_string(),
            group_column: group_column.to_string(),
            equals: equals.to_string(),
        }
    }

    /// Wetland sedge cover (`wetsed`)
    pub fn wetland_sedge() -> Self {
        Self::new("wetsed", "wetland_sedge", "wetland sedge")
    }

    /// Aquatic moss cover (`aqumos`)
    pub fn aquatic_moss() -> Self {
        Self::new("aqumos", "nv_functional_gr", "aquatic moss")
    }

    pub fn predicate(&self) -> Expr {
        col(self.group_column.as_str())
            .cast(DataType::String)
            .eq(lit(self.equals.as_str()))
    }
}

/// Column names the metric routine reads
#[derive(Debug, Clone, Copy)]
pub struct MetricColumns<'a> {
    /// Site-visit key on the observation table
    pub key: &'a str,
    /// Taxon code on the observation table
    pub code: &'a str,
    /// Cover value on the observation table
    pub value: &'a str,
    /// Taxon code on the lookup table
    pub lookup_code: &'a str,
}

/// Per-visit sum of qualifying cover, one row per visit with at least one match
pub fn group_sum(
    observations: &DataFrame,
    lookup: &DataFrame,
    metric: &DerivedMetric,
    columns: MetricColumns<'_>,
) -> Result<DataFrame> {
    let context = format!("derived metric '{}'", metric.name);
    require_columns(observations, &[columns.key, columns.code, columns.value], &context)?;
    require_columns(lookup, &[columns.lookup_code, metric.group_column.as_str()], &context)?;

    let obs = observations.clone().lazy().select([
        col(columns.key).cast(DataType::String),
        col(columns.code).cast(DataType::String),
        col(columns.value).cast(DataType::Float64),
    ]);
    let groups = lookup.clone().lazy().select([
        col(columns.lookup_code).cast(DataType::String),
        col(metric.group_column.as_str()),
    ]);

    obs.join(
        groups,
        [col(columns.code)],
        [col(columns.lookup_code)],
        JoinArgs::new(JoinType::Inner),
    )
    .filter(metric.predicate())
    .group_by([col(columns.key)])
    .agg([col(columns.value).sum().alias(metric.name.as_str())])
    .sort([columns.key], SortMultipleOptions::default())
    .collect()
    .with_context(|| format!("{}: group sum failed", context))
}

/// Compute `metric` and left-join it onto `base`
///
/// The join is recorded in `ledger` under `"derived <name>"`.
pub fn attach_metric(
    base: &DataFrame,
    observations: &DataFrame,
    lookup: &DataFrame,
    metric: &DerivedMetric,
    columns: MetricColumns<'_>,
    ledger: &mut JoinLedger,
) -> Result<DataFrame> {
    if base.column(metric.name.as_str()).is_ok() {
        return Err(StrataError::InvalidConfig(format!(
            "derived metric '{}' collides with an existing column",
            metric.name
        ))
        .into());
    }

    let sums = group_sum(observations, lookup, metric, columns)?;
    tracing::info!(
        metric = metric.name.as_str(),
        visits = sums.height(),
        "calculated {} cover",
        metric.equals
    );

    let (joined, report) = left_join(&format!("derived {}", metric.name), base, &sums, columns.key)?;
    ledger.push(report);

    Ok(joined)
}
