//! Key to strata: query → reshape → join → derive → fill → classify → export
//!
//! Stage order:
//!   1. drop dead vegetation cover
//!   2. pivot vegetation and ground cover to one row per site visit
//!   3. inner joins: vegetation ⋈ environment ⋈ ground cover ⋈ strata
//!   4. derived functional-group sums (left joins)
//!   5. sentinel fill
//!   6. rule cascade
//!   7. export column selection
//!
//! Nothing is written unless every stage succeeds.

use crate::classify::LabelCounts;
use crate::config::StrataConfig;
use crate::derived::attach_metric;
use crate::export::{select_export, write_csv};
use crate::fill::fill_absent;
use crate::join::{inner_join, JoinLedger, JoinReport};
use crate::reshape::{drop_flagged, pivot_first};
use crate::source::{connect, Query, QuerySource};
use crate::utils::read_csv;
use anyhow::{Context, Result};
use polars::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Raw inputs for one run
#[derive(Debug, Clone)]
pub struct SurveyTables {
    /// Long vegetation cover: visit × taxon
    pub vegetation: DataFrame,
    /// Long ground cover: visit × element
    pub ground: DataFrame,
    /// One row per visit
    pub environment: DataFrame,
    /// Existing strata, one row per visit
    pub strata: DataFrame,
    /// Taxon → functional group labels
    pub functional: DataFrame,
}

/// Query results
pub struct QueryResults {
    pub vegetation: DataFrame,
    pub ground: DataFrame,
    pub environment: DataFrame,
}

impl QueryResults {
    /// Run the vegetation, ground-cover and environment queries
    pub fn fetch(config: &StrataConfig, source: &mut dyn QuerySource) -> Result<Self> {
        let vegetation = Query::from_file("vegetation", &config.vegetation_query)?;
        let ground = Query::from_file("ground", &config.ground_query)?;
        let environment = Query::from_file("environment", &config.environment_query)?;

        tracing::info!("querying vegetation cover data");
        let vegetation = source.query(&vegetation)?;
        tracing::info!("querying ground cover data");
        let ground = source.query(&ground)?;
        tracing::info!("querying environment data");
        let environment = source.query(&environment)?;

        Ok(Self {
            vegetation,
            ground,
            environment,
        })
    }
}

impl SurveyTables {
    /// Query results plus the two CSV inputs
    pub fn load(config: &StrataConfig, source: &mut dyn QuerySource) -> Result<Self> {
        let queried = QueryResults::fetch(config, source)?;
        Self::with_csv_inputs(config, queried)
    }

    /// Open a connection, fetch, release the connection, then read the CSVs
    pub fn load_with_connection(config: &StrataConfig) -> Result<Self> {
        let start = Instant::now();
        let queried = {
            let mut source = connect(&config.source)?;
            QueryResults::fetch(config, source.as_mut())?
        };
        tracing::info!(elapsed = ?start.elapsed(), "database queries complete");

        Self::with_csv_inputs(config, queried)
    }

    fn with_csv_inputs(config: &StrataConfig, queried: QueryResults) -> Result<Self> {
        Ok(Self {
            vegetation: queried.vegetation,
            ground: queried.ground,
            environment: queried.environment,
            strata: read_csv(&config.strata_input)?,
            functional: read_csv(&config.functional_input)?,
        })
    }
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct StrataOutcome {
    /// Export columns only
    pub table: DataFrame,
    /// Every joined column plus the label, before export selection
    pub characters: DataFrame,
    pub ledger: JoinLedger,
    pub label_counts: LabelCounts,
}

#[derive(Serialize)]
struct RunReport<'a> {
    rows: usize,
    joins: &'a [JoinReport],
    labels: &'a LabelCounts,
}

impl StrataOutcome {
    /// Join diagnostics and label counts as pretty-printed JSON
    pub fn report_json(&self) -> Result<String> {
        let report = RunReport {
            rows: self.table.height(),
            joins: self.ledger.reports(),
            labels: &self.label_counts,
        };
        serde_json::to_string_pretty(&report).with_context(|| "Failed to serialize run report")
    }

    pub fn write_report(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report folder: {:?}", parent))?;
        }
        fs::write(path, self.report_json()?)
            .with_context(|| format!("Failed to write run report: {:?}", path))
    }
}

pub struct StrataPipeline<'a> {
    config: &'a StrataConfig,
}

impl<'a> StrataPipeline<'a> {
    pub fn new(config: &'a StrataConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, tables: &SurveyTables) -> Result<StrataOutcome> {
        let cols = &self.config.columns;
        let key = cols.site_visit.as_str();
        let mut ledger = JoinLedger::new();

        // Reshape
        let start = Instant::now();
        let vegetation = match cols.dead_flag.as_deref() {
            Some(flag) if tables.vegetation.column(flag).is_ok() => drop_flagged(&tables.vegetation, flag)?,
            Some(flag) => {
                tracing::warn!("vegetation data has no '{}' column; keeping every row", flag);
                tables.vegetation.clone()
            }
            None => tables.vegetation.clone(),
        };

        let vegetation_wide = pivot_first(&vegetation, key, &cols.vegetation_code, &cols.vegetation_cover)?;
        let ground_wide = pivot_first(&tables.ground, key, &cols.ground_element, &cols.ground_cover)?;
        tracing::info!(
            vegetation_visits = vegetation_wide.height(),
            ground_visits = ground_wide.height(),
            "pivoted cover data"
        );

        // Join
        let (characters, report) = inner_join("environment", &vegetation_wide, &tables.environment, key)?;
        ledger.push(report);
        let (characters, report) = inner_join("ground cover", &characters, &ground_wide, key)?;
        ledger.push(report);
        let (mut characters, report) = inner_join("strata", &characters, &tables.strata, key)?;
        ledger.push(report);

        // Derived metrics
        for metric in &self.config.derived_metrics {
            characters = attach_metric(
                &characters,
                &vegetation,
                &tables.functional,
                metric,
                cols.metric_columns(),
                &mut ledger,
            )?;
        }

        let characters = fill_absent(&characters, self.config.sentinel)?;
        tracing::info!(elapsed = ?start.elapsed(), rows = characters.height(), "indicators calculated");

        // Classify
        let start = Instant::now();
        let (characters, label_counts) = self.config.cascade().apply(&characters)?;

        let table = select_export(&characters, &self.config.export_columns)?;
        tracing::info!(elapsed = ?start.elapsed(), "programmatic key complete");

        if ledger.total_dropped() > 0 {
            tracing::warn!(
                dropped = ledger.total_dropped(),
                "site visits lost in inner joins"
            );
        }

        Ok(StrataOutcome {
            table,
            characters,
            ledger,
            label_counts,
        })
    }
}

/// Load inputs, run the key and write the export file
pub fn run_to_file(config: &StrataConfig) -> Result<StrataOutcome> {
    let tables = SurveyTables::load_with_connection(config)?;
    let mut outcome = StrataPipeline::new(config).run(&tables)?;
    write_csv(&mut outcome.table, &config.output)?;
    Ok(outcome)
}
