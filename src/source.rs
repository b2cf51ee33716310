//! Query boundary
//!
//! The pipeline only needs "SQL text in, table out". Where the table comes
//! from is behind [`QuerySource`]:
//! - `MemorySource`: frames registered by query name (fixtures, tests)
//! - `CsvSnapshotSource`: `{dir}/{query name}.csv`, exported query results
//! - `DuckDbSource` (feature `duckdb`): executes the SQL against a database file
//!
//! A source owns its connection; dropping it releases the connection on every
//! exit path.

use crate::utils::read_csv;
use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// SQL text with a stable name
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    pub sql: String,
}

impl Query {
    pub fn new(name: &str, sql: &str) -> Self {
        Self {
            name: name.to_string(),
            sql: sql.to_string(),
        }
    }

    /// Read the SQL text verbatim
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let sql = fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file: {:?}", path))?;
        Ok(Self {
            name: name.to_string(),
            sql,
        })
    }
}

pub trait QuerySource {
    /// Execute `query` and return its result table
    fn query(&mut self, query: &Query) -> Result<DataFrame>;
}

/// Where query results come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuerySourceConfig {
    CsvSnapshot { dir: PathBuf },
    #[serde(rename = "duckdb")]
    DuckDb { path: PathBuf },
}

impl Default for QuerySourceConfig {
    fn default() -> Self {
        QuerySourceConfig::CsvSnapshot {
            dir: PathBuf::from("Data_Input/query_results"),
        }
    }
}

/// Connection factory
pub fn connect(config: &QuerySourceConfig) -> Result<Box<dyn QuerySource>> {
    match config {
        QuerySourceConfig::CsvSnapshot { dir } => Ok(Box::new(CsvSnapshotSource::new(dir)?)),
        QuerySourceConfig::DuckDb { path } => connect_duckdb(path),
    }
}

#[cfg(feature = "duckdb")]
fn connect_duckdb(path: &Path) -> Result<Box<dyn QuerySource>> {
    Ok(Box::new(DuckDbSource::open(path)?))
}

#[cfg(not(feature = "duckdb"))]
fn connect_duckdb(path: &Path) -> Result<Box<dyn QuerySource>> {
    Err(anyhow!(
        "database {:?} requested but this build lacks the `duckdb` feature",
        path
    ))
}

/// Frames registered by query name
#[derive(Default)]
pub struct MemorySource {
    tables: FxHashMap<String, DataFrame>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, df: DataFrame) -> Self {
        self.tables.insert(name.to_string(), df);
        self
    }
}

impl QuerySource for MemorySource {
    fn query(&mut self, query: &Query) -> Result<DataFrame> {
        self.tables
            .get(&query.name)
            .cloned()
            .ok_or_else(|| anyhow!("no result registered for query '{}'", query.name))
    }
}

/// Exported query results, one CSV per query name
pub struct CsvSnapshotSource {
    dir: PathBuf,
}

impl CsvSnapshotSource {
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("query snapshot folder not found: {:?}", dir));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl QuerySource for CsvSnapshotSource {
    fn query(&mut self, query: &Query) -> Result<DataFrame> {
        let path = self.dir.join(format!("{}.csv", query.name));
        tracing::debug!(query = query.name.as_str(), "reading snapshot {:?}", path);
        read_csv(&path).with_context(|| format!("query '{}' has no usable snapshot", query.name))
    }
}

#[cfg(feature = "duckdb")]
pub use duck::DuckDbSource;

#[cfg(feature = "duckdb")]
mod duck {
    use super::{Query, QuerySource};
    use anyhow::{Context, Result};
    use duckdb::types::Value;
    use polars::prelude::*;
    use std::path::Path;

    /// Live connection to a DuckDB database file
    pub struct DuckDbSource {
        conn: duckdb::Connection,
    }

    impl DuckDbSource {
        pub fn open(path: &Path) -> Result<Self> {
            let conn = duckdb::Connection::open(path)
                .with_context(|| format!("Failed to open database: {:?}", path))?;
            tracing::info!("connected to {:?}", path);
            Ok(Self { conn })
        }

        pub fn in_memory() -> Result<Self> {
            let conn = duckdb::Connection::open_in_memory()
                .with_context(|| "Failed to open in-memory database")?;
            Ok(Self { conn })
        }

        pub fn execute_batch(&self, sql: &str) -> Result<()> {
            self.conn
                .execute_batch(sql)
                .with_context(|| "Failed to execute SQL batch")
        }
    }

    impl QuerySource for DuckDbSource {
        fn query(&mut self, query: &Query) -> Result<DataFrame> {
            let mut stmt = self
                .conn
                .prepare(&query.sql)
                .with_context(|| format!("Failed to prepare query '{}'", query.name))?;
            let mut rows = stmt
                .query([])
                .with_context(|| format!("Failed to execute query '{}'", query.name))?;

            let names: Vec<String> = rows
                .as_ref()
                .map(|s| s.column_names())
                .unwrap_or_default();
            let mut cells: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

            while let Some(row) = rows.next()? {
                for (idx, column) in cells.iter_mut().enumerate() {
                    column.push(row.get::<_, Value>(idx)?);
                }
            }

            let columns: Vec<Column> = names
                .iter()
                .zip(cells)
                .map(|(name, values)| to_series(name, values).into())
                .collect();

            let df = DataFrame::new(columns)
                .with_context(|| format!("query '{}' returned an unusable table", query.name))?;
            tracing::debug!(query = query.name.as_str(), rows = df.height(), "query complete");
            Ok(df)
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::TinyInt(v) => Some(*v as f64),
            Value::SmallInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::BigInt(v) => Some(*v as f64),
            Value::HugeInt(v) => Some(*v as f64),
            Value::UTinyInt(v) => Some(*v as f64),
            Value::USmallInt(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::UBigInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(v) => v.to_string().parse().ok(),
            _ => None,
        }
    }

    fn as_text(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Boolean(b) => Some(b.to_string()),
            other => as_f64(other)
                .map(|v| v.to_string())
                .or_else(|| Some(format!("{:?}", other))),
        }
    }

    /// Booleans stay boolean, numbers become Float64, everything else text
    fn to_series(name: &str, values: Vec<Value>) -> Series {
        let present = values.iter().filter(|v| !matches!(v, Value::Null));

        let all_bool = present.clone().all(|v| matches!(v, Value::Boolean(_)));
        let all_numeric = present.clone().all(|v| as_f64(v).is_some());
        let any_present = present.count() > 0;

        if any_present && all_bool {
            let data: Vec<Option<bool>> = values
                .iter()
                .map(|v| match v {
                    Value::Boolean(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), data)
        } else if any_present && all_numeric {
            let data: Vec<Option<f64>> = values.iter().map(as_f64).collect();
            Series::new(name.into(), data)
        } else {
            let data: Vec<Option<String>> = values.iter().map(as_text).collect();
            Series::new(name.into(), data)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_from_file_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("npra_05_vegetation_query.sql");
        let sql = "-- vegetation cover\nSELECT *\n  FROM vegetation_cover;\n";
        fs::write(&path, sql).unwrap();

        let query = Query::from_file("vegetation", &path).unwrap();
        assert_eq!(query.sql, sql);
    }

    #[test]
    fn test_memory_source_by_name() {
        let df = df!["site_visit_code" => &["V1"]].unwrap();
        let mut source = MemorySource::new().with_table("environment", df);

        assert!(source.query(&Query::new("environment", "SELECT 1")).is_ok());
        assert!(source.query(&Query::new("ground", "SELECT 1")).is_err());
    }

    #[test]
    fn test_snapshot_source_reads_named_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("ground.csv"),
            "site_visit_code,ground_element,ground_cover_percent\nV1,water,25\n",
        )
        .unwrap();

        let mut source = connect(&QuerySourceConfig::CsvSnapshot {
            dir: dir.path().to_path_buf(),
        })
        .unwrap();
        let df = source.query(&Query::new("ground", "SELECT 1")).unwrap();
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn test_snapshot_source_missing_folder() {
        let result = CsvSnapshotSource::new(Path::new("/nonexistent/query_results"));
        assert!(result.is_err());
    }

    #[test]
    fn test_source_config_json() {
        let config: QuerySourceConfig =
            serde_json::from_str(r#"{"kind": "duckdb", "path": "akveg.duckdb"}"#).unwrap();
        assert_eq!(
            config,
            QuerySourceConfig::DuckDb {
                path: PathBuf::from("akveg.duckdb")
            }
        );
    }
}
