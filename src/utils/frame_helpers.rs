//! DataFrame helpers with column validation
//!
//! Every stage reads columns by name from tables whose schema comes from
//! outside (SQL queries, exported CSVs). These helpers turn a missing column
//! into a `StrataError::MissingColumn` naming the stage, instead of a bare
//! polars "not found".

use crate::error::StrataError;
use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashSet;
use std::path::Path;

/// Check that every column in `columns` exists in `df`
///
/// # Errors
/// Returns `StrataError::MissingColumn` for the first absent column.
pub fn require_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<()> {
    let actual: FxHashSet<&str> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();

    for &expected in columns {
        if !actual.contains(expected) {
            return Err(StrataError::missing_column(context, expected).into());
        }
    }

    Ok(())
}

/// Column as owned strings, casting numeric codes where needed
pub fn string_values(df: &DataFrame, name: &str, context: &str) -> Result<StringChunked> {
    let column = df
        .column(name)
        .map_err(|_| StrataError::missing_column(context, name))?
        .cast(&DataType::String)
        .with_context(|| format!("{}: column '{}' cannot be read as text", context, name))?;

    Ok(column.str()?.clone())
}

/// Column as `f64`, casting integer cover values where needed
pub fn float_values(df: &DataFrame, name: &str, context: &str) -> Result<Float64Chunked> {
    let column = df
        .column(name)
        .map_err(|_| StrataError::missing_column(context, name))?
        .cast(&DataType::Float64)
        .with_context(|| format!("{}: column '{}' is not numeric", context, name))?;

    Ok(column.f64()?.clone())
}

/// Copy of `df` whose `key` column is text
///
/// Join keys come from different sources (query results, CSVs parsed with
/// inferred types), so both sides of a join are normalised before matching.
pub fn with_string_key(df: &DataFrame, key: &str, context: &str) -> Result<DataFrame> {
    require_columns(df, &[key], context)?;

    df.clone()
        .lazy()
        .with_column(col(key).cast(DataType::String))
        .collect()
        .with_context(|| format!("{}: failed to cast key '{}' to text", context, key))
}

/// Load a comma-separated, UTF-8 file with a header row
///
/// `NA` cells are read as null, as are empty cells.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let parse_options = CsvParseOptions::default()
        .with_null_values(Some(NullValues::AllColumnsSingle("NA".into())));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.into()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_require_columns_success() {
        let df = df![
            "site_visit_code" => &["v1", "v2"],
            "cover_percent" => &[1.0, 2.0],
        ]
        .unwrap();

        assert!(require_columns(&df, &["site_visit_code", "cover_percent"], "test").is_ok());
    }

    #[test]
    fn test_require_columns_missing() {
        let df = df![
            "site_visit_code" => &["v1"],
        ]
        .unwrap();

        let err = require_columns(&df, &["water"], "ground pivot").unwrap_err();
        let typed = err.downcast_ref::<StrataError>().unwrap();
        assert!(matches!(typed, StrataError::MissingColumn { column, .. } if column == "water"));
        assert!(err.to_string().contains("ground pivot"));
    }

    #[test]
    fn test_float_values_casts_integers() {
        let df = df![
            "cover_percent" => &[5i64, 15],
        ]
        .unwrap();

        let values = float_values(&df, "cover_percent", "test").unwrap();
        assert_eq!(values.get(1), Some(15.0));
    }

    #[test]
    fn test_with_string_key_casts_numeric_key() {
        let df = df![
            "site_visit_code" => &[101i64, 102],
        ]
        .unwrap();

        let keyed = with_string_key(&df, "site_visit_code", "test").unwrap();
        let keys = keyed.column("site_visit_code").unwrap().str().unwrap();
        assert_eq!(keys.get(0), Some("101"));
    }

    #[test]
    fn test_read_csv_treats_na_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "site_code,site_visit_code,cover").unwrap();
        writeln!(file, "S1,V1,NA").unwrap();
        writeln!(file, "S2,V2,4.5").unwrap();
        drop(file);

        let df = read_csv(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("cover").unwrap().null_count(), 1);
    }
}
