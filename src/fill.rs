//! Sentinel fill of absent cells
//!
//! After the joins, a null can mean "taxon not recorded", "no qualifying
//! functional group" or "left join found nothing". All of them become the
//! same sentinel; there is no per-column strategy.

use anyhow::{Context, Result};
use polars::prelude::*;

/// Default sentinel for "no measurement"; cover is 0–100 so it cannot collide
pub const DEFAULT_SENTINEL: f64 = -999.0;

/// Replace every null cell in `df` with `sentinel`
///
/// Columns without nulls are left untouched. Numeric and boolean columns
/// holding nulls become `Float64`; text columns receive the sentinel's
/// textual form (`-999`); anything else is rendered as text first.
pub fn fill_absent(df: &DataFrame, sentinel: f64) -> Result<DataFrame> {
    let text = sentinel.to_string();

    let exprs: Vec<Expr> = df
        .get_columns()
        .iter()
        .filter(|column| column.null_count() > 0)
        .map(|column| {
            let name = column.name().as_str();
            match column.dtype() {
                DataType::String => col(name).fill_null(lit(text.clone())),
                dtype if is_fillable_number(dtype) => {
                    col(name).cast(DataType::Float64).fill_null(lit(sentinel))
                }
                _ => col(name).cast(DataType::String).fill_null(lit(text.clone())),
            }
        })
        .collect();

    if exprs.is_empty() {
        return Ok(df.clone());
    }

    tracing::debug!(columns = exprs.len(), "filling absent cells with {}", sentinel);

    df.clone()
        .lazy()
        .with_columns(exprs)
        .collect()
        .with_context(|| "Failed to fill absent cells")
}

fn is_fillable_number(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Boolean
            | DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_absent_every_column() {
        let df = df![
            "site_visit_code" => &["V1", "V2"],
            "site_code" => &[Some("S1"), None],
            "water" => &[Some(25.0), None],
            "count" => &[Some(3i64), None],
        ]
        .unwrap();

        let filled = fill_absent(&df, DEFAULT_SENTINEL).unwrap();

        assert_eq!(filled.column("water").unwrap().f64().unwrap().get(1), Some(-999.0));
        assert_eq!(filled.column("count").unwrap().f64().unwrap().get(1), Some(-999.0));
        assert_eq!(filled.column("site_code").unwrap().str().unwrap().get(1), Some("-999"));
        for column in filled.get_columns() {
            assert_eq!(column.null_count(), 0);
        }
    }

    #[test]
    fn test_fill_leaves_complete_columns_alone() {
        let df = df![
            "count" => &[1i64, 2],
        ]
        .unwrap();

        let filled = fill_absent(&df, DEFAULT_SENTINEL).unwrap();
        assert_eq!(filled.column("count").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_fill_does_not_distinguish_zero() {
        let df = df![
            "wetsed" => &[Some(0.0), None],
        ]
        .unwrap();

        let filled = fill_absent(&df, DEFAULT_SENTINEL).unwrap();
        let values = filled.column("wetsed").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(0.0));
        assert_eq!(values.get(1), Some(-999.0));
    }
}
