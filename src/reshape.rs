//! Long → wide reshaping of survey observations
//!
//! Vegetation and ground-cover queries return one row per
//! (site visit × taxon/element). The key to strata needs one row per site
//! visit with one column per taxon/element, so these tables are pivoted
//! with "first value wins" aggregation.

use crate::error::StrataError;
use crate::utils::{float_values, require_columns, string_values};
use anyhow::Result;
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Pivot a long table into one row per key and one column per category
///
/// - Category strings become column names verbatim (no case or whitespace
///   normalisation, so `"Carex"` and `"carex"` are two columns).
/// - Duplicate (key, category) pairs keep the first non-null value in row order.
/// - Rows with a null key, category or value contribute nothing.
/// - Keys and category columns are emitted in sorted order.
/// - Cells with no observation are null.
///
/// The key column of the result is text; category columns are `Float64`.
pub fn pivot_first(long: &DataFrame, key: &str, category: &str, value: &str) -> Result<DataFrame> {
    let context = format!("pivot of '{}' by '{}'", value, category);
    require_columns(long, &[key, category, value], &context)?;

    let keys = string_values(long, key, &context)?;
    let categories = string_values(long, category, &context)?;
    let values = float_values(long, value, &context)?;

    let mut key_set: BTreeSet<String> = BTreeSet::new();
    let mut category_set: BTreeSet<String> = BTreeSet::new();
    let mut cells: FxHashMap<(String, String), f64> = FxHashMap::default();

    for ((k, c), v) in keys.into_iter().zip(categories.into_iter()).zip(values.into_iter()) {
        let (Some(k), Some(c), Some(v)) = (k, c, v) else {
            continue;
        };

        key_set.insert(k.to_string());
        category_set.insert(c.to_string());
        cells.entry((k.to_string(), c.to_string())).or_insert(v);
    }

    if category_set.contains(key) {
        return Err(StrataError::InvalidConfig(format!(
            "category value '{}' collides with the key column name",
            key
        ))
        .into());
    }

    let key_values: Vec<&str> = key_set.iter().map(|k| k.as_str()).collect();
    let mut columns: Vec<Column> = Vec::with_capacity(category_set.len() + 1);
    columns.push(Series::new(key.into(), &key_values).into());

    for cat in &category_set {
        let column_values: Vec<Option<f64>> = key_set
            .iter()
            .map(|k| cells.get(&(k.clone(), cat.clone())).copied())
            .collect();
        columns.push(Series::new(cat.as_str().into(), column_values).into());
    }

    tracing::debug!(
        keys = key_set.len(),
        categories = category_set.len(),
        "pivoted {} long rows",
        long.height()
    );

    Ok(DataFrame::new(columns)?)
}

/// Inverse of [`pivot_first`]: every non-null wide cell becomes a long row
///
/// Rows are emitted key by key, categories in column order.
pub fn unpivot_present(
    wide: &DataFrame,
    key: &str,
    category: &str,
    value: &str,
) -> Result<DataFrame> {
    let context = "unpivot";
    let keys = string_values(wide, key, context)?;

    let category_names: Vec<String> = wide
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != key)
        .map(|name| name.to_string())
        .collect();

    let mut per_category: Vec<Float64Chunked> = Vec::with_capacity(category_names.len());
    for name in &category_names {
        per_category.push(float_values(wide, name, context)?);
    }

    let mut out_keys: Vec<String> = Vec::new();
    let mut out_categories: Vec<String> = Vec::new();
    let mut out_values: Vec<f64> = Vec::new();

    for (row, k) in keys.into_iter().enumerate() {
        let Some(k) = k else { continue };
        for (name, values) in category_names.iter().zip(&per_category) {
            if let Some(v) = values.get(row) {
                out_keys.push(k.to_string());
                out_categories.push(name.clone());
                out_values.push(v);
            }
        }
    }

    Ok(DataFrame::new(vec![
        Series::new(key.into(), out_keys).into(),
        Series::new(category.into(), out_categories).into(),
        Series::new(value.into(), out_values).into(),
    ])?)
}

/// Remove rows whose flag column is true
///
/// Used to drop dead vegetation cover before pivoting. Accepts boolean,
/// text (`true`/`t`/`yes`/`1`, any case) and numeric (non-zero) flags.
/// Null flags keep the row.
pub fn drop_flagged(df: &DataFrame, flag: &str) -> Result<DataFrame> {
    require_columns(df, &[flag], "flag filter")?;
    let column = df.column(flag)?;

    let flagged: Vec<bool> = match column.dtype() {
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.unwrap_or(false))
            .collect(),
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| {
                v.is_some_and(|s| {
                    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "t" | "yes" | "1")
                })
            })
            .collect(),
        _ => float_values(df, flag, "flag filter")?
            .into_iter()
            .map(|v| v.is_some_and(|x| x != 0.0))
            .collect(),
    };

    let keep: BooleanChunked = flagged.into_iter().map(|f| !f).collect();
    let kept = df.filter(&keep)?;

    tracing::debug!(
        dropped = df.height() - kept.height(),
        "dropped rows flagged by '{}'",
        flag
    );

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(df: &DataFrame, key_col: &str, key: &str, column: &str) -> Option<f64> {
        let keys = df.column(key_col).unwrap().str().unwrap();
        let row = keys.into_iter().position(|k| k == Some(key))?;
        df.column(column).unwrap().f64().unwrap().get(row)
    }

    #[test]
    fn test_pivot_first_value_wins() {
        let long = df![
            "site_visit_code" => &["V1", "V1", "V1", "V2"],
            "code_accepted" => &["erivag", "carex", "erivag", "carex"],
            "cover_percent" => &[15.0, 5.0, 40.0, 2.0],
        ]
        .unwrap();

        let wide = pivot_first(&long, "site_visit_code", "code_accepted", "cover_percent").unwrap();

        assert_eq!(wide.height(), 2);
        assert_eq!(wide.width(), 3);
        assert_eq!(cell(&wide, "site_visit_code", "V1", "erivag"), Some(15.0));
        assert_eq!(cell(&wide, "site_visit_code", "V1", "carex"), Some(5.0));
        assert_eq!(cell(&wide, "site_visit_code", "V2", "erivag"), None);
    }

    #[test]
    fn test_pivot_keeps_category_spelling() {
        let long = df![
            "site_visit_code" => &["V1", "V1"],
            "ground_element" => &["water", "Water "],
            "ground_cover_percent" => &[10.0, 20.0],
        ]
        .unwrap();

        let wide = pivot_first(&long, "site_visit_code", "ground_element", "ground_cover_percent").unwrap();

        let names: Vec<String> = wide.get_column_names().iter().map(|n| n.to_string()).collect();
        assert!(names.contains(&"water".to_string()));
        assert!(names.contains(&"Water ".to_string()));
    }

    #[test]
    fn test_pivot_skips_null_value_for_first() {
        let long = df![
            "site_visit_code" => &["V1", "V1"],
            "code_accepted" => &["carex", "carex"],
            "cover_percent" => &[None, Some(3.0)],
        ]
        .unwrap();

        let wide = pivot_first(&long, "site_visit_code", "code_accepted", "cover_percent").unwrap();
        assert_eq!(cell(&wide, "site_visit_code", "V1", "carex"), Some(3.0));
    }

    #[test]
    fn test_pivot_missing_column() {
        let long = df![
            "site_visit_code" => &["V1"],
        ]
        .unwrap();

        let err = pivot_first(&long, "site_visit_code", "code_accepted", "cover_percent").unwrap_err();
        assert!(err.to_string().contains("code_accepted"));
    }

    #[test]
    fn test_round_trip_without_duplicates() {
        let long = df![
            "site_visit_code" => &["V1", "V1", "V2"],
            "code_accepted" => &["carex", "erivag", "carex"],
            "cover_percent" => &[5.0, 15.0, 2.5],
        ]
        .unwrap();

        let wide = pivot_first(&long, "site_visit_code", "code_accepted", "cover_percent").unwrap();
        let back = unpivot_present(&wide, "site_visit_code", "code_accepted", "cover_percent").unwrap();

        let sorted = back
            .sort(["site_visit_code", "code_accepted"], SortMultipleOptions::default())
            .unwrap();
        assert!(sorted.equals(&long));
    }

    #[test]
    fn test_drop_flagged_boolean_and_text() {
        let bools = df![
            "code_accepted" => &["a", "b", "c"],
            "dead_status" => &[Some(true), Some(false), None],
        ]
        .unwrap();
        assert_eq!(drop_flagged(&bools, "dead_status").unwrap().height(), 2);

        let text = df![
            "code_accepted" => &["a", "b"],
            "dead_status" => &["True", "FALSE"],
        ]
        .unwrap();
        let kept = drop_flagged(&text, "dead_status").unwrap();
        assert_eq!(kept.height(), 1);
        assert_eq!(kept.column("code_accepted").unwrap().str().unwrap().get(0), Some("b"));
    }
}
