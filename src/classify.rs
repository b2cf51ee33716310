//! Programmatic key to strata
//!
//! Each site visit starts with the default label (`"none"`) and walks an
//! ordered list of rules. A rule only fires on rows that still carry the
//! default label, so earlier rules take priority and a label, once set, is
//! never overwritten. Rows matching no rule keep the default; that is a
//! valid outcome.
//!
//! Comparisons never match a cell holding the fill sentinel. With the usual
//! negative sentinel and positive "greater than" thresholds this is what a
//! plain comparison would give anyway; the explicit guard keeps it true for
//! `lt`/`le`/`eq` conditions and for thresholds below zero.

use crate::error::StrataError;
use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Threshold test over one or more columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Gt { column: String, value: f64 },
    Ge { column: String, value: f64 },
    Lt { column: String, value: f64 },
    Le { column: String, value: f64 },
    Eq { column: String, value: f64 },
    /// True when any nested condition holds
    Any { of: Vec<Condition> },
    /// True when every nested condition holds
    All { of: Vec<Condition> },
}

impl Condition {
    pub fn gt(column: &str, value: f64) -> Self {
        Condition::Gt { column: column.to_string(), value }
    }

    pub fn any(of: Vec<Condition>) -> Self {
        Condition::Any { of }
    }

    pub fn all(of: Vec<Condition>) -> Self {
        Condition::All { of }
    }

    /// Every column the condition reads, in first-reference order
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Gt { column, .. }
            | Condition::Ge { column, .. }
            | Condition::Lt { column, .. }
            | Condition::Le { column, .. }
            | Condition::Eq { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Condition::Any { of } | Condition::All { of } => {
                for c in of {
                    c.collect_columns(out);
                }
            }
        }
    }

    /// First `gt`/`ge` leaf whose threshold is at or below `sentinel`
    fn lower_bound_below(&self, sentinel: f64) -> Option<(&str, f64)> {
        match self {
            Condition::Gt { column, value } | Condition::Ge { column, value } if *value <= sentinel => {
                Some((column.as_str(), *value))
            }
            Condition::Any { of } | Condition::All { of } => {
                of.iter().find_map(|c| c.lower_bound_below(sentinel))
            }
            _ => None,
        }
    }

    /// Polars expression; sentinel cells never satisfy a comparison
    pub fn to_expr(&self, sentinel: f64) -> Expr {
        match self {
            Condition::Gt { column, value } => compare(column, sentinel, |c| c.gt(lit(*value))),
            Condition::Ge { column, value } => compare(column, sentinel, |c| c.gt_eq(lit(*value))),
            Condition::Lt { column, value } => compare(column, sentinel, |c| c.lt(lit(*value))),
            Condition::Le { column, value } => compare(column, sentinel, |c| c.lt_eq(lit(*value))),
            Condition::Eq { column, value } => compare(column, sentinel, |c| c.eq(lit(*value))),
            Condition::Any { of } => of
                .iter()
                .map(|c| c.to_expr(sentinel))
                .reduce(|acc, e| acc.or(e))
                .unwrap_or_else(|| lit(false)),
            Condition::All { of } => of
                .iter()
                .map(|c| c.to_expr(sentinel))
                .reduce(|acc, e| acc.and(e))
                .unwrap_or_else(|| lit(true)),
        }
    }
}

fn compare(column: &str, sentinel: f64, op: impl FnOnce(Expr) -> Expr) -> Expr {
    let value = col(column).cast(DataType::Float64);
    value.clone().neq(lit(sentinel)).and(op(value))
}

/// One step of the cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Label assigned when the rule fires
    pub label: String,
    pub when: Condition,
}

impl Rule {
    pub fn new(name: &str, label: &str, when: Condition) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            when,
        }
    }
}

/// The NPR-A physiography key: wetland first, then tussock tundra
pub fn physiography_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "wetland",
            "wetland",
            Condition::any(vec![
                Condition::gt("wetsed", 20.0),
                Condition::gt("aqumos", 10.0),
                Condition::gt("water", 20.0),
            ]),
        ),
        Rule::new("tundra", "tundra", Condition::gt("erivag", 10.0)),
    ]
}

/// Number of rows per final label
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelCounts {
    counts: Vec<(String, usize)>,
}

impl LabelCounts {
    pub fn get(&self, label: &str) -> usize {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0, |(_, n)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(l, n)| (l.as_str(), *n))
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// Ordered rule list applied over an explicit label column
#[derive(Debug, Clone)]
pub struct RuleCascade {
    pub label_column: String,
    pub default_label: String,
    pub sentinel: f64,
    pub rules: Vec<Rule>,
}

impl RuleCascade {
    pub fn new(label_column: &str, default_label: &str, sentinel: f64, rules: Vec<Rule>) -> Self {
        Self {
            label_column: label_column.to_string(),
            default_label: default_label.to_string(),
            sentinel,
            rules,
        }
    }

    /// Check that every referenced column exists before anything is assigned
    ///
    /// # Errors
    /// `StrataError::RuleColumnMissing` with the first offending rule and column.
    pub fn validate(&self, df: &DataFrame) -> Result<()> {
        let present: FxHashSet<&str> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str())
            .collect();

        for rule in &self.rules {
            for column in rule.when.columns() {
                if !present.contains(column) {
                    return Err(StrataError::RuleColumnMissing {
                        rule: rule.name.clone(),
                        column: column.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Reject rule lists that cannot be evaluated unambiguously
    pub fn check(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for rule in &self.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(StrataError::InvalidConfig(format!("duplicate rule name '{}'", rule.name)).into());
            }
            if rule.label == self.default_label {
                return Err(StrataError::InvalidConfig(format!(
                    "rule '{}' assigns the default label '{}'",
                    rule.name, rule.label
                ))
                .into());
            }
        }
        self.check_sentinel()
    }

    /// Reject `gt`/`ge` thresholds at or below the sentinel
    pub fn check_sentinel(&self) -> Result<()> {
        for rule in &self.rules {
            if let Some((column, value)) = rule.when.lower_bound_below(self.sentinel) {
                return Err(StrataError::InvalidConfig(format!(
                    "rule '{}': threshold {} on '{}' does not exceed the sentinel {}",
                    rule.name, value, column, self.sentinel
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Add the label column and run the rules in order
    pub fn apply(&self, df: &DataFrame) -> Result<(DataFrame, LabelCounts)> {
        self.check()?;
        self.validate(df)?;

        let label = self.label_column.as_str();
        let default = self.default_label.as_str();

        let mut lazy = df
            .clone()
            .lazy()
            .with_column(lit(default).alias(label));

        for rule in &self.rules {
            tracing::info!(rule = rule.name.as_str(), "separating {} rows", rule.label);
            let fires = col(label).eq(lit(default)).and(rule.when.to_expr(self.sentinel));
            lazy = lazy.with_column(
                when(fires)
                    .then(lit(rule.label.as_str()))
                    .otherwise(col(label))
                    .alias(label),
            );
        }

        let classified = lazy
            .collect()
            .with_context(|| "Failed to evaluate classification rules")?;

        let counts = self.count_labels(&classified)?;
        for (l, n) in counts.iter() {
            tracing::info!(label = l, rows = n, "classified");
        }

        Ok((classified, counts))
    }

    fn count_labels(&self, df: &DataFrame) -> Result<LabelCounts> {
        let mut order: Vec<String> = vec![self.default_label.clone()];
        for rule in &self.rules {
            if !order.contains(&rule.label) {
                order.push(rule.label.clone());
            }
        }

        let mut counts: Vec<(String, usize)> = order.into_iter().map(|l| (l, 0)).collect();
        let labels = df.column(self.label_column.as_str())?.str()?;
        for value in labels.into_iter().flatten() {
            if let Some(entry) = counts.iter_mut().find(|entry| entry.0 == value) {
                entry.1 += 1;
            }
        }

        Ok(LabelCounts { counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::DEFAULT_SENTINEL;

    fn cascade(rules: Vec<Rule>) -> RuleCascade {
        RuleCascade::new("physiography_revised", "none", DEFAULT_SENTINEL, rules)
    }

    fn characters() -> DataFrame {
        df![
            "site_visit_code" => &["V1", "V2", "V3", "V4"],
            "wetsed" => &[0.0, 25.0, -999.0, -999.0],
            "aqumos" => &[0.0, 0.0, -999.0, -999.0],
            "water" => &[25.0, 0.0, 5.0, -999.0],
            "erivag" => &[15.0, 40.0, 15.0, -999.0],
        ]
        .unwrap()
    }

    fn labels(df: &DataFrame) -> Vec<String> {
        df.column("physiography_revised")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_physiography_cascade() {
        let (df, counts) = cascade(physiography_rules()).apply(&characters()).unwrap();

        assert_eq!(labels(&df), vec!["wetland", "wetland", "tundra", "none"]);
        assert_eq!(counts.get("wetland"), 2);
        assert_eq!(counts.get("tundra"), 1);
        assert_eq!(counts.get("none"), 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_rule_order_matters() {
        let mut reversed = physiography_rules();
        reversed.reverse();

        let (df, _) = cascade(reversed).apply(&characters()).unwrap();

        // erivag > 10 now claims V1 and V2 before the wetland rule runs
        assert_eq!(labels(&df), vec!["tundra", "tundra", "tundra", "none"]);
    }

    #[test]
    fn test_label_assigned_once() {
        let rules = vec![
            Rule::new("first", "a", Condition::gt("water", 0.0)),
            Rule::new("second", "b", Condition::gt("water", 0.0)),
        ];

        let (df, counts) = cascade(rules).apply(&characters()).unwrap();

        assert_eq!(labels(&df), vec!["a", "none", "a", "none"]);
        assert_eq!(counts.get("b"), 0);
    }

    #[test]
    fn test_sentinel_never_matches() {
        let rules = vec![
            Rule::new("low water", "dry", Condition::Lt { column: "water".into(), value: 1.0 }),
            Rule::new("at sentinel", "odd", Condition::Eq { column: "erivag".into(), value: -999.0 }),
        ];

        let (df, _) = cascade(rules).apply(&characters()).unwrap();

        // V4 is all sentinel and must stay unclassified
        assert_eq!(labels(&df)[3], "none");
        assert_eq!(labels(&df)[1], "dry");
    }

    #[test]
    fn test_missing_rule_column() {
        let rules = vec![Rule::new("shrub", "shrub", Condition::gt("salpul", 5.0))];

        let err = cascade(rules).apply(&characters()).unwrap_err();
        let typed = err.downcast_ref::<StrataError>().unwrap();
        assert!(matches!(
            typed,
            StrataError::RuleColumnMissing { rule, column } if rule == "shrub" && column == "salpul"
        ));
    }

    #[test]
    fn test_all_condition() {
        let rules = vec![Rule::new(
            "wet tussock",
            "wet_tundra",
            Condition::all(vec![Condition::gt("water", 1.0), Condition::gt("erivag", 10.0)]),
        )];

        let (df, _) = cascade(rules).apply(&characters()).unwrap();
        assert_eq!(labels(&df), vec!["wet_tundra", "none", "wet_tundra", "none"]);
    }

    #[test]
    fn test_duplicate_rule_names_rejected() {
        let rules = vec![
            Rule::new("wetland", "wetland", Condition::gt("water", 20.0)),
            Rule::new("wetland", "marsh", Condition::gt("wetsed", 20.0)),
        ];

        assert!(cascade(rules).check().is_err());
    }

    #[test]
    fn test_threshold_below_sentinel_rejected() {
        let rules = vec![Rule::new(
            "anything",
            "odd",
            Condition::any(vec![Condition::gt("water", 20.0), Condition::gt("erivag", -1000.0)]),
        )];

        let err = cascade(rules).apply(&characters()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StrataError>(),
            Some(StrataError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_condition_json_shape() {
        let json = r#"{"op": "any", "of": [
            {"op": "gt", "column": "wetsed", "value": 20},
            {"op": "gt", "column": "water", "value": 20}
        ]}"#;

        let condition: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(condition.columns(), vec!["wetsed", "water"]);
    }
}
