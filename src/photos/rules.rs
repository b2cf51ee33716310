//! Photo file-name rewrite rules
//!
//! A plan is an ordered list of passes; a pass is an ordered list of regex
//! substitutions. Passes run one after another over every photo, so a later
//! pass sees the names produced by earlier ones.
//!
//! Rules are declared as serialisable [`RenameRuleSpec`]s and compiled into
//! [`RenameRule`]s before use.

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What replaces a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Replacement {
    /// Fixed text (no `$1` expansion)
    Literal(String),
    /// The match itself, lower-cased
    Lowercase,
}

/// What to do when the rewritten name already exists in the folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the current name and log that the target exists
    Skip,
    /// Abort the run
    #[default]
    Fail,
}

/// Part of the file name a guard is tested against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardTarget {
    #[default]
    Name,
    /// File name without extension
    Stem,
}

/// How rules inside a pass combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    /// Only the first applicable rule runs
    FirstMatch,
    /// Every applicable rule runs, each on the name left by the previous one
    #[default]
    EachRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRuleSpec {
    pub pattern: String,
    pub replace: Replacement,
    /// Rule applies only when this matches; defaults to `pattern` itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default)]
    pub guard_target: GuardTarget,
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

impl RenameRuleSpec {
    pub fn literal(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replace: Replacement::Literal(replacement.to_string()),
            guard: None,
            guard_target: GuardTarget::Name,
            on_conflict: ConflictPolicy::Fail,
        }
    }

    pub fn guarded(mut self, guard: &str, target: GuardTarget) -> Self {
        self.guard = Some(guard.to_string());
        self.guard_target = target;
        self
    }

    pub fn skip_existing(mut self) -> Self {
        self.on_conflict = ConflictPolicy::Skip;
        self
    }

    pub fn lowercase(pattern: &str) -> Self {
        Self {
            replace: Replacement::Lowercase,
            ..Self::literal(pattern, "")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenamePassSpec {
    pub name: String,
    #[serde(default)]
    pub mode: PassMode,
    pub rules: Vec<RenameRuleSpec>,
}

impl RenamePassSpec {
    fn new(name: &str, mode: PassMode, rules: Vec<RenameRuleSpec>) -> Self {
        Self {
            name: name.to_string(),
            mode,
            rules,
        }
    }
}

/// Compiled rule
#[derive(Debug, Clone)]
pub struct RenameRule {
    pattern: Regex,
    replacement: Replacement,
    guard: Option<Regex>,
    guard_target: GuardTarget,
    pub on_conflict: ConflictPolicy,
}

impl RenameRule {
    pub fn compile(spec: &RenameRuleSpec) -> Result<Self> {
        let pattern = Regex::new(&spec.pattern)
            .with_context(|| format!("Invalid rename pattern: {}", spec.pattern))?;
        let guard = spec
            .guard
            .as_deref()
            .map(|g| Regex::new(g).with_context(|| format!("Invalid rename guard: {}", g)))
            .transpose()?;

        Ok(Self {
            pattern,
            replacement: spec.replace.clone(),
            guard,
            guard_target: spec.guard_target,
            on_conflict: spec.on_conflict,
        })
    }

    pub fn applies(&self, name: &str) -> bool {
        match &self.guard {
            Some(guard) => {
                let target = match self.guard_target {
                    GuardTarget::Name => name,
                    GuardTarget::Stem => Path::new(name)
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or(name),
                };
                guard.is_match(target)
            }
            None => self.pattern.is_match(name),
        }
    }

    /// Substitute every match in `name`
    pub fn rewrite(&self, name: &str) -> String {
        match &self.replacement {
            Replacement::Literal(text) => self
                .pattern
                .replace_all(name, regex::NoExpand(text))
                .into_owned(),
            Replacement::Lowercase => self
                .pattern
                .replace_all(name, |caps: &Captures| caps[0].to_lowercase())
                .into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenamePass {
    pub name: String,
    pub mode: PassMode,
    pub rules: Vec<RenameRule>,
}

impl RenamePass {
    /// Name after this pass, ignoring what exists on disk
    pub fn rename_name(&self, name: &str) -> String {
        let mut current = name.to_string();
        for rule in &self.rules {
            if rule.applies(&current) {
                current = rule.rewrite(&current);
                if self.mode == PassMode::FirstMatch {
                    break;
                }
            }
        }
        current
    }
}

/// Ordered passes
#[derive(Debug, Clone)]
pub struct RenamePlan {
    pub passes: Vec<RenamePass>,
}

impl RenamePlan {
    pub fn compile(specs: &[RenamePassSpec]) -> Result<Self> {
        let passes = specs
            .iter()
            .map(|spec| {
                let rules = spec
                    .rules
                    .iter()
                    .map(RenameRule::compile)
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("pass '{}'", spec.name))?;
                Ok(RenamePass {
                    name: spec.name.clone(),
                    mode: spec.mode,
                    rules,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { passes })
    }

    /// The NPR-A photo naming standard
    pub fn npra_default() -> Result<Self> {
        Self::compile(&npra_passes())
    }

    /// Final name after every pass, ignoring what exists on disk
    pub fn rename_name(&self, name: &str) -> String {
        self.passes
            .iter()
            .fold(name.to_string(), |current, pass| pass.rename_name(&current))
    }
}

/// Rule chain for NPR-A site photos
///
/// 1. GMT-2 plot prefixes become `GMT2_`
/// 2. survey prefixes (`NPRA2015_`, `NPRA_`) are removed
/// 3. trailing `_YYYYMMDD` dates are removed
/// 4–7. photo descriptors shrink to one letter: a(erial), s(oil), v(eg),
///      m(isc); targets that already exist are skipped for the ambiguous ones
/// 8. whitespace, `+` and parentheses are removed
/// 9. `_YYMMDD_` dates inside the name collapse to `_`
/// 10. descriptor codes (`_T2A1`) are lower-cased
pub fn npra_passes() -> Vec<RenamePassSpec> {
    use GuardTarget::{Name, Stem};
    use PassMode::{EachRule, FirstMatch};

    vec![
        RenamePassSpec::new(
            "gmt2 prefix",
            FirstMatch,
            vec![
                RenameRuleSpec::literal("NPRA_PLOT", "GMT2_").guarded("^NPRA_PLOT", Name),
                RenameRuleSpec::literal("NPRA_Plot", "GMT2_").guarded("^NPRA_Plot", Name),
            ],
        ),
        RenamePassSpec::new(
            "survey prefix",
            FirstMatch,
            vec![
                RenameRuleSpec::literal("NPRA2015_", "").guarded("^NPRA2015_", Name),
                RenameRuleSpec::literal("NPRA_", "").guarded("^NPRA_", Name),
            ],
        ),
        RenamePassSpec::new(
            "trailing date",
            EachRule,
            vec![RenameRuleSpec::literal(r"_+\d{8}", "").guarded(r"_+\d{8}$", Stem)],
        ),
        RenamePassSpec::new(
            "descriptor words",
            EachRule,
            vec![
                RenameRuleSpec::literal("(?i)soilcontext", "s"),
                RenameRuleSpec::literal("(?i)aerial", "a"),
                RenameRuleSpec::literal("(?i)people", "m"),
                RenameRuleSpec::literal("(?i)veg", "v"),
                RenameRuleSpec::literal("(?i)overview", "a").skip_existing(),
                RenameRuleSpec::literal("(?i)general", "m").skip_existing(),
            ],
        ),
        RenamePassSpec::new(
            "descriptor abbreviations",
            EachRule,
            vec![
                RenameRuleSpec::literal("(?i)aer", "a"),
                RenameRuleSpec::literal("(?i)air", "a"),
                RenameRuleSpec::literal("(?i)misc", "m").skip_existing(),
                RenameRuleSpec::literal("(?i)soil", "s"),
            ],
        ),
        RenamePassSpec::new(
            "landscape",
            EachRule,
            vec![RenameRuleSpec::literal("(?i)landscape", "m").skip_existing()],
        ),
        RenamePassSpec::new(
            "other",
            EachRule,
            vec![RenameRuleSpec::literal("(?i)other", "m").skip_existing()],
        ),
        RenamePassSpec::new(
            "spaces and parentheses",
            EachRule,
            vec![RenameRuleSpec::literal(r"[\s+()]", "")],
        ),
        RenamePassSpec::new(
            "inner date",
            EachRule,
            vec![RenameRuleSpec::literal(r"_+\d{6}_", "_")],
        ),
        RenamePassSpec::new(
            "lowercase codes",
            EachRule,
            vec![RenameRuleSpec::lowercase(r"_\w+\d")],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> RenamePlan {
        RenamePlan::npra_default().unwrap()
    }

    #[test]
    fn test_gmt2_prefix() {
        assert_eq!(plan().rename_name("NPRA_PLOT12_T1.jpg"), "GMT2_12_t1.jpg");
        assert_eq!(plan().rename_name("NPRA_Plot03_T2.jpg"), "GMT2_03_t2.jpg");
    }

    #[test]
    fn test_survey_prefix_first_match() {
        // NPRA2015_ wins; the NPRA_ rule must not also run
        assert_eq!(plan().passes[1].rename_name("NPRA2015_NPRA_X.jpg"), "NPRA_X.jpg");
        assert_eq!(plan().passes[1].rename_name("NPRA_AB1B.jpg"), "AB1B.jpg");
    }

    #[test]
    fn test_trailing_date_only_at_end_of_stem() {
        let pass = &plan().passes[2];
        assert_eq!(pass.rename_name("AB1B_t2a_20150712.jpg"), "AB1B_t2a.jpg");
        assert_eq!(pass.rename_name("AB1B_20150712_t2a.jpg"), "AB1B_20150712_t2a.jpg");
    }

    #[test]
    fn test_descriptor_words() {
        assert_eq!(plan().rename_name("AB1B_SoilContext.jpg"), "AB1B_s.jpg");
        assert_eq!(plan().rename_name("AB1B_Aerial1.jpg"), "AB1B_a1.jpg");
        assert_eq!(plan().rename_name("AB1B_Landscape2.jpg"), "AB1B_m2.jpg");
    }

    #[test]
    fn test_spaces_parentheses_and_inner_date() {
        assert_eq!(plan().rename_name("AB1B_150712_T2A (1).jpg"), "AB1B_t2a1.jpg");
    }

    #[test]
    fn test_literal_replacement_is_not_expanded() {
        let rule = RenameRule::compile(&RenameRuleSpec::literal("x", "$0")).unwrap();
        assert_eq!(rule.rewrite("axb"), "a$0b");
    }

    #[test]
    fn test_invalid_pattern_reports_pass() {
        let specs = vec![RenamePassSpec::new(
            "broken",
            PassMode::EachRule,
            vec![RenameRuleSpec::literal("(", "")],
        )];
        let err = RenamePlan::compile(&specs).unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }

    #[test]
    fn test_pass_json_round_trip_shape() {
        let json = serde_json::to_string(&npra_passes()[0]).unwrap();
        let back: RenamePassSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, PassMode::FirstMatch);
        assert_eq!(back.rules.len(), 2);
    }
}
