//! Run configuration
//!
//! Each tool reads one JSON file at start-up. Every field has a default that
//! reproduces the NPR-A benchmark setup, so a config file only needs the
//! values that differ. Relative paths are resolved against a project root
//! with `rooted`.

use crate::classify::{physiography_rules, Rule, RuleCascade};
use crate::derived::{DerivedMetric, MetricColumns};
use crate::fill::DEFAULT_SENTINEL;
use crate::photos::rules::{npra_passes, RenamePassSpec};
use crate::source::QuerySourceConfig;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Read and parse a JSON config file
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    serde_json::from_str(&contents).with_context(|| format!("Failed to parse config JSON: {:?}", path))
}

fn rooted(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Input/output column names; schema drift is handled here, not in code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// Join key shared by every table
    pub site_visit: String,
    pub site: String,
    pub vegetation_code: String,
    pub vegetation_cover: String,
    /// Rows with this flag set are excluded; `None` keeps every row
    pub dead_flag: Option<String>,
    pub ground_element: String,
    pub ground_cover: String,
    /// Taxon code on the functional-group table
    pub functional_code: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            site_visit: "site_visit_code".to_string(),
            site: "site_code".to_string(),
            vegetation_code: "code_accepted".to_string(),
            vegetation_cover: "cover_percent".to_string(),
            dead_flag: Some("dead_status".to_string()),
            ground_element: "ground_element".to_string(),
            ground_cover: "ground_cover_percent".to_string(),
            functional_code: "taxon_accepted_code".to_string(),
        }
    }
}

impl ColumnNames {
    pub fn metric_columns(&self) -> MetricColumns<'_> {
        MetricColumns {
            key: &self.site_visit,
            code: &self.vegetation_code,
            value: &self.vegetation_cover,
            lookup_code: &self.functional_code,
        }
    }
}

/// Programmatic key to strata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Existing strata table (one row per site visit)
    pub strata_input: PathBuf,
    /// Taxon → functional group lookup
    pub functional_input: PathBuf,
    pub vegetation_query: PathBuf,
    pub ground_query: PathBuf,
    pub environment_query: PathBuf,
    pub output: PathBuf,
    pub source: QuerySourceConfig,
    pub columns: ColumnNames,
    pub derived_metrics: Vec<DerivedMetric>,
    /// Value written into every absent cell
    pub sentinel: f64,
    pub label_column: String,
    pub default_label: String,
    /// Evaluated in order; first match wins
    pub rules: Vec<Rule>,
    pub export_columns: Vec<String>,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            strata_input: PathBuf::from("Data_Input/strata/AIM_NPRA_Strata.csv"),
            functional_input: PathBuf::from(
                "Data_Output/functional_groups/AIM_NPRA_Functional_Groups.csv",
            ),
            vegetation_query: PathBuf::from("queries/npra_05_vegetation_query.sql"),
            ground_query: PathBuf::from("queries/npra_08_ground_query.sql"),
            environment_query: PathBuf::from("queries/npra_12_environment_query.sql"),
            output: PathBuf::from("Data_Output/strata/AIM_NPRA_Strata_Revised.csv"),
            source: QuerySourceConfig::default(),
            columns: ColumnNames::default(),
            derived_metrics: vec![DerivedMetric::wetland_sedge(), DerivedMetric::aquatic_moss()],
            sentinel: DEFAULT_SENTINEL,
            label_column: "physiography_revised".to_string(),
            default_label: "none".to_string(),
            rules: physiography_rules(),
            export_columns: vec![
                "site_code".to_string(),
                "site_visit_code".to_string(),
                "physiography_revised".to_string(),
            ],
        }
    }
}

impl StrataConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_json(path)?;
        config.cascade().check()?;
        Ok(config)
    }

    /// Resolve every relative path against `root`
    pub fn rooted(mut self, root: &Path) -> Self {
        self.strata_input = rooted(root, &self.strata_input);
        self.functional_input = rooted(root, &self.functional_input);
        self.vegetation_query = rooted(root, &self.vegetation_query);
        self.ground_query = rooted(root, &self.ground_query);
        self.environment_query = rooted(root, &self.environment_query);
        self.output = rooted(root, &self.output);
        self.source = match self.source {
            QuerySourceConfig::CsvSnapshot { dir } => QuerySourceConfig::CsvSnapshot {
                dir: rooted(root, &dir),
            },
            QuerySourceConfig::DuckDb { path } => QuerySourceConfig::DuckDb {
                path: rooted(root, &path),
            },
        };
        self
    }

    pub fn cascade(&self) -> RuleCascade {
        RuleCascade::new(
            &self.label_column,
            &self.default_label,
            self.sentinel,
            self.rules.clone(),
        )
    }
}

/// Photo file-name standardisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoRenameConfig {
    pub photo_root: PathBuf,
    /// Extension of files to rename, case-insensitive
    pub extension: String,
    pub passes: Vec<RenamePassSpec>,
}

impl Default for PhotoRenameConfig {
    fn default() -> Self {
        Self {
            photo_root: PathBuf::from("npra_photos"),
            extension: "jpg".to_string(),
            passes: npra_passes(),
        }
    }
}

impl PhotoRenameConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Per-site gallery pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Photo list with one row per image
    pub photo_list: PathBuf,
    pub folder_column: String,
    pub image_column: String,
    /// Photo extension used when scanning a folder tree, case-insensitive
    pub extension: String,
    /// Public storage prefix, ending in `/`
    pub url_root: String,
    pub output_dir: PathBuf,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            photo_list: PathBuf::from("Data_Output/AIM_NPRA_Photo_List.csv"),
            folder_column: "folder_name".to_string(),
            image_column: "image_name".to_string(),
            extension: "jpg".to_string(),
            url_root: "https://storage.googleapis.com/accs-public-data/npra_photos/".to_string(),
            output_dir: PathBuf::from("Data_Output/html"),
        }
    }
}

impl GalleryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = load_json(path)?;
        if !config.url_root.is_empty() && !config.url_root.ends_with('/') {
            config.url_root.push('/');
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Condition;

    #[test]
    fn test_defaults_match_npra_setup() {
        let config = StrataConfig::default();

        assert_eq!(config.sentinel, -999.0);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].name, "wetland");
        assert_eq!(config.derived_metrics[0].name, "wetsed");
        assert_eq!(config.columns.site_visit, "site_visit_code");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.json");
        fs::write(
            &path,
            r#"{
                "output": "out/revised.csv",
                "columns": { "site_visit": "visit_id" },
                "rules": [
                    { "name": "tundra", "label": "tundra",
                      "when": { "op": "gt", "column": "erivag", "value": 5 } }
                ]
            }"#,
        )
        .unwrap();

        let config = StrataConfig::load(&path).unwrap();

        assert_eq!(config.output, PathBuf::from("out/revised.csv"));
        assert_eq!(config.columns.site_visit, "visit_id");
        assert_eq!(config.columns.vegetation_code, "code_accepted");
        assert_eq!(config.rules[0].when, Condition::gt("erivag", 5.0));
        assert_eq!(config.default_label, "none");
    }

    #[test]
    fn test_load_rejects_duplicate_rule_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.json");
        fs::write(
            &path,
            r#"{ "rules": [
                { "name": "a", "label": "x", "when": { "op": "gt", "column": "c", "value": 1 } },
                { "name": "a", "label": "y", "when": { "op": "gt", "column": "c", "value": 2 } }
            ] }"#,
        )
        .unwrap();

        assert!(StrataConfig::load(&path).is_err());
    }

    #[test]
    fn test_rooted_paths() {
        let config = StrataConfig::default().rooted(Path::new("/data/npra"));

        assert_eq!(
            config.strata_input,
            PathBuf::from("/data/npra/Data_Input/strata/AIM_NPRA_Strata.csv")
        );
        assert_eq!(
            config.source,
            QuerySourceConfig::CsvSnapshot {
                dir: PathBuf::from("/data/npra/Data_Input/query_results")
            }
        );
    }

    #[test]
    fn test_gallery_url_root_gets_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(&path, r#"{ "url_root": "https://example.org/photos", "extension": "png" }"#).unwrap();

        let config = GalleryConfig::load(&path).unwrap();
        assert_eq!(config.url_root, "https://example.org/photos/");
        assert_eq!(config.folder_column, "folder_name");
        assert_eq!(config.extension, "png");
        assert_eq!(GalleryConfig::default().extension, "jpg");
    }

    #[test]
    fn test_photo_config_default_passes() {
        let config = PhotoRenameConfig::default();
        assert_eq!(config.passes.len(), 10);
        assert_eq!(config.extension, "jpg");
    }
}
