//! Strata Key Rust Implementation
//!
//! Field-survey data tools for the NPR-A vegetation benchmarks:
//! - `pipeline`: programmatic key to strata (query → reshape → join →
//!   derived metrics → sentinel fill → rule cascade → CSV export)
//! - `photos`: rule-based standardisation of site photo file names
//! - `gallery`: static per-site photo gallery pages
//!
//! Stage modules (`reshape`, `join`, `derived`, `fill`, `classify`,
//! `export`) are usable on their own with any polars `DataFrame`.

pub mod classify;
pub mod config;
pub mod derived;
pub mod error;
pub mod export;
pub mod fill;
pub mod gallery;
pub mod join;
pub mod logging;
pub mod photos;
pub mod pipeline;
pub mod reshape;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use classify::{Condition, LabelCounts, Rule, RuleCascade};
pub use config::{ColumnNames, GalleryConfig, PhotoRenameConfig, StrataConfig};
pub use derived::DerivedMetric;
pub use error::StrataError;
pub use join::{JoinLedger, JoinReport};
pub use pipeline::{run_to_file, StrataOutcome, StrataPipeline, SurveyTables};
pub use source::{MemorySource, Query, QuerySource, QuerySourceConfig};
