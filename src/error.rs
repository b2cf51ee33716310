//! Typed failures for the strata pipeline and photo tools
//!
//! Everything here is fatal: the run aborts and no output file is written.
//! Callers usually carry these inside `anyhow::Error` and downcast in tests.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    /// An input table lacks a column the stage needs
    #[error("{context}: missing column '{column}'")]
    MissingColumn { context: String, column: String },

    /// A classification rule refers to a column the joined table does not have
    #[error("rule '{rule}' references missing column '{column}'")]
    RuleColumnMissing { rule: String, column: String },

    /// Export precondition violation
    #[error("export columns not present after all stages: {}", .0.join(", "))]
    MissingExportColumns(Vec<String>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Target of a rename already exists and the rule forbids overwriting
    #[error("cannot rename {from:?}: {to:?} already exists")]
    RenameCollision { from: PathBuf, to: PathBuf },
}

impl StrataError {
    pub fn missing_column(context: impl Into<String>, column: impl Into<String>) -> Self {
        StrataError::MissingColumn {
            context: context.into(),
            column: column.into(),
        }
    }
}
