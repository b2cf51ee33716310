//! Site photo housekeeping
//!
//! - `rules`: file-name rewrite rules and the NPR-A naming standard
//! - `renamer`: applies a rule plan to a photo folder tree

pub mod renamer;
pub mod rules;

pub use renamer::{PhotoRenamer, RenameSummary};
pub use rules::{npra_passes, RenamePassSpec, RenamePlan, RenameRuleSpec};
