//! Utility modules shared by the pipeline stages
//!
//! - Frame helpers: column validation, typed column access, CSV loading

pub mod frame_helpers;

pub use frame_helpers::{float_values, read_csv, require_columns, string_values, with_string_key};
