//! Shared types for the loanstats workspace.
//!
//! Holds the statistic catalogue, record and batch types, the field
//! normalizer, the error taxonomy and the CLI/column-mapping settings.

pub mod error;
pub mod formatting;
pub mod models;
pub mod normalize;
pub mod settings;

pub use error::{Result, StatsError};
