//! Chunked aggregation engine for library loan statistics.
//!
//! Reads a delimited transaction file in bounded batches, accumulates one
//! branch × category counter per statistic, materializes each counter to a
//! dense table and reads those tables back for ranking.

pub mod aggregator;
pub mod materializer;
pub mod pipeline;
pub mod ranking;
pub mod reader;

pub use loanstats_core as core;
