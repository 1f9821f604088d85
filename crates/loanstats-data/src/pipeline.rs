//! End-to-end aggregation run.
//!
//! Reads the source chunk by chunk, normalizes and merges every batch into
//! all configured counters, then materializes one table per statistic.
//! A read failure aborts before anything is written; a write failure only
//! costs the affected statistic.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use loanstats_core::formatting::{format_count, format_elapsed};
use loanstats_core::models::Statistic;
use loanstats_core::normalize::FieldNormalizer;
use loanstats_core::settings::ColumnMapping;
use loanstats_core::{Result, StatsError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::aggregator::IncrementalAggregator;
use crate::materializer::TableMaterializer;
use crate::reader::ChunkReader;

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything a run needs; supplied by the caller, never prompted for.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: PathBuf,
    pub chunk_size: usize,
    pub output_dir: PathBuf,
    pub columns: ColumnMapping,
    /// Statistics to compute, in output order.
    pub statistics: Vec<Statistic>,
}

impl RunConfig {
    /// Config computing every statistic with the default column mapping.
    pub fn new(source: impl Into<PathBuf>, chunk_size: usize, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            chunk_size,
            output_dir: output_dir.into(),
            columns: ColumnMapping::default(),
            statistics: Statistic::ALL.to_vec(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StatsError::Config("chunk size must be at least 1".to_string()));
        }
        if self.statistics.is_empty() {
            return Err(StatsError::Config("no statistics selected".to_string()));
        }
        self.columns.delimiter_byte()?;
        Ok(())
    }
}

/// What happened to one statistic's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticOutcome {
    pub statistic: Statistic,
    pub path: PathBuf,
    pub written: bool,
    pub branches: usize,
    pub categories: usize,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    /// ISO-8601 timestamp when the run started.
    pub started_at: String,
    /// ISO-8601 timestamp when the last table was handled.
    pub finished_at: String,
    pub elapsed_seconds: f64,
    pub records_read: u64,
    /// Records that carried no branch identifier and were not counted.
    pub records_dropped_without_branch: u64,
    pub batches_processed: usize,
    pub branches_observed: usize,
    pub outcomes: Vec<StatisticOutcome>,
}

impl RunReport {
    /// `true` when every table was written.
    pub fn all_written(&self) -> bool {
        self.outcomes.iter().all(|o| o.written)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StatisticOutcome> {
        self.outcomes.iter().filter(|o| !o.written)
    }

    /// Write the report as pretty JSON, via a temp file and rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let fail = |source: std::io::Error| StatsError::WriteFailure {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(fail)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| fail(std::io::Error::other(e)))?;

        let tmp = path.with_extension("json.tmp");
        let written = std::fs::write(&tmp, json).and_then(|()| std::fs::rename(&tmp, path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(fail(e));
        }
        Ok(())
    }
}

// ── Public function ───────────────────────────────────────────────────────────

/// Run the full aggregation pipeline.
///
/// 1. Open the source (`SourceNotFound` / `MalformedSource` abort here,
///    before the output directory is touched).
/// 2. For each batch: normalize, then merge into every counter.
/// 3. Materialize each counter; a `WriteFailure` is logged and recorded
///    and the remaining statistics are still written.
pub fn run_aggregation(config: &RunConfig) -> Result<RunReport> {
    config.validate()?;

    let started_at = Utc::now().to_rfc3339();
    let clock = Instant::now();

    // ── Step 1: Open ──────────────────────────────────────────────────────────
    let mut reader = ChunkReader::open(
        &config.source,
        config.chunk_size,
        &config.columns,
        &config.statistics,
    )?;
    info!(
        "Aggregating {} in chunks of {} records",
        config.source.display(),
        format_count(config.chunk_size as u64)
    );

    // ── Step 2: Stream ────────────────────────────────────────────────────────
    let mut aggregator = IncrementalAggregator::new(&config.statistics);
    let mut dropped = 0u64;

    for (index, batch) in reader.by_ref().enumerate() {
        let batch = batch?;
        info!("Processing chunk {} ({} records)", index + 1, format_count(batch.len() as u64));

        let normalized = FieldNormalizer::normalize(batch);
        if normalized.dropped_without_branch > 0 {
            debug!(
                "Chunk {}: {} records without a branch skipped",
                index + 1,
                normalized.dropped_without_branch
            );
        }
        dropped += normalized.dropped_without_branch as u64;
        aggregator.merge_all(&normalized);
    }

    let records_read = reader.records_read();
    let batches_processed = reader.batches_read();
    drop(reader);

    if dropped > 0 {
        warn!(
            "{} of {} records had no branch and were not counted",
            format_count(dropped),
            format_count(records_read)
        );
    }
    info!(
        "All chunks processed: {} records in {} chunks",
        format_count(records_read),
        batches_processed
    );

    // ── Step 3: Materialize ───────────────────────────────────────────────────
    let branches_observed = aggregator.branches_observed();
    let materializer = TableMaterializer::new(&config.output_dir);
    let mut outcomes = Vec::with_capacity(config.statistics.len());

    for (stat, counter) in aggregator.into_counters() {
        let path = materializer.path_for(stat);
        let outcome = match materializer.persist(stat, &counter) {
            Ok(table) => StatisticOutcome {
                statistic: stat,
                path,
                written: true,
                branches: table.branches.len(),
                categories: table.columns.len(),
                total: table.total(),
                error: None,
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("Skipping {}: {}", stat, e);
                StatisticOutcome {
                    statistic: stat,
                    path,
                    written: false,
                    branches: counter.branch_count(),
                    categories: counter.categories().len(),
                    total: counter.grand_total(),
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let elapsed = clock.elapsed().as_secs_f64();
    info!(
        "Finished in {}: {} of {} tables written to {}",
        format_elapsed(elapsed),
        outcomes.iter().filter(|o| o.written).count(),
        outcomes.len(),
        config.output_dir.display()
    );

    Ok(RunReport {
        source: config.source.clone(),
        output_dir: config.output_dir.clone(),
        chunk_size: config.chunk_size,
        started_at,
        finished_at: Utc::now().to_rfc3339(),
        elapsed_seconds: elapsed,
        records_read,
        records_dropped_without_branch: dropped,
        batches_processed,
        branches_observed,
        outcomes,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
