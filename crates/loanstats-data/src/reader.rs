//! Chunked reading of delimited loan transaction files.
//!
//! [`ChunkReader`] opens a source once, resolves the configured columns
//! against its header and then yields [`Batch`]es of at most `chunk_size`
//! records in file order. Only the projected columns are kept per record.

use std::fs::File;
use std::io::BufReader;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use loanstats_core::models::{Batch, Record, Statistic, STATISTIC_COUNT};
use loanstats_core::normalize::{clean_field, is_missing};
use loanstats_core::settings::ColumnMapping;
use loanstats_core::{Result, StatsError};
use tracing::{debug, warn};

/// Upper bound on the up-front allocation for a single batch.
const MAX_PREALLOCATED_RECORDS: usize = 64 * 1024;

const BOM: char = '\u{feff}';

// ── Projection ────────────────────────────────────────────────────────────────

/// Column positions of the fields the engine reads.
#[derive(Debug, Clone)]
struct Projection {
    branch: usize,
    fields: [Option<usize>; STATISTIC_COUNT],
}

impl Projection {
    fn resolve(
        path: &Path,
        headers: &csv::StringRecord,
        mapping: &ColumnMapping,
        statistics: &[Statistic],
    ) -> Result<Self> {
        let branch = find_column(headers, &mapping.branch)
            .ok_or_else(|| missing_column(path, &mapping.branch))?;

        let mut fields = [None; STATISTIC_COUNT];
        for &stat in statistics {
            let name = mapping.column(stat);
            let index = find_column(headers, name).ok_or_else(|| missing_column(path, name))?;
            fields[stat.index()] = Some(index);
        }

        Ok(Self { branch, fields })
    }

    fn project(&self, row: &csv::StringRecord) -> Record {
        let cell = |index: usize| row.get(index).and_then(clean_field);
        // Branch identifiers are compared byte for byte, so they are not trimmed.
        let branch = row
            .get(self.branch)
            .filter(|raw| !is_missing(raw))
            .map(str::to_string);
        Record {
            branch,
            fields: self.fields.map(|index| index.and_then(cell)),
        }
    }
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches(BOM).trim() == name)
}

fn missing_column(path: &Path, name: &str) -> StatsError {
    StatsError::malformed(path, format!("required column \"{name}\" not found in header"))
}

fn malformed_csv(path: &Path, err: csv::Error) -> StatsError {
    StatsError::malformed(path, err.to_string())
}

fn open_source(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    if path.is_dir() {
        return Err(StatsError::SourceNotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| {
        debug!("Cannot open {}: {}", path.display(), e);
        StatsError::SourceNotFound(path.to_path_buf())
    })?;

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file)))
}

// ── ChunkReader ───────────────────────────────────────────────────────────────

/// Lazy, finite, non-restartable sequence of record batches.
///
/// The file handle is held until the source is exhausted, the first error is
/// yielded, or the reader is dropped. After an error the iterator is fused.
pub struct ChunkReader {
    path: PathBuf,
    reader: Option<csv::Reader<BufReader<File>>>,
    projection: Projection,
    chunk_size: usize,
    row: csv::StringRecord,
    batches_read: usize,
    records_read: u64,
}

impl ChunkReader {
    /// Open `path` and resolve the columns needed for `statistics`.
    ///
    /// Fails with `Config` for a zero chunk size, `SourceNotFound` when the
    /// path does not resolve and `MalformedSource` when the header cannot be
    /// read or lacks a required column.
    pub fn open(
        path: &Path,
        chunk_size: usize,
        mapping: &ColumnMapping,
        statistics: &[Statistic],
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StatsError::Config("chunk size must be at least 1".to_string()));
        }

        let mut reader = open_source(path, mapping.delimiter_byte()?)?;
        let headers = reader
            .headers()
            .map_err(|e| malformed_csv(path, e))?
            .clone();
        let projection = Projection::resolve(path, &headers, mapping, statistics)?;

        debug!(
            "Opened {} ({} columns, chunk size {})",
            path.display(),
            headers.len(),
            chunk_size
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            projection,
            chunk_size,
            row: csv::StringRecord::new(),
            batches_read: 0,
            records_read: 0,
        })
    }

    /// Number of batches yielded so far.
    pub fn batches_read(&self) -> usize {
        self.batches_read
    }

    /// Number of records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// `true` while the source handle is still open.
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;

        let mut batch = Batch::with_capacity(self.chunk_size.min(MAX_PREALLOCATED_RECORDS));
        let mut exhausted = false;
        let mut failure = None;

        while batch.len() < self.chunk_size {
            match reader.read_record(&mut self.row) {
                Ok(true) => batch.records.push(self.projection.project(&self.row)),
                Ok(false) => {
                    exhausted = true;
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            self.reader = None;
            warn!("Stopped reading {} after a parse error", self.path.display());
            return Some(Err(malformed_csv(&self.path, err)));
        }
        if exhausted {
            self.reader = None;
        }
        if batch.is_empty() {
            return None;
        }

        self.batches_read += 1;
        self.records_read += batch.len() as u64;
        Some(Ok(batch))
    }
}

impl FusedIterator for ChunkReader {}

// ── Preview ───────────────────────────────────────────────────────────────────

/// Header and leading rows of a source, as raw strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourcePreview {
    /// Mapped columns that do not appear in the header, as `(role, column)`.
    pub fn missing_columns<'a>(&self, mapping: &'a ColumnMapping) -> Vec<(&'static str, &'a str)> {
        let mut wanted: Vec<(&'static str, &'a str)> = vec![("branch", mapping.branch.as_str())];
        wanted.extend(Statistic::ALL.iter().map(|&s| (s.key(), mapping.column(s))));

        wanted
            .into_iter()
            .filter(|(_, column)| {
                !self
                    .headers
                    .iter()
                    .any(|h| h.trim_start_matches(BOM).trim() == *column)
            })
            .collect()
    }
}

/// Read the header and up to `rows` records of `path`.
pub fn preview_source(path: &Path, delimiter: u8, rows: usize) -> Result<SourcePreview> {
    let mut reader = open_source(path, delimiter)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed_csv(path, e))?
        .iter()
        .map(|h| h.trim_start_matches(BOM).to_string())
        .collect();

    let mut preview_rows = Vec::with_capacity(rows);
    for result in reader.records().take(rows) {
        let record = result.map_err(|e| malformed_csv(path, e))?;
        preview_rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(SourcePreview {
        headers,
        rows: preview_rows,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
