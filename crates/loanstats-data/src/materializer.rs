//! Dense result tables and their delimited-file form.
//!
//! A [`ResultTable`] is the rectangular view of one finished
//! [`BranchCounter`]: one row per branch, one column per observed category,
//! zero where a pair was never counted. Rows and columns are sorted, so the
//! written file depends only on the counts.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use loanstats_core::models::Statistic;
use loanstats_core::{Result, StatsError};
use tracing::{debug, info};

use crate::aggregator::BranchCounter;

// ── ResultTable ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    /// Category labels, ascending.
    pub columns: Vec<String>,
    /// Branch identifiers, ascending.
    pub branches: Vec<String>,
    /// `cells[row][column]`.
    pub cells: Vec<Vec<u64>>,
}

impl ResultTable {
    /// Densify a finished counter.
    pub fn from_counter(counter: &BranchCounter) -> Self {
        let columns: Vec<String> = counter.categories().into_iter().map(String::from).collect();
        let branches: Vec<String> = counter.branches().map(String::from).collect();
        let cells = branches
            .iter()
            .map(|branch| {
                columns
                    .iter()
                    .map(|category| counter.get_or_default(branch, category))
                    .collect()
            })
            .collect();

        Self {
            columns,
            branches,
            cells,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Cells of `branch`, in column order.
    pub fn row(&self, branch: &str) -> Option<&[u64]> {
        self.branches
            .iter()
            .position(|b| b == branch)
            .map(|i| self.cells[i].as_slice())
    }

    /// Cell value, 0 for an unknown branch or column.
    pub fn get(&self, branch: &str, column: &str) -> u64 {
        let Some(col) = self.columns.iter().position(|c| c == column) else {
            return 0;
        };
        self.row(branch).map(|row| row[col]).unwrap_or(0)
    }

    /// Row sums, in branch order.
    pub fn row_sums(&self) -> Vec<u64> {
        self.cells.iter().map(|row| row.iter().sum()).collect()
    }

    /// Sum of every cell.
    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    /// Serialize the table as CSV into `writer`.
    ///
    /// The header row has an empty leading cell followed by the category
    /// labels; every data row starts with its branch identifier.
    pub fn write_to<W: Write>(&self, writer: W) -> std::io::Result<()> {
        let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);

        let header = std::iter::once("").chain(self.columns.iter().map(String::as_str));
        csv_writer
            .write_record(header)
            .map_err(std::io::Error::other)?;

        for (branch, row) in self.branches.iter().zip(&self.cells) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(branch.clone());
            record.extend(row.iter().map(u64::to_string));
            csv_writer
                .write_record(&record)
                .map_err(std::io::Error::other)?;
        }

        csv_writer.flush()
    }

    /// Persist the table at `path`, creating the parent directory.
    ///
    /// The file is written beside the destination and renamed into place.
    /// Any failure is reported as `WriteFailure` naming `path`.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let fail = |source: std::io::Error| StatsError::WriteFailure {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(fail)?;
        }

        let tmp = temp_path(path);
        let written = File::create(&tmp)
            .and_then(|file| self.write_to(std::io::BufWriter::new(file)))
            .and_then(|()| std::fs::rename(&tmp, path));

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(fail(e));
        }
        Ok(())
    }

    /// Read a table previously written by [`ResultTable::write_csv`].
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Err(StatsError::SourceNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| {
            debug!("Cannot open {}: {}", path.display(), e);
            StatsError::SourceNotFound(path.to_path_buf())
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(BufReader::new(file));

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| StatsError::malformed(path, e.to_string()))?
            .iter()
            .skip(1)
            .map(String::from)
            .collect();

        let mut table = ResultTable {
            columns,
            ..Self::default()
        };

        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| StatsError::malformed(path, e.to_string()))?;
            let mut fields = record.iter();
            let branch = fields.next().unwrap_or_default().to_string();
            let cells = fields
                .map(|cell| {
                    cell.trim().parse::<u64>().map_err(|_| {
                        StatsError::malformed(
                            path,
                            format!("row {}: \"{cell}\" is not a count", index + 1),
                        )
                    })
                })
                .collect::<Result<Vec<u64>>>()?;
            table.branches.push(branch);
            table.cells.push(cells);
        }

        Ok(table)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── TableMaterializer ─────────────────────────────────────────────────────────

/// Writes one table per statistic into an output directory.
#[derive(Debug, Clone)]
pub struct TableMaterializer {
    output_dir: PathBuf,
}

impl TableMaterializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Destination file for `stat`.
    pub fn path_for(&self, stat: Statistic) -> PathBuf {
        self.output_dir.join(stat.output_file_name())
    }

    /// Densify `counter` and write it to `stat`'s file.
    pub fn persist(&self, stat: Statistic, counter: &BranchCounter) -> Result<ResultTable> {
        let table = ResultTable::from_counter(counter);
        let path = self.path_for(stat);
        table.write_csv(&path)?;
        info!(
            "Wrote {} ({} branches × {} categories)",
            path.display(),
            table.branches.len(),
            table.columns.len()
        );
        Ok(table)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
