use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, StatsError};
use crate::models::Statistic;

/// Default number of records per batch.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;

/// Default directory for materialized tables.
pub const DEFAULT_OUTPUT_DIR: &str = "analysis_results";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Branch-level loan statistics for public library transaction logs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "loanstats",
    about = "Branch-level loan statistics for public library transaction logs",
    version
)]
pub struct Settings {
    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stream the source in chunks and write one count table per statistic
    Aggregate(AggregateArgs),
    /// Show the source header and its first rows
    Inspect(InspectArgs),
    /// Rank branches from previously written tables
    Top(TopArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    /// Delimited loan transaction file
    #[arg(long)]
    pub source: PathBuf,

    /// Records per batch
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: u64,

    /// Directory the count tables are written to
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// JSON file overriding source column names and delimiter
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated subset of statistics (default: all)
    #[arg(long, value_delimiter = ',')]
    pub statistics: Vec<Statistic>,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Delimited loan transaction file
    #[arg(long)]
    pub source: PathBuf,

    /// Number of rows to preview
    #[arg(long, default_value_t = 5)]
    pub rows: usize,

    /// JSON file overriding source column names and delimiter
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TopArgs {
    /// Directory holding the count tables
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub input_dir: PathBuf,

    /// Statistic whose row sums rank the branches
    #[arg(long, value_enum, default_value_t = Statistic::Age)]
    pub rank_by: Statistic,

    /// Number of branches to show
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Number of leading categories shown per branch
    #[arg(long, default_value_t = 5)]
    pub categories: usize,

    /// Comma-separated statistics to break down (default: all)
    #[arg(long, value_delimiter = ',')]
    pub statistics: Vec<Statistic>,
}

impl Settings {
    /// Level name handed to the logging bootstrap; `--debug` wins.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }
}

/// Expand an empty selection to every statistic and drop duplicates,
/// preserving the canonical output order.
pub fn resolve_statistics(selected: &[Statistic]) -> Vec<Statistic> {
    if selected.is_empty() {
        return Statistic::ALL.to_vec();
    }
    Statistic::ALL
        .into_iter()
        .filter(|stat| selected.contains(stat))
        .collect()
}

// ── ColumnMapping ──────────────────────────────────────────────────────────────

/// Source column names and delimiter, loadable from a JSON file.
///
/// Every key is optional; absent keys keep the headers of the public
/// library loan dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub branch: String,
    pub gender: String,
    pub age: String,
    pub location: String,
    pub classification: String,
    pub weekday: String,
    pub month: String,
    pub time_slot: String,
    pub reservation: String,
    pub delimiter: char,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            branch: "도서관명".to_string(),
            gender: "성별".to_string(),
            age: "연령구간".to_string(),
            location: "시군구".to_string(),
            classification: "KDC분류기호".to_string(),
            weekday: "대출요일".to_string(),
            month: "대출월".to_string(),
            time_slot: "대출시간대".to_string(),
            reservation: "예약대출".to_string(),
            delimiter: ',',
        }
    }
}

impl ColumnMapping {
    /// Source header feeding `stat`.
    pub fn column(&self, stat: Statistic) -> &str {
        match stat {
            Statistic::Gender => &self.gender,
            Statistic::Age => &self.age,
            Statistic::Location => &self.location,
            Statistic::Classification => &self.classification,
            Statistic::Weekday => &self.weekday,
            Statistic::Month => &self.month,
            Statistic::TimeSlot => &self.time_slot,
            Statistic::Reservation => &self.reservation,
        }
    }

    /// The delimiter as the single byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(StatsError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )))
        }
    }

    /// Load a mapping from an explicit JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StatsError::Config(format!("cannot read column mapping {}: {e}", path.display()))
        })?;
        let mapping: Self = serde_json::from_str(&content).map_err(|e| {
            StatsError::Config(format!("invalid column mapping {}: {e}", path.display()))
        })?;
        mapping.delimiter_byte()?;
        debug!("Loaded column mapping from {}", path.display());
        Ok(mapping)
    }

    /// Load from `path` when given, otherwise use the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => Ok(Self::default()),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(args).expect("args should parse")
    }

    // ── CLI ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_aggregate_defaults() {
        let settings = parse(&["loanstats", "aggregate", "--source", "loans.csv"]);
        let Command::Aggregate(args) = settings.command else {
            panic!("expected aggregate");
        };
        assert_eq!(args.source, PathBuf::from("loans.csv"));
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(args.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(args.statistics.is_empty());
        assert!(args.report.is_none());
        assert_eq!(settings.log_level, "INFO");
    }

    #[test]
    fn test_aggregate_rejects_zero_chunk_size() {
        let result = Settings::try_parse_from([
            "loanstats",
            "aggregate",
            "--source",
            "loans.csv",
            "--chunk-size",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_statistics_list_parses_keys() {
        let settings = parse(&[
            "loanstats",
            "aggregate",
            "--source",
            "loans.csv",
            "--statistics",
            "kdc,reserve",
        ]);
        let Command::Aggregate(args) = settings.command else {
            panic!("expected aggregate");
        };
        assert_eq!(
            args.statistics,
            vec![Statistic::Classification, Statistic::Reservation]
        );
    }

    #[test]
    fn test_top_defaults() {
        let settings = parse(&["loanstats", "top"]);
        let Command::Top(args) = settings.command else {
            panic!("expected top");
        };
        assert_eq!(args.rank_by, Statistic::Age);
        assert_eq!(args.top, 5);
        assert_eq!(args.categories, 5);
    }

    #[test]
    fn test_debug_flag_overrides_level() {
        let settings = parse(&["loanstats", "--log-level", "ERROR", "--debug", "top"]);
        assert_eq!(settings.effective_log_level(), "DEBUG");
        let settings = parse(&["loanstats", "top", "--log-level", "WARNING"]);
        assert_eq!(settings.effective_log_level(), "WARNING");
    }

    #[test]
    fn test_resolve_statistics() {
        assert_eq!(resolve_statistics(&[]), Statistic::ALL.to_vec());
        assert_eq!(
            resolve_statistics(&[Statistic::Month, Statistic::Gender, Statistic::Month]),
            vec![Statistic::Gender, Statistic::Month]
        );
    }

    // ── ColumnMapping ────────────────────────────────────────────────────────

    #[test]
    fn test_default_mapping_uses_dataset_headers() {
        let mapping = ColumnMapping::default();
        assert_eq!(mapping.branch, "도서관명");
        assert_eq!(mapping.column(Statistic::Classification), "KDC분류기호");
        assert_eq!(mapping.delimiter_byte().unwrap(), b',');
    }

    #[test]
    fn test_partial_mapping_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"branch": "library", "delimiter": ";"}}"#).unwrap();

        let mapping = ColumnMapping::load_from(file.path()).unwrap();
        assert_eq!(mapping.branch, "library");
        assert_eq!(mapping.delimiter_byte().unwrap(), b';');
        assert_eq!(mapping.age, "연령구간");
    }

    #[test]
    fn test_unknown_mapping_key_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"brnach": "library"}}"#).unwrap();

        let err = ColumnMapping::load_from(file.path()).unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"delimiter": "→"}}"#).unwrap();

        assert!(ColumnMapping::load_from(file.path()).is_err());
    }

    #[test]
    fn test_missing_mapping_file_is_config_error() {
        let err = ColumnMapping::load_from(Path::new("/no/such/mapping.json")).unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
    }

    #[test]
    fn test_resolve_without_path_is_default() {
        assert_eq!(ColumnMapping::resolve(None).unwrap(), ColumnMapping::default());
    }
}
