use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the loan statistics engine.
#[derive(Error, Debug)]
pub enum StatsError {
    /// The input path does not resolve to a readable file.
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    /// The delimited structure of a source or result file could not be parsed.
    #[error("Malformed source {path}: {reason}")]
    MalformedSource { path: PathBuf, reason: String },

    /// A result table could not be persisted.
    #[error("Failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StatsError {
    /// Shorthand for building a [`StatsError::MalformedSource`].
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// `true` for the errors that abort a whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::WriteFailure { .. })
    }
}

/// Convenience alias used throughout the loanstats crates.
pub type Result<T> = std::result::Result<T, StatsError>;
