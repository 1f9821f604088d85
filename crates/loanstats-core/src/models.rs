use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel category for a missing categorical value.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Default category for a missing reservation flag.
pub const RESERVATION_DEFAULT: &str = "N";

/// Number of statistics tracked per run.
pub const STATISTIC_COUNT: usize = 8;

/// How a statistic's source field is turned into a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Missing values become the given label; present values are kept as-is.
    Fill(&'static str),
    /// The category is the leading digit of a numeric classification code.
    ClassificationDigit,
}

/// One independent aggregation dimension, tracked as its own counter and
/// written to its own table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
pub enum Statistic {
    #[serde(rename = "gender")]
    #[value(name = "gender")]
    Gender,
    #[serde(rename = "age")]
    #[value(name = "age")]
    Age,
    #[serde(rename = "location")]
    #[value(name = "location")]
    Location,
    #[serde(rename = "kdc")]
    #[value(name = "kdc")]
    Classification,
    #[serde(rename = "day")]
    #[value(name = "day")]
    Weekday,
    #[serde(rename = "month")]
    #[value(name = "month")]
    Month,
    #[serde(rename = "time")]
    #[value(name = "time")]
    TimeSlot,
    #[serde(rename = "reserve")]
    #[value(name = "reserve")]
    Reservation,
}

impl Statistic {
    /// Every statistic, in output order.
    pub const ALL: [Statistic; STATISTIC_COUNT] = [
        Statistic::Gender,
        Statistic::Age,
        Statistic::Location,
        Statistic::Classification,
        Statistic::Weekday,
        Statistic::Month,
        Statistic::TimeSlot,
        Statistic::Reservation,
    ];

    /// Stable position of this statistic inside a [`Record`].
    pub fn index(self) -> usize {
        match self {
            Statistic::Gender => 0,
            Statistic::Age => 1,
            Statistic::Location => 2,
            Statistic::Classification => 3,
            Statistic::Weekday => 4,
            Statistic::Month => 5,
            Statistic::TimeSlot => 6,
            Statistic::Reservation => 7,
        }
    }

    /// Short key used on the command line and in reports.
    pub fn key(self) -> &'static str {
        match self {
            Statistic::Gender => "gender",
            Statistic::Age => "age",
            Statistic::Location => "location",
            Statistic::Classification => "kdc",
            Statistic::Weekday => "day",
            Statistic::Month => "month",
            Statistic::TimeSlot => "time",
            Statistic::Reservation => "reserve",
        }
    }

    /// Human-readable title.
    pub fn title(self) -> &'static str {
        match self {
            Statistic::Gender => "Users by gender",
            Statistic::Age => "Users by age band",
            Statistic::Location => "Users by residence area",
            Statistic::Classification => "Loans by KDC main category",
            Statistic::Weekday => "Loans by weekday",
            Statistic::Month => "Loans by month",
            Statistic::TimeSlot => "Loans by time slot",
            Statistic::Reservation => "Loans by reservation flag",
        }
    }

    /// File name of the materialized table inside the output directory.
    pub fn output_file_name(self) -> &'static str {
        match self {
            Statistic::Gender => "library_user_gender.csv",
            Statistic::Age => "library_user_age.csv",
            Statistic::Location => "library_user_location.csv",
            Statistic::Classification => "library_kdc_main_category_counts.csv",
            Statistic::Weekday => "library_day_counts.csv",
            Statistic::Month => "library_month_counts.csv",
            Statistic::TimeSlot => "library_time_counts.csv",
            Statistic::Reservation => "library_reserve_counts.csv",
        }
    }

    pub fn missing_policy(self) -> MissingPolicy {
        match self {
            Statistic::Classification => MissingPolicy::ClassificationDigit,
            Statistic::Reservation => MissingPolicy::Fill(RESERVATION_DEFAULT),
            _ => MissingPolicy::Fill(UNKNOWN_LABEL),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ── Raw records ───────────────────────────────────────────────────────────────

/// One loan or membership event as read from the source.
///
/// Holds only the projected columns. `None` marks a missing value. Present
/// field values are already trimmed; the branch is kept as read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub branch: Option<String>,
    pub fields: [Option<String>; STATISTIC_COUNT],
}

impl Record {
    /// Builder used mostly by tests.
    pub fn with(mut self, stat: Statistic, value: Option<&str>) -> Self {
        self.fields[stat.index()] = value.map(str::to_string);
        self
    }

    pub fn for_branch(branch: Option<&str>) -> Self {
        Self {
            branch: branch.map(str::to_string),
            ..Self::default()
        }
    }
}

/// A bounded, ordered slice of the source stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub records: Vec<Record>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

// ── Normalized records ────────────────────────────────────────────────────────

/// A record after normalization: every category is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub branch: String,
    pub categories: [String; STATISTIC_COUNT],
}

impl NormalizedRecord {
    pub fn category(&self, stat: Statistic) -> &str {
        &self.categories[stat.index()]
    }
}

/// Output of the field normalizer for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    /// Records dropped because they carried no branch identifier.
    pub dropped_without_branch: usize,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
