//! Per-batch field normalization.
//!
//! Every coercion the engine performs lives here: missing-value detection,
//! sentinel filling and the classification-digit derivation. All of it is
//! total; a value that cannot be interpreted degrades to its default.

use crate::models::{Batch, MissingPolicy, NormalizedBatch, NormalizedRecord, Record, Statistic};

/// Tokens treated as a missing value, matched after trimming.
const NULL_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Category used when a classification code is missing or not a positive number.
const CLASSIFICATION_DEFAULT: &str = "0";

/// `true` when `raw` carries no usable value.
pub fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NULL_TOKENS.contains(&trimmed)
}

/// Trim a raw source cell, mapping missing values to `None`.
pub fn clean_field(raw: &str) -> Option<String> {
    if is_missing(raw) {
        None
    } else {
        Some(raw.trim().to_string())
    }
}

/// Derive the main-category digit from a raw classification code.
///
/// The code is parsed as a number and truncated toward zero. Missing,
/// unparseable, non-finite and non-positive codes all map to `"0"`;
/// otherwise the first digit of the integer part is returned.
///
/// ```
/// use loanstats_core::normalize::classification_digit;
///
/// assert_eq!(classification_digit(Some("813.6")), "8");
/// assert_eq!(classification_digit(Some("5")), "5");
/// assert_eq!(classification_digit(Some("abc")), "0");
/// assert_eq!(classification_digit(None), "0");
/// ```
pub fn classification_digit(raw: Option<&str>) -> String {
    let value = raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
        .trunc();

    if value <= 0.0 {
        return CLASSIFICATION_DEFAULT.to_string();
    }

    format!("{value:.0}")
        .chars()
        .next()
        .map(String::from)
        .unwrap_or_else(|| CLASSIFICATION_DEFAULT.to_string())
}

// ── FieldNormalizer ───────────────────────────────────────────────────────────

/// Stateless normalizer applied to each batch before aggregation.
pub struct FieldNormalizer;

impl FieldNormalizer {
    /// Normalize every record of `batch`.
    ///
    /// Records without a branch identifier cannot be placed in any table row
    /// and are dropped; the count is reported on the returned batch.
    pub fn normalize(batch: Batch) -> NormalizedBatch {
        let mut out = NormalizedBatch {
            records: Vec::with_capacity(batch.len()),
            dropped_without_branch: 0,
        };

        for record in batch.records {
            match Self::normalize_record(record) {
                Some(normalized) => out.records.push(normalized),
                None => out.dropped_without_branch += 1,
            }
        }

        out
    }

    /// Normalize one record, or `None` when it has no branch.
    pub fn normalize_record(record: Record) -> Option<NormalizedRecord> {
        let branch = record.branch?;
        let mut fields = record.fields;
        let categories = std::array::from_fn(|i| {
            let stat = Statistic::ALL[i];
            Self::normalize_field(stat, fields[stat.index()].take())
        });
        Some(NormalizedRecord { branch, categories })
    }

    /// Apply `stat`'s missing-value policy to one raw value.
    pub fn normalize_field(stat: Statistic, raw: Option<String>) -> String {
        match stat.missing_policy() {
            MissingPolicy::ClassificationDigit => classification_digit(raw.as_deref()),
            MissingPolicy::Fill(default) => match raw {
                Some(value) if !is_missing(&value) => value,
                _ => default.to_string(),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RESERVATION_DEFAULT, UNKNOWN_LABEL};

    // ── is_missing / clean_field ─────────────────────────────────────────────

    #[test]
    fn test_blank_and_null_tokens_are_missing() {
        assert!(is_missing(""));
        assert!(is_missing("   "));
        assert!(is_missing("NaN"));
        assert!(is_missing(" null "));
        assert!(!is_missing("0"));
        assert!(!is_missing("Unknown"));
    }

    #[test]
    fn test_clean_field_trims() {
        assert_eq!(clean_field("  Mapo  "), Some("Mapo".to_string()));
        assert_eq!(clean_field("\t"), None);
    }

    // ── classification_digit ────────────────────────────────────────────────

    #[test]
    fn test_classification_digit_decimal_code() {
        assert_eq!(classification_digit(Some("813.6")), "8");
    }

    #[test]
    fn test_classification_digit_single_digit() {
        assert_eq!(classification_digit(Some("5")), "5");
    }

    #[test]
    fn test_classification_digit_missing_or_garbage() {
        assert_eq!(classification_digit(None), "0");
        assert_eq!(classification_digit(Some("")), "0");
        assert_eq!(classification_digit(Some("K813")), "0");
        assert_eq!(classification_digit(Some("inf")), "0");
        assert_eq!(classification_digit(Some("NaN")), "0");
    }

    #[test]
    fn test_classification_digit_non_positive_collapses_to_zero() {
        assert_eq!(classification_digit(Some("-3")), "0");
        assert_eq!(classification_digit(Some("-813.6")), "0");
        assert_eq!(classification_digit(Some("0.9")), "0");
        assert_eq!(classification_digit(Some("0")), "0");
    }

    #[test]
    fn test_classification_digit_truncates_before_taking_digit() {
        assert_eq!(classification_digit(Some("9.99")), "9");
        assert_eq!(classification_digit(Some("  325.1 ")), "3");
        assert_eq!(classification_digit(Some("1e3")), "1");
    }

    // ── FieldNormalizer ──────────────────────────────────────────────────────

    #[test]
    fn test_missing_categories_get_sentinels() {
        let rec = Record::for_branch(Some("A")).with(Statistic::Age, Some("20s"));
        let norm = FieldNormalizer::normalize_record(rec).unwrap();

        assert_eq!(norm.branch, "A");
        assert_eq!(norm.category(Statistic::Age), "20s");
        assert_eq!(norm.category(Statistic::Gender), UNKNOWN_LABEL);
        assert_eq!(norm.category(Statistic::Month), UNKNOWN_LABEL);
        assert_eq!(norm.category(Statistic::Reservation), RESERVATION_DEFAULT);
        assert_eq!(norm.category(Statistic::Classification), "0");
    }

    #[test]
    fn test_present_values_pass_through() {
        let rec = Record::for_branch(Some("A"))
            .with(Statistic::Reservation, Some("Y"))
            .with(Statistic::Classification, Some("700.1"))
            .with(Statistic::Weekday, Some("Mon"));
        let norm = FieldNormalizer::normalize_record(rec).unwrap();

        assert_eq!(norm.category(Statistic::Reservation), "Y");
        assert_eq!(norm.category(Statistic::Classification), "7");
        assert_eq!(norm.category(Statistic::Weekday), "Mon");
    }

    #[test]
    fn test_normalize_field_rechecks_null_tokens() {
        assert_eq!(
            FieldNormalizer::normalize_field(Statistic::Gender, Some("NA".to_string())),
            UNKNOWN_LABEL
        );
        assert_eq!(
            FieldNormalizer::normalize_field(Statistic::Reservation, Some(String::new())),
            RESERVATION_DEFAULT
        );
    }

    #[test]
    fn test_records_without_branch_are_dropped() {
        let batch = Batch::from(vec![
            Record::for_branch(Some("A")),
            Record::for_branch(None),
            Record::for_branch(Some("B")),
        ]);
        let norm = FieldNormalizer::normalize(batch);

        assert_eq!(norm.len(), 2);
        assert_eq!(norm.dropped_without_branch, 1);
        assert_eq!(norm.records[0].branch, "A");
        assert_eq!(norm.records[1].branch, "B");
    }

    #[test]
    fn test_empty_batch() {
        let norm = FieldNormalizer::normalize(Batch::default());
        assert!(norm.is_empty());
        assert_eq!(norm.dropped_without_branch, 0);
    }
}
