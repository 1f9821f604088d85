//! Branch and category ranking over materialized tables.

use std::cmp::Reverse;

use crate::materializer::ResultTable;

/// A labelled count produced by the ranking helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    pub label: String,
    pub count: u64,
}

/// The `n` branches with the largest row sums, busiest first.
///
/// Ties are broken by branch name so the ranking is stable across runs.
pub fn top_branches(table: &ResultTable, n: usize) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = table
        .branches
        .iter()
        .zip(table.row_sums())
        .map(|(branch, count)| Ranked {
            label: branch.clone(),
            count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        Reverse(a.count)
            .cmp(&Reverse(b.count))
            .then_with(|| a.label.cmp(&b.label))
    });
    ranked.truncate(n);
    ranked
}

/// The `k` largest non-zero categories of `branch`, largest first.
///
/// Returns an empty list when the branch is absent from `table`.
pub fn top_categories(table: &ResultTable, branch: &str, k: usize) -> Vec<Ranked> {
    let Some(row) = table.row(branch) else {
        return Vec::new();
    };

    let mut ranked: Vec<Ranked> = table
        .columns
        .iter()
        .zip(row)
        .filter(|(_, &count)| count > 0)
        .map(|(label, &count)| Ranked {
            label: label.clone(),
            count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        Reverse(a.count)
            .cmp(&Reverse(b.count))
            .then_with(|| a.label.cmp(&b.label))
    });
    ranked.truncate(k);
    ranked
}
