//! Incremental branch × category counting.
//!
//! Each statistic owns a [`BranchCounter`]. Batches are grouped locally and
//! the local counts are added to the running totals, so the final state does
//! not depend on where batch boundaries fall.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use loanstats_core::models::{NormalizedBatch, Statistic};
use tracing::debug;

// ── BranchCounter ─────────────────────────────────────────────────────────────

/// Running counts keyed by branch, then by category value.
///
/// Reads never create keys; [`BranchCounter::add`] and
/// [`BranchCounter::merge`] are the only ways entries appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchCounter {
    counts: BTreeMap<String, BTreeMap<String, u64>>,
}

impl BranchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to `[branch][category]`. Zero counts are ignored.
    pub fn add(&mut self, branch: &str, category: &str, count: u64) {
        if count == 0 {
            return;
        }
        if let Some(row) = self.counts.get_mut(branch) {
            bump(row, category, count);
        } else {
            let mut row = BTreeMap::new();
            row.insert(category.to_string(), count);
            self.counts.insert(branch.to_string(), row);
        }
    }

    /// Count at `[branch][category]`, or 0 when the pair was never seen.
    pub fn get_or_default(&self, branch: &str, category: &str) -> u64 {
        self.counts
            .get(branch)
            .and_then(|row| row.get(category))
            .copied()
            .unwrap_or(0)
    }

    /// Category counts of one branch.
    pub fn row(&self, branch: &str) -> Option<&BTreeMap<String, u64>> {
        self.counts.get(branch)
    }

    /// Sum of every cell.
    pub fn grand_total(&self) -> u64 {
        self.counts.values().flat_map(|row| row.values()).sum()
    }

    /// Branch keys in ascending order.
    pub fn branches(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    /// Union of category keys across all branches, ascending.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.counts
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    pub fn branch_count(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Fold every count of `other` into `self`.
    pub fn merge(&mut self, other: &BranchCounter) {
        for (branch, row) in &other.counts {
            for (category, &count) in row {
                self.add(branch, category, count);
            }
        }
    }
}

fn bump(row: &mut BTreeMap<String, u64>, category: &str, count: u64) {
    if let Some(total) = row.get_mut(category) {
        *total += count;
    } else {
        row.insert(category.to_string(), count);
    }
}

// ── IncrementalAggregator ─────────────────────────────────────────────────────

/// One [`BranchCounter`] per configured statistic, fed batch by batch.
#[derive(Debug, Clone, Default)]
pub struct IncrementalAggregator {
    counters: BTreeMap<Statistic, BranchCounter>,
}

impl IncrementalAggregator {
    /// Create empty counters for `statistics`.
    pub fn new(statistics: &[Statistic]) -> Self {
        Self {
            counters: statistics
                .iter()
                .map(|&stat| (stat, BranchCounter::new()))
                .collect(),
        }
    }

    /// Configured statistics in ascending order.
    pub fn statistics(&self) -> impl Iterator<Item = Statistic> + '_ {
        self.counters.keys().copied()
    }

    pub fn counter(&self, stat: Statistic) -> Option<&BranchCounter> {
        self.counters.get(&stat)
    }

    /// Merge one batch's contribution into the counter for `stat`.
    ///
    /// Records are grouped by (branch, category) first and each local count
    /// is added once. An empty batch, or a statistic that was not configured,
    /// leaves every counter untouched.
    pub fn merge_batch(&mut self, stat: Statistic, batch: &NormalizedBatch) {
        let Some(counter) = self.counters.get_mut(&stat) else {
            return;
        };
        if batch.is_empty() {
            return;
        }

        let mut local: HashMap<(&str, &str), u64> = HashMap::new();
        for record in &batch.records {
            *local
                .entry((record.branch.as_str(), record.category(stat)))
                .or_insert(0) += 1;
        }

        debug!(
            "{}: merging {} pairs from {} records",
            stat,
            local.len(),
            batch.len()
        );

        for ((branch, category), count) in local {
            counter.add(branch, category, count);
        }
    }

    /// Merge `batch` into every configured counter.
    pub fn merge_all(&mut self, batch: &NormalizedBatch) {
        let stats: Vec<Statistic> = self.statistics().collect();
        for stat in stats {
            self.merge_batch(stat, batch);
        }
    }

    /// Distinct branches seen by any counter.
    pub fn branches_observed(&self) -> usize {
        self.counters
            .values()
            .flat_map(|counter| counter.branches())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Freeze the run and hand the counters over for materialization.
    pub fn into_counters(self) -> BTreeMap<Statistic, BranchCounter> {
        self.counters
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
