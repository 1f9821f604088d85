//! Subcommand handlers: run the engine, preview a source, rank branches.

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table};
use loanstats_core::formatting::{format_count, percentage};
use loanstats_core::models::Statistic;
use loanstats_core::settings::{
    resolve_statistics, AggregateArgs, ColumnMapping, InspectArgs, TopArgs,
};
use loanstats_core::StatsError;
use loanstats_data::materializer::ResultTable;
use loanstats_data::pipeline::{run_aggregation, RunConfig, RunReport};
use loanstats_data::ranking::{top_branches, top_categories, Ranked};
use loanstats_data::reader::{preview_source, SourcePreview};
use tracing::{info, warn};

// ── aggregate ─────────────────────────────────────────────────────────────────

pub fn aggregate(args: &AggregateArgs) -> Result<()> {
    let config = RunConfig {
        source: args.source.clone(),
        chunk_size: usize::try_from(args.chunk_size).context("chunk size does not fit in memory")?,
        output_dir: args.output_dir.clone(),
        columns: ColumnMapping::resolve(args.config.as_deref())?,
        statistics: resolve_statistics(&args.statistics),
    };

    let report = run_aggregation(&config)?;
    println!("{}", outcome_table(&report));

    if let Some(path) = &args.report {
        report.save_to(path)?;
        info!("Run report saved to {}", path.display());
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!(
            "{} of {} tables could not be written",
            failed,
            report.outcomes.len()
        );
    }
    Ok(())
}

fn outcome_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Statistic",
        "File",
        "Branches",
        "Categories",
        "Total",
        "Status",
    ]);
    for outcome in &report.outcomes {
        let status = match &outcome.error {
            None => "written".to_string(),
            Some(e) => format!("failed: {e}"),
        };
        table.add_row(vec![
            Cell::new(outcome.statistic),
            Cell::new(outcome.path.display()),
            Cell::new(outcome.branches),
            Cell::new(outcome.categories),
            Cell::new(format_count(outcome.total)),
            Cell::new(status),
        ]);
    }
    table
}

// ── inspect ───────────────────────────────────────────────────────────────────

pub fn inspect(args: &InspectArgs) -> Result<()> {
    let mapping = ColumnMapping::resolve(args.config.as_deref())?;
    let preview = preview_source(&args.source, mapping.delimiter_byte()?, args.rows)?;

    println!(
        "{} ({} columns)\n{}",
        args.source.display(),
        preview.headers.len(),
        preview_table(&preview)
    );

    let missing = preview.missing_columns(&mapping);
    if missing.is_empty() {
        println!("All mapped columns are present.");
    }
    for (role, column) in missing {
        warn!("Column \"{}\" for {} is not in the header", column, role);
    }
    Ok(())
}

fn preview_table(preview: &SourcePreview) -> Table {
    let mut table = Table::new();
    table.set_header(preview.headers.clone());
    for row in &preview.rows {
        table.add_row(row.clone());
    }
    table
}

// ── top ───────────────────────────────────────────────────────────────────────

pub fn top(args: &TopArgs) -> Result<()> {
    let rank_path = args.input_dir.join(args.rank_by.output_file_name());
    let rank_table = ResultTable::load(&rank_path)
        .with_context(|| format!("cannot rank branches by {}", args.rank_by))?;

    let leaders = top_branches(&rank_table, args.top);
    if leaders.is_empty() {
        warn!("{} has no branches", rank_path.display());
        return Ok(());
    }
    println!(
        "Top {} branches by {}\n{}",
        leaders.len(),
        args.rank_by,
        ranking_table(&leaders)
    );

    for stat in resolve_statistics(&args.statistics) {
        let path = args.input_dir.join(stat.output_file_name());
        let table = match ResultTable::load(&path) {
            Ok(table) => table,
            Err(StatsError::SourceNotFound(_)) => {
                warn!("{} not found, skipping {}", path.display(), stat);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        println!(
            "{}\n{}",
            stat.title(),
            breakdown_table(stat, &table, &leaders, args.categories)
        );
    }
    Ok(())
}

fn ranking_table(leaders: &[Ranked]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Rank", "Branch", "Total"]);
    for (i, leader) in leaders.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&leader.label),
            Cell::new(format_count(leader.count)),
        ]);
    }
    table
}

fn breakdown_table(stat: Statistic, table: &ResultTable, leaders: &[Ranked], k: usize) -> Table {
    let mut out = Table::new();
    out.set_header(vec!["Branch".to_string(), format!("Leading {stat} categories")]);

    for leader in leaders {
        let total: u64 = table.row(&leader.label).map(|r| r.iter().sum()).unwrap_or(0);
        let summary = describe_categories(&top_categories(table, &leader.label, k), total);
        out.add_row(vec![leader.label.clone(), summary]);
    }
    out
}

/// `"20s 1,204 (41.5%), 30s 980 (33.8%)"`, or `"-"` when nothing was counted.
fn describe_categories(categories: &[Ranked], total: u64) -> String {
    if categories.is_empty() {
        return "-".to_string();
    }
    categories
        .iter()
        .map(|c| {
            format!(
                "{} {} ({:.1}%)",
                c.label,
                format_count(c.count),
                percentage(c.count, total, 1)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_table(dir: &std::path::Path, stat: Statistic, content: &str) {
        std::fs::write(dir.join(stat.output_file_name()), content).unwrap();
    }

    #[test]
    fn test_describe_categories() {
        let cats = vec![
            Ranked {
                label: "20s".to_string(),
                count: 3,
            },
            Ranked {
                label: "30s".to_string(),
                count: 1,
            },
        ];
        assert_eq!(describe_categories(&cats, 4), "20s 3 (75.0%), 30s 1 (25.0%)");
        assert_eq!(describe_categories(&[], 0), "-");
    }

    #[test]
    fn test_top_skips_missing_breakdown_tables() {
        let dir = TempDir::new().unwrap();
        write_table(dir.path(), Statistic::Age, ",20s,30s\nA,3,1\nB,1,0\n");

        let args = TopArgs {
            input_dir: dir.path().to_path_buf(),
            rank_by: Statistic::Age,
            top: 5,
            categories: 3,
            statistics: vec![Statistic::Age, Statistic::Gender],
        };
        top(&args).unwrap();
    }

    #[test]
    fn test_top_fails_without_ranking_table() {
        let dir = TempDir::new().unwrap();
        let args = TopArgs {
            input_dir: dir.path().to_path_buf(),
            rank_by: Statistic::Month,
            top: 5,
            categories: 3,
            statistics: vec![],
        };
        let err = top(&args).unwrap_err();
        assert!(err.to_string().contains("cannot rank branches by month"));
    }

    #[test]
    fn test_breakdown_table_lists_every_leader() {
        let table = ResultTable {
            columns: vec!["F".to_string(), "M".to_string()],
            branches: vec!["A".to_string(), "B".to_string()],
            cells: vec![vec![2, 2], vec![0, 5]],
        };
        let leaders = top_branches(&table, 2);
        let rendered = breakdown_table(Statistic::Gender, &table, &leaders, 2).to_string();

        assert!(rendered.contains("M 5 (100.0%)"));
        assert!(rendered.contains("F 2 (50.0%), M 2 (50.0%)"));
    }
}
