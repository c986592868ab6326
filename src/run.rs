// ABOUTME: Run orchestrator - sequences fetch, reconcile, write, checkpoint per table
// ABOUTME: Aggregates the run summary and persists checkpoints once at the end

use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;

use crate::checkpoint::CheckpointStore;
use crate::config::{SyncConfig, TableConfig};
use crate::reconciler::{collect_primary_keys, index_sink_rows, reconcile, DiffReport};
use crate::sink::SinkLookup;
use crate::source::RecordSource;
use crate::writer::{insert_all, RowSink};

/// Options for one run, owned by the top-level caller.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Compute and report everything, perform no durable writes.
    pub dry_run: bool,
    /// Maximum rows per sink insert call.
    pub chunk_size: usize,
    /// Path of the checkpoint state file.
    pub state_path: PathBuf,
}

/// Per-table counts for the final report.
#[derive(Debug, Clone)]
pub struct TableSummary {
    pub sink_table: String,
    pub inserted: usize,
    pub diffs: usize,
}

/// Aggregated counts across the whole configuration.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tables: Vec<TableSummary>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_diffs(&self) -> usize {
        self.tables.iter().map(|t| t.diffs).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Sync summary (dry run, nothing written):")?;
        } else {
            writeln!(f, "Sync summary:")?;
        }
        for table in &self.tables {
            writeln!(
                f,
                "  {}: {} inserted, {} with differences",
                table.sink_table, table.inserted, table.diffs
            )?;
        }
        write!(
            f,
            "Totals: {} inserted, {} with differences across {} tables",
            self.total_inserted(),
            self.total_diffs(),
            self.tables.len()
        )
    }
}

/// Run the full reconciliation for every configured table, strictly in
/// configuration order.
///
/// Any component error aborts the run: remaining tables are not processed and
/// the error propagates to the caller. The checkpoint map is persisted exactly
/// once, after the last table, and never in dry-run mode.
pub async fn run<Src, Snk>(
    config: &SyncConfig,
    source: &Src,
    sink: &Snk,
    options: &RunOptions,
) -> Result<RunSummary>
where
    Src: RecordSource,
    Snk: SinkLookup + RowSink,
{
    let mut checkpoints = CheckpointStore::load(&options.state_path).await;
    let mut summary = RunSummary {
        tables: Vec::with_capacity(config.tables.len()),
        dry_run: options.dry_run,
    };

    for table in &config.tables {
        let table_summary = sync_table(table, source, sink, &mut checkpoints, options)
            .await
            .with_context(|| format!("Failed to sync table {}", table.sink_table))?;
        summary.tables.push(table_summary);
    }

    if options.dry_run {
        tracing::info!("Dry run: leaving checkpoint file untouched");
    } else {
        checkpoints
            .save()
            .await
            .context("Failed to persist checkpoints")?;
    }

    Ok(summary)
}

async fn sync_table<Src, Snk>(
    table: &TableConfig,
    source: &Src,
    sink: &Snk,
    checkpoints: &mut CheckpointStore,
    options: &RunOptions,
) -> Result<TableSummary>
where
    Src: RecordSource,
    Snk: SinkLookup + RowSink,
{
    let since = checkpoints.get(&table.sink_table).map(|cp| cp.last_synced_at);
    match (since, &table.last_modified_field) {
        (Some(since), Some(field)) => tracing::info!(
            "Syncing {} -> {} incrementally ({} after {})",
            table.source_table,
            table.sink_table,
            field,
            since
        ),
        _ => tracing::info!(
            "Syncing {} -> {} with a full scan",
            table.source_table,
            table.sink_table
        ),
    }

    let records = source.fetch_records(table, since).await?;
    tracing::info!(
        "{}: {} candidate records from source",
        table.sink_table,
        records.len()
    );

    let keys = collect_primary_keys(table, &records)?;
    let sink_rows = if keys.is_empty() {
        Vec::new()
    } else {
        sink.fetch_rows_by_key(&table.sink_table, &table.primary_key, &keys)
            .await?
    };
    let sink_by_key = index_sink_rows(&table.primary_key, sink_rows);

    let outcome = reconcile(table, &records, &sink_by_key)?;
    for report in &outcome.diffs {
        log_diff_report(&table.sink_table, report);
    }

    let inserted = insert_all(
        sink,
        &table.sink_table,
        &outcome.to_insert,
        options.chunk_size,
        options.dry_run,
    )
    .await?;

    // The checkpoint advances even on an empty fetch, so the incremental
    // window keeps narrowing on quiet tables.
    checkpoints.advance(&table.sink_table, Utc::now());

    tracing::info!(
        "{}: {} inserted, {} rows with differences",
        table.sink_table,
        inserted,
        outcome.diffs.len()
    );

    Ok(TableSummary {
        sink_table: table.sink_table.clone(),
        inserted,
        diffs: outcome.diffs.len(),
    })
}

fn log_diff_report(sink_table: &str, report: &DiffReport) {
    tracing::info!(
        "Drift in {} for key {} ({} field{}, last modified {})",
        sink_table,
        report.primary_key,
        report.differences.len(),
        if report.differences.len() == 1 { "" } else { "s" },
        report.last_modified.as_deref().unwrap_or("unknown")
    );
    for diff in &report.differences {
        tracing::info!(
            "  {}: source={} sink={}",
            diff.field,
            diff.source_value,
            diff.sink_value
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_totals() {
        let summary = RunSummary {
            tables: vec![
                TableSummary {
                    sink_table: "contacts".to_string(),
                    inserted: 2,
                    diffs: 1,
                },
                TableSummary {
                    sink_table: "cases".to_string(),
                    inserted: 0,
                    diffs: 3,
                },
            ],
            dry_run: false,
        };
        assert_eq!(summary.total_inserted(), 2);
        assert_eq!(summary.total_diffs(), 4);
    }

    #[test]
    fn test_run_summary_display() {
        let summary = RunSummary {
            tables: vec![TableSummary {
                sink_table: "contacts".to_string(),
                inserted: 2,
                diffs: 1,
            }],
            dry_run: true,
        };
        let rendered = summary.to_string();
        assert!(rendered.contains("dry run"));
        assert!(rendered.contains("contacts: 2 inserted, 1 with differences"));
        assert!(rendered.contains("Totals: 2 inserted, 1 with differences across 1 tables"));
    }
}
