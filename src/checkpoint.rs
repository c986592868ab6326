// ABOUTME: Durable per-table checkpoint store - tracks lastSyncedAt per sink table
// ABOUTME: Loads fail-soft, saves atomically via write-temp-then-rename

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Default checkpoint file path, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".drift-sync/checkpoints.json";

/// Checkpoint for a single sink table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Instant up to which this table's source records have been examined.
    pub last_synced_at: DateTime<Utc>,
}

/// In-memory checkpoint map for one run, keyed by sink table name.
///
/// The map is read once at run start, advanced in memory after each table's
/// pipeline completes, and written back once at the end of a non-dry-run
/// execution.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    tables: HashMap<String, Checkpoint>,
}

impl CheckpointStore {
    /// Load checkpoints from `path`.
    ///
    /// A missing or unreadable file yields an empty store: "never synced" is a
    /// valid initial state, and the cost of losing a checkpoint is only a full
    /// re-scan on the next run.
    pub async fn load(path: &Path) -> Self {
        let tables = match fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::warn!(
                        "Checkpoint file {:?} is not parseable ({}); starting from scratch",
                        path,
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::debug!("No checkpoint file at {:?} ({}); starting from scratch", path, e);
                HashMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            tables,
        }
    }

    /// Get the checkpoint for a sink table, if one exists.
    pub fn get(&self, sink_table: &str) -> Option<&Checkpoint> {
        self.tables.get(sink_table)
    }

    /// Advance a table's checkpoint to `instant`.
    ///
    /// Checkpoints only ever move forward; an `instant` behind the stored
    /// value (clock skew, replayed run) leaves the stored value in place.
    pub fn advance(&mut self, sink_table: &str, instant: DateTime<Utc>) {
        self.tables
            .entry(sink_table.to_string())
            .and_modify(|cp| {
                if instant > cp.last_synced_at {
                    cp.last_synced_at = instant;
                }
            })
            .or_insert(Checkpoint {
                last_synced_at: instant,
            });
    }

    /// Persist the full checkpoint map.
    ///
    /// Unlike `load`, an error here must abort the run: a lost checkpoint only
    /// costs a re-scan, but a torn partial write would corrupt every future
    /// run. The map is written to a sibling temp file, flushed, then renamed
    /// over the destination.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.tables)
            .context("Failed to serialize checkpoint state")?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .await
                .with_context(|| format!("Failed to create checkpoint temp file {:?}", tmp_path))?;
            file.write_all(contents.as_bytes())
                .await
                .with_context(|| format!("Failed to write checkpoint state to {:?}", tmp_path))?;
            file.sync_all()
                .await
                .with_context(|| format!("Failed to flush checkpoint state to {:?}", tmp_path))?;
        }
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to move checkpoint state into {:?}", self.path))?;

        Ok(())
    }

    #[cfg(test)]
    fn table_count(&self) -> usize {
        self.tables.len()
    }
}
