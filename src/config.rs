// ABOUTME: Typed sync configuration - which tables to reconcile and how records map
// ABOUTME: Loaded once from a JSON file at startup, immutable for the run

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "sync-config.json";

/// Top-level sync configuration: an ordered list of tables to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Source base (collection) id. Falls back to the SOURCE_BASE_ID
    /// environment variable when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_base: Option<String>,
    /// Tables to reconcile, processed strictly in this order.
    pub tables: Vec<TableConfig>,
}

/// Mapping between one source table and one sink table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Source table name.
    pub source_table: String,
    /// Optional source view scoping which records are visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    /// Source field holding a last-modification timestamp. When set, runs
    /// after the first fetch only records modified since the checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_field: Option<String>,
    /// Sink table name.
    pub sink_table: String,
    /// Sink column used to match rows between the two systems.
    pub primary_key: String,
    /// Optional sink column that stores the source record's native id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id_field: Option<String>,
    /// When true, the primary key value is always the source record's native
    /// id, never a field value.
    #[serde(default)]
    pub use_source_id_as_primary_key: bool,
    /// Allow-list of field names to copy and compare. Absent means every
    /// field present on the source record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// Raised when the configuration contains no tables. Checked before any
/// network activity.
#[derive(Debug, thiserror::Error)]
#[error("sync configuration at {path} contains no table entries")]
pub struct EmptyConfigurationError {
    pub path: String,
}

impl SyncConfig {
    /// Load and validate the sync configuration from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read sync configuration from {:?}", path))?;
        let config: SyncConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sync configuration from {:?}", path))?;

        if config.tables.is_empty() {
            return Err(EmptyConfigurationError {
                path: path.display().to_string(),
            }
            .into());
        }

        Ok(config)
    }
}
