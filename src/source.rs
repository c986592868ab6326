// ABOUTME: Source reader - fetches candidate records from the record API
// ABOUTME: Follows offset pagination and applies the incremental modified-after filter

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::config::TableConfig;
use crate::credentials::Credentials;

/// Records requested per page. The source API caps pages at 100.
const PAGE_SIZE: usize = 100;

/// One raw record from the source, as returned by the record API.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    /// The source's native per-record identifier.
    pub id: String,
    /// Field name -> value. Fields the record has no value for are absent.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<SourceRecord>,
    /// Opaque cursor; present while more pages remain.
    offset: Option<String>,
}

/// Anything candidate records can be fetched from. The engine only ever
/// talks to the real record API; the seam exists so the orchestrator is
/// testable offline.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Fetch all candidate records for a table, following pagination until
    /// exhausted.
    ///
    /// When the table has a `last_modified_field` and `since` is set, only
    /// records modified strictly after `since` are requested; otherwise this
    /// is a full scan of the (optionally view-scoped) table. Any transport or
    /// decode error aborts the whole table.
    async fn fetch_records(
        &self,
        table: &TableConfig,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SourceRecord>>;
}

/// HTTP client for the source record API.
pub struct SourceClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    base_id: String,
}

impl SourceClient {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client for the source API")?;

        Ok(Self {
            http,
            api_url: credentials.source_api_url.trim_end_matches('/').to_string(),
            api_key: credentials.source_api_key.clone(),
            base_id: credentials.source_base_id.clone(),
        })
    }
}

impl RecordSource for SourceClient {
    async fn fetch_records(
        &self,
        table: &TableConfig,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SourceRecord>> {
        let url = format!("{}/{}/{}", self.api_url, self.base_id, table.source_table);

        let mut base_params: Vec<(String, String)> =
            vec![("pageSize".to_string(), PAGE_SIZE.to_string())];
        if let Some(view) = &table.view {
            base_params.push(("view".to_string(), view.clone()));
        }
        let mut incremental = false;
        if let (Some(field), Some(since)) = (&table.last_modified_field, since) {
            base_params.push((
                "filterByFormula".to_string(),
                modified_after_formula(field, since),
            ));
            incremental = true;
        }

        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut params = base_params.clone();
            if let Some(cursor) = &offset {
                params.push(("offset".to_string(), cursor.clone()));
            }

            let response = self
                .http
                .get(&url)
                .query(&params)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to fetch records from source table {}", table.source_table)
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!(
                    "Source fetch for table {} failed with status {}: {}",
                    table.source_table,
                    status,
                    body
                );
            }

            let page: RecordPage = response.json().await.with_context(|| {
                format!("Failed to parse record page from source table {}", table.source_table)
            })?;

            records.extend(page.records);

            match page.offset {
                Some(cursor) => offset = Some(cursor),
                None => break,
            }
        }

        tracing::debug!(
            "Fetched {} records from source table {} ({})",
            records.len(),
            table.source_table,
            if incremental { "incremental" } else { "full scan" }
        );

        Ok(records)
    }
}

/// Build the source-specific filter expression for "modified after X".
fn modified_after_formula(field: &str, since: DateTime<Utc>) -> String {
    format!(
        "IS_AFTER({{{}}}, '{}')",
        field,
        since.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
