// ABOUTME: Sink client - keyed row lookup and inserts against the relational endpoint
// ABOUTME: Speaks the /rest/v1 table interface with service-key authentication

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::writer::RowSink;

/// A sink row as returned by the lookup endpoint: column name -> value.
pub type SinkRow = serde_json::Map<String, Value>;

/// Keys per lookup request. Keys travel in the query string, so lookups are
/// chunked to keep URLs bounded.
const LOOKUP_CHUNK_SIZE: usize = 200;

/// Anything existing rows can be looked up in by key. Counterpart of
/// [`RowSink`] for the read side of the sink.
#[allow(async_fn_in_trait)]
pub trait SinkLookup {
    /// Fetch all sink rows whose `key_column` value is in `keys`.
    ///
    /// The result is a flat list; callers index it themselves. Duplicate keys
    /// in the sink come back as duplicate rows, which the reconciler resolves
    /// last-write-wins.
    async fn fetch_rows_by_key(
        &self,
        table: &str,
        key_column: &str,
        keys: &[Value],
    ) -> Result<Vec<SinkRow>>;
}

/// HTTP client for the relational sink.
pub struct SinkClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SinkClient {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client for the sink")?;

        Ok(Self {
            http,
            base_url: credentials.sink_url.clone(),
            service_key: credentials.sink_service_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

impl SinkLookup for SinkClient {
    async fn fetch_rows_by_key(
        &self,
        table: &str,
        key_column: &str,
        keys: &[Value],
    ) -> Result<Vec<SinkRow>> {
        let mut rows = Vec::new();

        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            let list: Vec<String> = chunk.iter().map(in_list_literal).collect();
            let filter = format!("in.({})", list.join(","));

            let response = self
                .http
                .get(self.table_url(table))
                .query(&[("select", "*"), (key_column, filter.as_str())])
                .header("apikey", &self.service_key)
                .bearer_auth(&self.service_key)
                .send()
                .await
                .with_context(|| format!("Failed to look up rows in sink table {}", table))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!(
                    "Sink lookup on table {} failed with status {}: {}",
                    table,
                    status,
                    body
                );
            }

            let page: Vec<SinkRow> = response
                .json()
                .await
                .with_context(|| format!("Failed to parse lookup response from sink table {}", table))?;
            rows.extend(page);
        }

        Ok(rows)
    }
}

impl RowSink for SinkClient {
    /// Insert one batch of rows. Failure here is fatal to the run; already
    /// inserted batches stay committed.
    async fn insert_rows(&self, table: &str, rows: &[SinkRow]) -> Result<()> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .with_context(|| format!("Failed to insert rows into sink table {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Sink insert into table {} failed with status {}: {}",
                table,
                status,
                body
            );
        }

        Ok(())
    }
}

/// Render one key value as an `in.(...)` list literal.
///
/// Strings are double-quoted with embedded quotes escaped; other scalars use
/// their JSON form.
fn in_list_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}
