// ABOUTME: Batch writer - chunked, dry-run-aware inserts into the sink
// ABOUTME: Fail-fast on chunk errors; earlier chunks stay committed

use anyhow::Result;

use crate::sink::SinkRow;

/// Default rows per insert call.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Anything rows can be inserted into. The engine only ever talks to the
/// real sink; the seam exists so chunking behavior is testable offline.
#[allow(async_fn_in_trait)]
pub trait RowSink {
    async fn insert_rows(&self, table: &str, rows: &[SinkRow]) -> Result<()>;
}

/// Insert `rows` into `table` in contiguous chunks of at most `chunk_size`.
///
/// In dry-run mode no sink call is made at all; the rows are still accounted
/// in the returned count as if inserted. A chunk failure propagates
/// immediately - no retry, no skip - and chunks already inserted within the
/// same table are not rolled back.
pub async fn insert_all<S: RowSink>(
    sink: &S,
    table: &str,
    rows: &[SinkRow],
    chunk_size: usize,
    dry_run: bool,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let chunk_size = chunk_size.max(1);
    let chunk_count = rows.len().div_ceil(chunk_size);

    for (i, chunk) in rows.chunks(chunk_size).enumerate() {
        if dry_run {
            tracing::info!(
                "[dry-run] Would insert {} rows into {} (chunk {}/{})",
                chunk.len(),
                table,
                i + 1,
                chunk_count
            );
        } else {
            sink.insert_rows(table, chunk).await?;
            tracing::debug!(
                "Inserted {} rows into {} (chunk {}/{})",
                chunk.len(),
                table,
                i + 1,
                chunk_count
            );
        }
    }

    Ok(rows.len())
}
