// ABOUTME: Reconciler - matches source records to sink rows by primary key
// ABOUTME: Pure partition into rows to insert vs field-level diff reports

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

use crate::canonical::canonical;
use crate::config::TableConfig;
use crate::sink::SinkRow;
use crate::source::SourceRecord;

/// A flat column -> value mapping ready for insertion into the sink.
pub type NormalizedRow = serde_json::Map<String, Value>;

/// One field whose canonical serializations differ between source and sink.
#[derive(Debug, Clone)]
pub struct FieldDifference {
    pub field: String,
    pub source_value: Value,
    pub sink_value: Value,
}

/// All differences found for one matched (source, sink) pair. Only emitted
/// when at least one field differs.
#[derive(Debug, Clone)]
pub struct DiffReport {
    pub primary_key: Value,
    /// Value of the configured last-modified field, when it is a string.
    pub last_modified: Option<String>,
    pub differences: Vec<FieldDifference>,
}

/// Output of one table's reconciliation.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub to_insert: Vec<NormalizedRow>,
    pub diffs: Vec<DiffReport>,
}

/// Raised when a record has no value for the configured primary-key field.
#[derive(Debug, thiserror::Error)]
#[error("source record {record_id} in table {table} has no value for primary key field {field}")]
pub struct MissingPrimaryKeyError {
    pub record_id: String,
    pub table: String,
    pub field: String,
}

/// Derive the primary-key value for a source record.
///
/// With `use_source_id_as_primary_key` the record's native id always wins,
/// even over a same-named field. Otherwise the value comes from the record's
/// fields, and an absent or null value rejects the record.
pub fn primary_key_value(
    table: &TableConfig,
    record: &SourceRecord,
) -> Result<Value, MissingPrimaryKeyError> {
    if table.use_source_id_as_primary_key {
        return Ok(Value::String(record.id.clone()));
    }

    match record.fields.get(&table.primary_key) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(MissingPrimaryKeyError {
            record_id: record.id.clone(),
            table: table.source_table.clone(),
            field: table.primary_key.clone(),
        }),
    }
}

/// Collect the distinct primary-key values of a record set, in first-seen
/// order. Used to scope the sink lookup.
pub fn collect_primary_keys(
    table: &TableConfig,
    records: &[SourceRecord],
) -> Result<Vec<Value>, MissingPrimaryKeyError> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for record in records {
        let key = primary_key_value(table, record)?;
        if seen.insert(canonical(&key)) {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Index sink rows by the canonical form of their key column value.
///
/// Last write wins on duplicates; detecting duplicate sink keys is not this
/// engine's job.
pub fn index_sink_rows(key_column: &str, rows: Vec<SinkRow>) -> HashMap<String, SinkRow> {
    let mut by_key = HashMap::with_capacity(rows.len());
    for row in rows {
        let key = row.get(key_column).cloned().unwrap_or(Value::Null);
        by_key.insert(canonical(&key), row);
    }
    by_key
}

/// Normalize one source record into a sink-shaped row.
fn normalize_row(table: &TableConfig, record: &SourceRecord, primary_key: &Value) -> NormalizedRow {
    let mut row = NormalizedRow::new();

    match &table.fields {
        Some(allow_list) => {
            for field in allow_list {
                let value = record.fields.get(field).cloned().unwrap_or(Value::Null);
                row.insert(field.clone(), value);
            }
        }
        None => {
            for (field, value) in &record.fields {
                row.insert(field.clone(), value.clone());
            }
        }
    }

    row.insert(table.primary_key.clone(), primary_key.clone());
    if let Some(source_id_field) = &table.source_id_field {
        row.insert(source_id_field.clone(), Value::String(record.id.clone()));
    }

    row
}

/// Partition source records into rows to insert and diff reports.
///
/// `sink_by_key` is the sink rows for this record set, indexed by the
/// canonical form of their primary-key value (see [`index_sink_rows`]).
/// Records with no matching sink row are normalized for insertion; matched
/// records are compared field by field under canonical serialization, where
/// "absent" and "explicitly null" are the same thing on both sides.
///
/// Pure: no I/O, no shared state.
pub fn reconcile(
    table: &TableConfig,
    records: &[SourceRecord],
    sink_by_key: &HashMap<String, SinkRow>,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();

    for record in records {
        let key = primary_key_value(table, record)?;
        let sink_row = match sink_by_key.get(&canonical(&key)) {
            Some(row) => row,
            None => {
                outcome.to_insert.push(normalize_row(table, record, &key));
                continue;
            }
        };

        let differences = compare_fields(table, record, sink_row);
        if !differences.is_empty() {
            outcome.diffs.push(DiffReport {
                primary_key: key,
                last_modified: last_modified_time(table, record),
                differences,
            });
        }
    }

    Ok(outcome)
}

fn compare_fields(
    table: &TableConfig,
    record: &SourceRecord,
    sink_row: &SinkRow,
) -> Vec<FieldDifference> {
    // With no allow-list, only fields present on the source record are
    // compared: sink-authored columns are never reported as drift.
    let field_names: Vec<&str> = match &table.fields {
        Some(allow_list) => allow_list.iter().map(String::as_str).collect(),
        None => record.fields.keys().map(String::as_str).collect(),
    };

    let mut differences = Vec::new();
    for field in field_names {
        let source_value = record.fields.get(field).cloned().unwrap_or(Value::Null);
        let sink_value = sink_row.get(field).cloned().unwrap_or(Value::Null);
        if canonical(&source_value) != canonical(&sink_value) {
            differences.push(FieldDifference {
                field: field.to_string(),
                source_value,
                sink_value,
            });
        }
    }
    differences
}

fn last_modified_time(table: &TableConfig, record: &SourceRecord) -> Option<String> {
    // Anything non-string (including a malformed source payload) normalizes
    // to None rather than failing the run.
    table
        .last_modified_field
        .as_ref()
        .and_then(|field| record.fields.get(field))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}
