// ABOUTME: End-to-end reconciliation scenarios at the library level
// ABOUTME: Covers partitioning, idempotence, and chunked writing together

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use drift_sync::reconciler::{collect_primary_keys, index_sink_rows, reconcile};
use drift_sync::sink::SinkRow;
use drift_sync::writer::{insert_all, RowSink};
use drift_sync::TableConfig;

fn contacts_table() -> TableConfig {
    TableConfig {
        source_table: "Contacts".to_string(),
        view: None,
        last_modified_field: None,
        sink_table: "contacts".to_string(),
        primary_key: "email".to_string(),
        source_id_field: None,
        use_source_id_as_primary_key: false,
        fields: Some(vec!["email".to_string(), "phone".to_string()]),
    }
}

fn record(id: &str, fields: Value) -> drift_sync::SourceRecord {
    drift_sync::SourceRecord {
        id: id.to_string(),
        fields: fields.as_object().cloned().unwrap(),
    }
}

fn row(fields: Value) -> SinkRow {
    fields.as_object().cloned().unwrap()
}

struct CountingSink {
    calls: Mutex<Vec<usize>>,
}

impl RowSink for CountingSink {
    async fn insert_rows(&self, _table: &str, rows: &[SinkRow]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(rows.len());
        Ok(())
    }
}

#[test]
fn three_record_scenario_partitions_inserts_and_drift() {
    let table = contacts_table();
    let records = vec![
        record("r1", json!({"email": "a@x.com", "phone": "222"})),
        record("r2", json!({"email": "b@x.com", "phone": "333"})),
        record("r3", json!({"email": "c@x.com", "phone": "444"})),
    ];
    let sink_rows = vec![row(json!({"email": "a@x.com", "phone": "111"}))];

    let keys = collect_primary_keys(&table, &records).unwrap();
    assert_eq!(keys, vec![json!("a@x.com"), json!("b@x.com"), json!("c@x.com")]);

    let index = index_sink_rows(&table.primary_key, sink_rows);
    let outcome = reconcile(&table, &records, &index).unwrap();

    let inserted_emails: Vec<&Value> = outcome
        .to_insert
        .iter()
        .map(|r| r.get("email").unwrap())
        .collect();
    assert_eq!(inserted_emails, vec![&json!("b@x.com"), &json!("c@x.com")]);

    assert_eq!(outcome.diffs.len(), 1);
    let report = &outcome.diffs[0];
    assert_eq!(report.primary_key, json!("a@x.com"));
    assert_eq!(report.differences.len(), 1);
    assert_eq!(report.differences[0].field, "phone");
    assert_eq!(report.differences[0].source_value, json!("222"));
    assert_eq!(report.differences[0].sink_value, json!("111"));
}

#[tokio::test]
async fn scenario_with_chunk_size_one_makes_two_insert_calls() {
    let table = contacts_table();
    let records = vec![
        record("r1", json!({"email": "a@x.com", "phone": "222"})),
        record("r2", json!({"email": "b@x.com", "phone": "333"})),
        record("r3", json!({"email": "c@x.com", "phone": "444"})),
    ];
    let index = index_sink_rows(
        &table.primary_key,
        vec![row(json!({"email": "a@x.com", "phone": "111"}))],
    );
    let outcome = reconcile(&table, &records, &index).unwrap();

    let sink = CountingSink {
        calls: Mutex::new(Vec::new()),
    };
    let inserted = insert_all(&sink, &table.sink_table, &outcome.to_insert, 1, false)
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(*sink.calls.lock().unwrap(), vec![1, 1]);
}

#[test]
fn second_pass_after_apply_is_idempotent() {
    let table = contacts_table();
    let records = vec![
        record("r1", json!({"email": "a@x.com", "phone": "222"})),
        record("r2", json!({"email": "b@x.com", "phone": "333"})),
        record("r3", json!({"email": "c@x.com", "phone": "444"})),
    ];

    // First pass against a sink holding only the drifted row
    let mut sink_rows = vec![row(json!({"email": "a@x.com", "phone": "111"}))];
    let index = index_sink_rows(&table.primary_key, sink_rows.clone());
    let first = reconcile(&table, &records, &index).unwrap();
    assert_eq!(first.to_insert.len(), 2);
    assert_eq!(first.diffs.len(), 1);

    // Apply the run: inserts land in the sink, the drifted row is corrected
    // out of band (drift reports are advisory, the engine never updates)
    sink_rows[0] = row(json!({"email": "a@x.com", "phone": "222"}));
    sink_rows.extend(first.to_insert.clone());

    let index = index_sink_rows(&table.primary_key, sink_rows);
    let second = reconcile(&table, &records, &index).unwrap();
    assert!(second.to_insert.is_empty(), "second pass must insert nothing");
    assert!(second.diffs.is_empty(), "second pass must report no drift");
}

#[test]
fn empty_source_produces_empty_outcome() {
    let table = contacts_table();
    let outcome = reconcile(&table, &[], &HashMap::new()).unwrap();
    assert!(outcome.to_insert.is_empty());
    assert!(outcome.diffs.is_empty());
}

#[test]
fn source_id_primary_key_round_trip() {
    let mut table = contacts_table();
    table.primary_key = "record_id".to_string();
    table.use_source_id_as_primary_key = true;
    table.fields = Some(vec!["email".to_string()]);

    let records = vec![record("recA", json!({"email": "a@x.com"}))];

    // Not yet in the sink: normalized row carries the native id as the key
    let outcome = reconcile(&table, &records, &HashMap::new()).unwrap();
    assert_eq!(outcome.to_insert[0].get("record_id"), Some(&json!("recA")));

    // Once in the sink under that key, the same record matches cleanly
    let index = index_sink_rows(&table.primary_key, outcome.to_insert.clone());
    let second = reconcile(&table, &records, &index).unwrap();
    assert!(second.to_insert.is_empty());
    assert!(second.diffs.is_empty());
}
