// ABOUTME: Library root for drift-sync - incremental record reconciliation engine
// ABOUTME: Exposes the per-component modules and the run orchestrator

pub mod canonical;
pub mod checkpoint;
pub mod config;
pub mod credentials;
pub mod reconciler;
pub mod run;
pub mod sink;
pub mod source;
pub mod writer;

pub use canonical::{canonical, canonically_equal};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{SyncConfig, TableConfig};
pub use credentials::Credentials;
pub use reconciler::{
    reconcile, DiffReport, FieldDifference, MissingPrimaryKeyError, NormalizedRow,
    ReconcileOutcome,
};
pub use run::{run, RunOptions, RunSummary, TableSummary};
pub use sink::{SinkClient, SinkLookup, SinkRow};
pub use source::{RecordSource, SourceClient, SourceRecord};
pub use writer::{insert_all, RowSink, DEFAULT_CHUNK_SIZE};
