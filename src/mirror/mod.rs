// ABOUTME: Snapshot-diff-and-apply mirror engine
// ABOUTME: Bootstraps the target schema, diffs full-table snapshots, applies tracked writes

pub mod apply;
pub mod bootstrap;
pub mod diff;
pub mod introspect;
pub mod orchestrator;
pub mod snapshot;

pub use apply::ApplyCounts;
pub use bootstrap::{ensure_target_table, mirror_table_ddl};
pub use diff::TableDiff;
pub use orchestrator::{SyncOrchestrator, SyncReport};
pub use snapshot::{KeyValue, RowKey, TableSnapshot};
