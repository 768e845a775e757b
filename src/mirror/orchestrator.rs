// ABOUTME: Sequences one end-to-end mirror run and reports counts
// ABOUTME: Connect, bootstrap, introspect, snapshot, diff, apply, report

use super::{apply, bootstrap, diff, introspect, snapshot};
use crate::config::MirrorConfig;
use crate::mysql::{connect_source, connect_target};
use anyhow::{bail, Context, Result};
use mysql_async::Conn;
use serde::Serialize;

/// Summary of one mirror run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub table: String,
    pub source_rows: usize,
    pub target_rows: usize,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Whether this run bootstrapped the target table
    pub created_table: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
}

/// Runs the snapshot-diff-and-apply engine for one table.
///
/// The configuration is validated once at construction and never re-read;
/// nothing in the engine touches the process environment.
pub struct SyncOrchestrator {
    config: MirrorConfig,
}

impl SyncOrchestrator {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        Ok(Self { config })
    }

    /// Run one full mirror pass.
    pub async fn run(&self) -> Result<SyncReport> {
        let started_at = chrono::Utc::now();
        let start = std::time::Instant::now();
        let table = &self.config.table;

        tracing::info!("Starting mirror run for table {}", table);

        let mut source_conn = connect_source(&self.config).await?;
        let mut target_conn = connect_target(&self.config).await?;

        let created_table =
            bootstrap::ensure_target_table(&mut source_conn, &mut target_conn, table).await?;

        let (columns, pk_columns, pk_indices) =
            resolve_layout(&mut source_conn, &mut target_conn, table).await?;

        let source_snapshot =
            snapshot::load_source(&mut source_conn, table, &columns, &pk_indices).await?;
        let (target_snapshot, deleted_keys) =
            snapshot::load_target(&mut target_conn, table, &columns, &pk_indices).await?;

        let table_diff = diff::diff(&source_snapshot, &target_snapshot, &deleted_keys);
        tracing::info!(
            "Diff for {}: {} to insert, {} to update, {} to delete",
            table,
            table_diff.to_insert.len(),
            table_diff.to_update.len(),
            table_diff.to_delete.len()
        );

        let counts = apply::apply(
            &mut target_conn,
            table,
            &table_diff,
            &source_snapshot,
            &columns,
            &pk_columns,
            self.config.batch_size,
        )
        .await?;

        let report = SyncReport {
            table: table.clone(),
            source_rows: source_snapshot.len(),
            target_rows: target_snapshot.len(),
            inserted: counts.inserted,
            updated: counts.updated,
            deleted: counts.deleted,
            created_table,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        source_conn.disconnect().await.ok();
        target_conn.disconnect().await.ok();

        tracing::info!(
            "Mirror run completed for {}: {} inserted, {} updated, {} deleted in {}ms",
            report.table,
            report.inserted,
            report.updated,
            report.deleted,
            report.duration_ms
        );

        Ok(report)
    }

    /// Read-only readiness checks: both sides reachable, source table
    /// mirrorable, and any existing target table compatible.
    pub async fn preflight(&self) -> Result<()> {
        let table = &self.config.table;

        let mut source_conn = connect_source(&self.config).await?;
        let mut target_conn = connect_target(&self.config).await?;

        if !introspect::table_exists(&mut source_conn, table).await? {
            bail!("Source table {} does not exist", table);
        }
        let columns = introspect::columns(&mut source_conn, table).await?;
        let pk_columns = introspect::primary_key(&mut source_conn, table).await?;
        tracing::info!(
            "Source table {} has {} business columns, primary key ({})",
            table,
            columns.len(),
            pk_columns.join(", ")
        );

        if introspect::table_exists(&mut target_conn, table).await? {
            let target_all = introspect::all_columns(&mut target_conn, table).await?;
            for tracking in [
                introspect::OPERATION_TYPE_COLUMN,
                introspect::LAST_UPDATED_COLUMN,
            ] {
                if !target_all.iter().any(|c| c == tracking) {
                    bail!(
                        "Target table {} exists but is missing tracking column {}",
                        table,
                        tracking
                    );
                }
            }
            check_column_lists_match(&columns, &mut target_conn, table).await?;
            tracing::info!("Target table {} is compatible", table);
        } else {
            tracing::info!("Target table {} will be created on first sync", table);
        }

        source_conn.disconnect().await.ok();
        target_conn.disconnect().await.ok();
        Ok(())
    }
}

/// Resolve the shared row layout: business columns, primary-key columns, and
/// the key columns' positions within the column list.
///
/// Both snapshots are loaded with this one layout, so tuple equality in the
/// diff compares like with like.
async fn resolve_layout(
    source_conn: &mut Conn,
    target_conn: &mut Conn,
    table: &str,
) -> Result<(Vec<String>, Vec<String>, Vec<usize>)> {
    let columns = introspect::columns(source_conn, table).await?;
    let pk_columns = introspect::primary_key(source_conn, table).await?;

    check_column_lists_match(&columns, target_conn, table).await?;

    let pk_indices = pk_columns
        .iter()
        .map(|pk| {
            columns.iter().position(|c| c == pk).with_context(|| {
                format!("Primary key column {} is not in the column list of {}", pk, table)
            })
        })
        .collect::<Result<Vec<usize>>>()?;

    Ok((columns, pk_columns, pk_indices))
}

/// Verify the target's business columns match the source's in cardinality
/// and order; positional tuple comparison is meaningless otherwise.
async fn check_column_lists_match(
    source_columns: &[String],
    target_conn: &mut Conn,
    table: &str,
) -> Result<()> {
    let target_columns = introspect::columns(target_conn, table).await?;
    if source_columns != target_columns {
        bail!(
            "Column lists differ between source and target for {}: source has ({}), target has ({})",
            table,
            source_columns.join(", "),
            target_columns.join(", ")
        );
    }
    Ok(())
}
