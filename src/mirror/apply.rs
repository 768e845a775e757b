// ABOUTME: Applies a computed diff to the target table in one transaction
// ABOUTME: Batched inserts, prepared per-row updates, and row-at-a-time soft deletes

use super::diff::TableDiff;
use super::snapshot::TableSnapshot;
use crate::mysql::set_foreign_key_checks;
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use mysql_async::prelude::*;
use mysql_async::{Conn, TxOpts, Value};

/// Row counts from one apply phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyCounts {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// Build a multi-row insert statement for `row_count` rows.
///
/// `operation_type` is set inline to 'inserted'; `last_updated` is left to
/// the column default.
fn build_insert_statement(table: &str, columns: &[String], row_count: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let row_placeholders = format!(
        "({}, 'inserted')",
        columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
    );
    let values = vec![row_placeholders; row_count].join(", ");

    format!(
        "INSERT INTO {} ({}, {}) VALUES {}",
        quote_ident(table),
        column_list,
        quote_ident(super::introspect::OPERATION_TYPE_COLUMN),
        values
    )
}

/// Build the single-row update statement, setting every business column and
/// the tracking columns, keyed by the primary-key predicate.
fn build_update_statement(table: &str, columns: &[String], pk_columns: &[String]) -> String {
    let set_clause = columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let where_clause = pk_columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");

    format!(
        "UPDATE {} SET {}, {} = 'updated', {} = CURRENT_TIMESTAMP WHERE {}",
        quote_ident(table),
        set_clause,
        quote_ident(super::introspect::OPERATION_TYPE_COLUMN),
        quote_ident(super::introspect::LAST_UPDATED_COLUMN),
        where_clause
    )
}

/// Build the soft-delete statement: tracking columns only, business columns
/// untouched.
fn build_soft_delete_statement(table: &str, pk_columns: &[String]) -> String {
    let where_clause = pk_columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");

    format!(
        "UPDATE {} SET {} = 'deleted', {} = CURRENT_TIMESTAMP WHERE {}",
        quote_ident(table),
        quote_ident(super::introspect::OPERATION_TYPE_COLUMN),
        quote_ident(super::introspect::LAST_UPDATED_COLUMN),
        where_clause
    )
}

/// Apply a diff to the target table.
///
/// Foreign-key enforcement is off for the whole apply phase (mirrored rows
/// may reference rows that do not exist on the target) and restored before
/// the connection is handed back. All writes happen inside one transaction
/// committed at the end; on error nothing durable changes.
pub async fn apply(
    conn: &mut Conn,
    table: &str,
    diff: &TableDiff,
    source: &TableSnapshot,
    columns: &[String],
    pk_columns: &[String],
    batch_size: usize,
) -> Result<ApplyCounts> {
    if diff.is_empty() {
        tracing::info!("Target table {} is already in sync", table);
        return Ok(ApplyCounts::default());
    }

    set_foreign_key_checks(conn, false).await?;
    let applied = apply_in_transaction(conn, table, diff, source, columns, pk_columns, batch_size).await;
    // A failed transaction is dropped without commit; the connection rolls
    // it back on its next use, which this restore forces.
    let restored = set_foreign_key_checks(conn, true).await;

    let counts = match applied {
        Ok(counts) => counts,
        Err(e) => {
            if let Err(restore_err) = restored {
                tracing::warn!(
                    "Failed to restore FOREIGN_KEY_CHECKS after rollback: {:#}",
                    restore_err
                );
            }
            return Err(e);
        }
    };
    restored?;
    Ok(counts)
}

async fn apply_in_transaction(
    conn: &mut Conn,
    table: &str,
    diff: &TableDiff,
    source: &TableSnapshot,
    columns: &[String],
    pk_columns: &[String],
    batch_size: usize,
) -> Result<ApplyCounts> {
    let mut tx = conn
        .start_transaction(TxOpts::default())
        .await
        .context("Failed to start transaction on target")?;
    let mut counts = ApplyCounts::default();

    // Inserts: genuinely multi-row statements, batch_size rows at a time.
    for chunk in diff.to_insert.chunks(batch_size) {
        let statement = build_insert_statement(table, columns, chunk.len());
        let mut params: Vec<Value> = Vec::with_capacity(chunk.len() * columns.len());
        for key in chunk {
            let row = source
                .rows
                .get(key)
                .with_context(|| format!("Insert key {:?} missing from source snapshot", key))?;
            params.extend(row.iter().cloned());
        }
        tx.exec_drop(statement, params)
            .await
            .with_context(|| format!("Failed to insert batch into {}", table))?;
        counts.inserted += chunk.len() as u64;
        tracing::debug!("Inserted {}/{} rows", counts.inserted, diff.to_insert.len());
    }

    // Updates: one row per statement; the batch prepares the statement once
    // and amortizes round trips, it does not widen the statement.
    let update_statement = build_update_statement(table, columns, pk_columns);
    for chunk in diff.to_update.chunks(batch_size) {
        let mut batch_params: Vec<Vec<Value>> = Vec::with_capacity(chunk.len());
        for key in chunk {
            let row = source
                .rows
                .get(key)
                .with_context(|| format!("Update key {:?} missing from source snapshot", key))?;
            let mut params = row.clone();
            params.extend(key.to_values());
            batch_params.push(params);
        }
        tx.exec_batch(update_statement.as_str(), batch_params)
            .await
            .with_context(|| format!("Failed to update batch in {}", table))?;
        counts.updated += chunk.len() as u64;
        tracing::debug!("Updated {}/{} rows", counts.updated, diff.to_update.len());
    }

    // Soft deletes: row at a time, business columns untouched.
    let delete_statement = build_soft_delete_statement(table, pk_columns);
    for key in &diff.to_delete {
        tx.exec_drop(delete_statement.as_str(), key.to_values())
            .await
            .with_context(|| format!("Failed to soft-delete row from {}", table))?;
        counts.deleted += 1;
    }

    tx.commit()
        .await
        .context("Failed to commit mirror transaction")?;

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_insert_statement_single_row() {
        let statement = build_insert_statement("orders", &cols(&["id", "name"]), 1);
        assert_eq!(
            statement,
            "INSERT INTO `orders` (`id`, `name`, `operation_type`) VALUES (?, ?, 'inserted')"
        );
    }

    #[test]
    fn test_build_insert_statement_multiple_rows() {
        let statement = build_insert_statement("orders", &cols(&["id", "name"]), 3);
        assert!(statement.ends_with(
            "VALUES (?, ?, 'inserted'), (?, ?, 'inserted'), (?, ?, 'inserted')"
        ));
    }

    #[test]
    fn test_insert_statement_placeholder_count_matches_rows() {
        for rows in [1usize, 2, 7] {
            let statement = build_insert_statement("t", &cols(&["a", "b", "c"]), rows);
            assert_eq!(statement.matches('?').count(), rows * 3);
        }
    }

    #[test]
    fn test_build_update_statement() {
        let statement = build_update_statement("orders", &cols(&["id", "name"]), &cols(&["id"]));
        assert_eq!(
            statement,
            "UPDATE `orders` SET `id` = ?, `name` = ?, `operation_type` = 'updated', \
             `last_updated` = CURRENT_TIMESTAMP WHERE `id` = ?"
        );
    }

    #[test]
    fn test_build_update_statement_composite_pk() {
        let statement = build_update_statement(
            "regional",
            &cols(&["region", "id", "name"]),
            &cols(&["region", "id"]),
        );
        assert!(statement.ends_with("WHERE `region` = ? AND `id` = ?"));
    }

    #[test]
    fn test_build_soft_delete_statement_leaves_business_columns() {
        let statement = build_soft_delete_statement("orders", &cols(&["id"]));
        assert_eq!(
            statement,
            "UPDATE `orders` SET `operation_type` = 'deleted', \
             `last_updated` = CURRENT_TIMESTAMP WHERE `id` = ?"
        );
    }

    #[test]
    fn test_chunking_covers_every_key_for_any_batch_size() {
        // The per-run counts must not depend on the configured batch size.
        let keys: Vec<u32> = (0..23).collect();
        for batch_size in [1usize, 4, 23, 500] {
            let total: usize = keys.chunks(batch_size).map(|c| c.len()).sum();
            assert_eq!(total, keys.len());
        }
    }
}
