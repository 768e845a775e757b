// ABOUTME: Schema introspection against a live MySQL connection
// ABOUTME: Resolves column order, primary key columns, and the source table DDL

use crate::utils::quote_ident;
use anyhow::{bail, Context, Result};
use mysql_async::prelude::*;
use mysql_async::Conn;

/// Columns owned by the mirror engine, never part of the business tuple.
pub const OPERATION_TYPE_COLUMN: &str = "operation_type";
pub const LAST_UPDATED_COLUMN: &str = "last_updated";

/// Whether a column is one of the engine's tracking columns.
pub fn is_tracking_column(name: &str) -> bool {
    name == OPERATION_TYPE_COLUMN || name == LAST_UPDATED_COLUMN
}

/// Check whether a table exists in the connection's current database.
pub async fn table_exists(conn: &mut Conn, table: &str) -> Result<bool> {
    let count: Option<u64> = conn
        .exec_first(
            "SELECT COUNT(*)
             FROM information_schema.TABLES
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            (table,),
        )
        .await
        .with_context(|| format!("Failed to check existence of table {}", table))?;

    Ok(count.unwrap_or(0) > 0)
}

/// All column names of a table in declaration order, tracking columns included.
pub async fn all_columns(conn: &mut Conn, table: &str) -> Result<Vec<String>> {
    let names: Vec<String> = conn
        .exec(
            "SELECT COLUMN_NAME
             FROM information_schema.COLUMNS
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
             ORDER BY ORDINAL_POSITION",
            (table,),
        )
        .await
        .with_context(|| format!("Failed to read columns for table {}", table))?;

    if names.is_empty() {
        bail!("Table {} does not exist", table);
    }

    Ok(names)
}

/// Business column names of a table in declaration order.
///
/// Tracking columns are excluded so the result describes the row tuple
/// layout used for snapshots and diffing.
pub async fn columns(conn: &mut Conn, table: &str) -> Result<Vec<String>> {
    let names = all_columns(conn, table).await?;
    Ok(names
        .into_iter()
        .filter(|name| !is_tracking_column(name))
        .collect())
}

/// Primary key column names in ordinal position order.
///
/// Errors if the table has no PRIMARY constraint: without a unique key the
/// engine cannot correlate rows between source and target.
pub async fn primary_key(conn: &mut Conn, table: &str) -> Result<Vec<String>> {
    let names: Vec<String> = conn
        .exec(
            "SELECT COLUMN_NAME
             FROM information_schema.KEY_COLUMN_USAGE
             WHERE TABLE_SCHEMA = DATABASE()
               AND TABLE_NAME = ?
               AND CONSTRAINT_NAME = 'PRIMARY'
             ORDER BY ORDINAL_POSITION",
            (table,),
        )
        .await
        .with_context(|| format!("Failed to read primary key for table {}", table))?;

    if names.is_empty() {
        bail!(
            "Table {} has no primary key; refusing to mirror a table that cannot be uniquely keyed",
            table
        );
    }

    Ok(names)
}

/// The table's verbatim creation statement via SHOW CREATE TABLE.
pub async fn create_ddl(conn: &mut Conn, table: &str) -> Result<String> {
    let row: Option<(String, String)> = conn
        .query_first(format!("SHOW CREATE TABLE {}", quote_ident(table)))
        .await
        .with_context(|| format!("Failed to fetch CREATE TABLE for {}", table))?;

    match row {
        Some((_, ddl)) => Ok(ddl),
        None => bail!("SHOW CREATE TABLE returned no definition for {}", table),
    }
}
