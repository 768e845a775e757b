// ABOUTME: Full-table snapshot loading keyed by primary key
// ABOUTME: Defines the composite row key type and the in-memory snapshot map

use super::introspect;
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use mysql_async::prelude::*;
use mysql_async::{Conn, Row, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One primary-key component, normalized from `mysql_async::Value` so that
/// keys can be hashed and ordered.
///
/// Floats are stored by bit pattern: key equality must be exact and stable,
/// which IEEE comparison semantics are not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Null,
    Int(i64),
    UInt(u64),
    Bytes(Vec<u8>),
    Float(u32),
    Double(u64),
    Date(u16, u8, u8, u8, u8, u8, u32),
    Time(bool, u32, u8, u8, u8, u32),
}

impl From<&Value> for KeyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::NULL => KeyValue::Null,
            Value::Int(i) => KeyValue::Int(*i),
            Value::UInt(u) => KeyValue::UInt(*u),
            Value::Bytes(b) => KeyValue::Bytes(b.clone()),
            Value::Float(f) => KeyValue::Float(f.to_bits()),
            Value::Double(d) => KeyValue::Double(d.to_bits()),
            Value::Date(y, m, d, h, mi, s, us) => KeyValue::Date(*y, *m, *d, *h, *mi, *s, *us),
            Value::Time(neg, d, h, m, s, us) => KeyValue::Time(*neg, *d, *h, *m, *s, *us),
        }
    }
}

impl KeyValue {
    /// Convert back to a driver value, for use as a statement parameter.
    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Null => Value::NULL,
            KeyValue::Int(i) => Value::Int(*i),
            KeyValue::UInt(u) => Value::UInt(*u),
            KeyValue::Bytes(b) => Value::Bytes(b.clone()),
            KeyValue::Float(bits) => Value::Float(f32::from_bits(*bits)),
            KeyValue::Double(bits) => Value::Double(f64::from_bits(*bits)),
            KeyValue::Date(y, m, d, h, mi, s, us) => Value::Date(*y, *m, *d, *h, *mi, *s, *us),
            KeyValue::Time(neg, d, h, m, s, us) => Value::Time(*neg, *d, *h, *m, *s, *us),
        }
    }
}

/// Composite primary key value.
///
/// Always an ordered sequence of components, whether the table's key has one
/// column or several; equality, ordering, and hashing are uniform across
/// cardinalities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(pub Vec<KeyValue>);

impl RowKey {
    /// Compose a key from a row tuple and the key columns' positions in it.
    pub fn from_row(values: &[Value], pk_indices: &[usize]) -> Self {
        RowKey(pk_indices.iter().map(|&i| (&values[i]).into()).collect())
    }

    /// The key components as statement parameters.
    pub fn to_values(&self) -> Vec<Value> {
        self.0.iter().map(KeyValue::to_value).collect()
    }
}

/// In-memory capture of a table's rows at one point in time.
///
/// Maps each primary key to the row's business-column tuple in column-list
/// order. A BTreeMap keeps iteration key-ordered, so diffs and logs are
/// reproducible across runs.
#[derive(Debug, Default)]
pub struct TableSnapshot {
    pub rows: BTreeMap<RowKey, Vec<Value>>,
}

impl TableSnapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn select_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn snapshot_from_rows(rows: Vec<Row>, pk_indices: &[usize]) -> TableSnapshot {
    let mut snapshot = TableSnapshot::default();
    for row in rows {
        let values = row.unwrap();
        let key = RowKey::from_row(&values, pk_indices);
        snapshot.rows.insert(key, values);
    }
    snapshot
}

/// Load the source table into a snapshot.
///
/// One unfiltered scan; the entire table is materialized in memory, which
/// bounds the engine to tables whose row set fits comfortably in RAM.
pub async fn load_source(
    conn: &mut Conn,
    table: &str,
    columns: &[String],
    pk_indices: &[usize],
) -> Result<TableSnapshot> {
    let query = format!(
        "SELECT {} FROM {}",
        select_list(columns),
        quote_ident(table)
    );
    let rows: Vec<Row> = conn
        .query(query)
        .await
        .with_context(|| format!("Failed to scan source table {}", table))?;

    let snapshot = snapshot_from_rows(rows, pk_indices);
    tracing::info!("Loaded {} rows from source table {}", snapshot.len(), table);
    Ok(snapshot)
}

/// Load the target table into a snapshot, plus the set of keys currently
/// soft-deleted.
///
/// Soft-deleted rows stay in the snapshot so that a key reappearing in the
/// source is matched against its still-present target row (and resurrected
/// via UPDATE rather than a primary-key-violating INSERT); the deleted set
/// lets the diff skip re-marking rows that are already deleted.
pub async fn load_target(
    conn: &mut Conn,
    table: &str,
    columns: &[String],
    pk_indices: &[usize],
) -> Result<(TableSnapshot, BTreeSet<RowKey>)> {
    let query = format!(
        "SELECT {}, {} FROM {}",
        select_list(columns),
        quote_ident(introspect::OPERATION_TYPE_COLUMN),
        quote_ident(table)
    );
    let rows: Vec<Row> = conn
        .query(query)
        .await
        .with_context(|| format!("Failed to scan target table {}", table))?;

    let mut snapshot = TableSnapshot::default();
    let mut deleted = BTreeSet::new();
    for row in rows {
        let mut values = row.unwrap();
        // operation_type is selected last, after the business columns
        let operation = values.pop().unwrap_or(Value::NULL);
        let key = RowKey::from_row(&values, pk_indices);
        if matches!(&operation, Value::Bytes(b) if b.as_slice() == b"deleted") {
            deleted.insert(key.clone());
        }
        snapshot.rows.insert(key, values);
    }

    tracing::info!(
        "Loaded {} rows from target table {} ({} marked deleted)",
        snapshot.len(),
        table,
        deleted.len()
    );
    Ok((snapshot, deleted))
}
