// ABOUTME: Three-way set comparison between source and target snapshots
// ABOUTME: Classifies every primary key as insert, update, delete, or unchanged

use super::snapshot::{RowKey, TableSnapshot};
use std::collections::BTreeSet;

/// The classification of every primary key relative to the two snapshots.
///
/// The three sets are disjoint: a key appears in at most one of them.
#[derive(Debug, Default, Clone)]
pub struct TableDiff {
    /// Present in source, absent from target
    pub to_insert: Vec<RowKey>,
    /// Present in both with differing business tuples, or soft-deleted on
    /// the target and reappearing in the source
    pub to_update: Vec<RowKey>,
    /// Present in target (not yet soft-deleted), absent from source
    pub to_delete: Vec<RowKey>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Compare tuples element-wise with NULL-aware equality.
///
/// `Value`'s derived PartialEq treats NULL == NULL as true, which is what a
/// diff needs (unlike SQL's three-valued logic).
fn tuples_equal(a: &[mysql_async::Value], b: &[mysql_async::Value]) -> bool {
    a == b
}

/// Compute the diff between a source and a target snapshot.
///
/// `deleted_keys` holds the target keys currently marked soft-deleted: such
/// a key reappearing in the source is forced into `to_update` (resurrection),
/// and is never re-marked deleted when still absent. The result depends only
/// on snapshot contents; output vectors are in key order because both
/// snapshots iterate sorted.
pub fn diff(
    source: &TableSnapshot,
    target: &TableSnapshot,
    deleted_keys: &BTreeSet<RowKey>,
) -> TableDiff {
    let mut result = TableDiff::default();

    for (key, source_row) in &source.rows {
        match target.rows.get(key) {
            None => result.to_insert.push(key.clone()),
            Some(target_row) => {
                if deleted_keys.contains(key) || !tuples_equal(source_row, target_row) {
                    result.to_update.push(key.clone());
                }
            }
        }
    }

    for key in target.rows.keys() {
        if !source.rows.contains_key(key) && !deleted_keys.contains(key) {
            result.to_delete.push(key.clone());
        }
    }

    result
}
