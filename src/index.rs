//! Secondary index: one ordered map per indexed column, from column value
//! to the set of base RIDs carrying that value. The key column is indexed
//! automatically; other columns opt in through `create_index`. The index is
//! shared across transactions and synchronized with a map-wide mutex.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound::Included;
use std::sync::Mutex;

use crate::errors::DatabaseError;
use crate::records::Rid;

pub struct Index {
    inner: Mutex<IndexInner>,
}

struct IndexInner {
    key_index: usize,

    /// If `enabled[i]` is false, the index for column `i` is absent and
    /// lookups on it fall back to a full table scan.
    enabled: Vec<bool>,

    b_trees: Vec<BTreeMap<i64, HashSet<Rid>>>,
}

impl Index {
    /// A new index with only the key column enabled.
    pub fn new(num_columns: usize, key_index: usize) -> Self {
        let mut enabled = vec![false; num_columns];
        enabled[key_index] = true;

        Index {
            inner: Mutex::new(IndexInner {
                key_index,
                enabled,
                b_trees: vec![BTreeMap::new(); num_columns],
            }),
        }
    }

    /// Enable indexing for a column. Existing records are backfilled by the
    /// table through `add_entry`.
    pub fn create_index(&self, column: usize) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if column >= inner.enabled.len() {
            return Err(DatabaseError::UnknownColumn(column));
        }
        inner.enabled[column] = true;
        Ok(())
    }

    /// Drop the index on a non-key column. The key column index is the
    /// source of truth for key uniqueness and cannot be dropped.
    pub fn drop_index(&self, column: usize) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if column >= inner.enabled.len() || column == inner.key_index {
            return Err(DatabaseError::UnknownColumn(column));
        }
        inner.enabled[column] = false;
        inner.b_trees[column].clear();
        Ok(())
    }

    /// Add a single `(value, rid)` pair to one column's tree. Used when
    /// backfilling a freshly created index.
    pub fn add_entry(&self, value: i64, column: usize, rid: Rid) {
        let mut inner = self.inner.lock().unwrap();
        if inner.enabled[column] {
            inner.b_trees[column].entry(value).or_default().insert(rid);
        }
    }

    /// Register a newly inserted record under every enabled column.
    pub fn insert(&self, columns: &[i64], rid: Rid) {
        let mut inner = self.inner.lock().unwrap();
        for (column, value) in columns.iter().enumerate() {
            if inner.enabled[column] {
                inner.b_trees[column].entry(*value).or_default().insert(rid);
            }
        }
    }

    /// Move `rid` between buckets for every indexed column whose value
    /// actually changes.
    pub fn update(&self, old_columns: &[i64], new_columns: &[Option<i64>], rid: Rid) {
        let mut inner = self.inner.lock().unwrap();
        for (column, update) in new_columns.iter().enumerate() {
            let new_value = match *update {
                Some(value) if value != old_columns[column] => value,
                _ => continue,
            };
            if !inner.enabled[column] {
                continue;
            }

            let old_value = old_columns[column];
            if let Some(bucket) = inner.b_trees[column].get_mut(&old_value) {
                bucket.remove(&rid);
                if bucket.is_empty() {
                    inner.b_trees[column].remove(&old_value);
                }
            }
            inner
                .b_trees[column]
                .entry(new_value)
                .or_default()
                .insert(rid);
        }
    }

    /// Remove a deleted record from every enabled column.
    pub fn delete(&self, columns: &[i64], rid: Rid) {
        let mut inner = self.inner.lock().unwrap();
        for (column, value) in columns.iter().enumerate() {
            if !inner.enabled[column] {
                continue;
            }
            if let Some(bucket) = inner.b_trees[column].get_mut(value) {
                bucket.remove(&rid);
                if bucket.is_empty() {
                    inner.b_trees[column].remove(value);
                }
            }
        }
    }

    /// RIDs whose `column` equals `value` exactly.
    pub fn locate(&self, value: i64, column: usize) -> Result<HashSet<Rid>, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        if column >= inner.enabled.len() || !inner.enabled[column] {
            return Err(DatabaseError::NoIndex(column));
        }
        Ok(inner.b_trees[column].get(&value).cloned().unwrap_or_default())
    }

    /// RIDs whose `column` falls in the inclusive range `[start, end]`. An
    /// empty or inverted range yields the empty set.
    pub fn locate_range(
        &self,
        start: i64,
        end: i64,
        column: usize,
    ) -> Result<HashSet<Rid>, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        if column >= inner.enabled.len() || !inner.enabled[column] {
            return Err(DatabaseError::NoIndex(column));
        }
        if start > end {
            return Ok(HashSet::new());
        }

        let mut rids = HashSet::new();
        for (_, bucket) in inner.b_trees[column].range((Included(&start), Included(&end))) {
            rids.extend(bucket.iter().copied());
        }
        Ok(rids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_finds_inserted_rids() {
        let index = Index::new(3, 0);
        index.insert(&[10, 20, 30], Rid::new(1));
        index.insert(&[11, 20, 31], Rid::new(2));

        assert_eq!(index.locate(10, 0).unwrap(), HashSet::from([Rid::new(1)]));
        assert!(index.locate(99, 0).unwrap().is_empty());
        // Column 1 was never indexed.
        assert!(matches!(
            index.locate(20, 1),
            Err(DatabaseError::NoIndex(1))
        ));
    }

    #[test]
    fn locate_range_is_inclusive_and_guards_inversion() {
        let index = Index::new(1, 0);
        for key in 1..=10 {
            index.insert(&[key], Rid::new(key as u64));
        }

        let rids = index.locate_range(3, 5, 0).unwrap();
        assert_eq!(rids.len(), 3);
        assert!(rids.contains(&Rid::new(3)) && rids.contains(&Rid::new(5)));

        assert!(index.locate_range(7, 2, 0).unwrap().is_empty());
    }

    #[test]
    fn update_moves_rid_between_buckets() {
        let index = Index::new(2, 0);
        index.insert(&[1, 2], Rid::new(1));
        index.update(&[1, 2], &[Some(5), None], Rid::new(1));

        assert!(index.locate(1, 0).unwrap().is_empty());
        assert_eq!(index.locate(5, 0).unwrap(), HashSet::from([Rid::new(1)]));
    }

    #[test]
    fn delete_removes_every_entry() {
        let index = Index::new(2, 0);
        index.create_index(1).unwrap();
        index.insert(&[1, 2], Rid::new(1));
        index.delete(&[1, 2], Rid::new(1));

        assert!(index.locate(1, 0).unwrap().is_empty());
        assert!(index.locate(2, 1).unwrap().is_empty());
    }

    #[test]
    fn dropped_index_reports_no_index() {
        let index = Index::new(2, 0);
        index.create_index(1).unwrap();
        index.insert(&[1, 2], Rid::new(1));

        index.drop_index(1).unwrap();
        assert!(matches!(index.locate(2, 1), Err(DatabaseError::NoIndex(1))));
        // The key column cannot be dropped.
        assert!(index.drop_index(0).is_err());
    }
}
