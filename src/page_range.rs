//! A page range owns a fixed number of base pages and an unbounded list of
//! tail pages, and implements the versioned read and the update chain that
//! threads new versions through the tail pages.

use std::collections::HashMap;
use std::path::Path;

use crate::constants::NONE_VALUE;
use crate::disk;
use crate::errors::DatabaseError;
use crate::pages::{BasePage, TailPage};
use crate::persistables::{PagePersistable, PageRangePersistable};
use crate::records::{Record, Rid, Tid};

pub struct PageRange {
    page_range_path: String,
    page_range_index: usize,

    /// Number of user columns per record, reserved metadata excluded.
    num_columns: usize,

    /// Highest TID handed out by this range. Monotone for the life of the
    /// database; written back to the range metadata on persist.
    latest_tid: u64,

    /// Tail page sequence marker up to which merge has folded tails into
    /// base pages. Carried and persisted; only a future merge advances it.
    tps_index: u64,

    /// Base pages, created lazily on first write to their slot range.
    base_pages: HashMap<usize, BasePage>,

    /// Tail pages, created lazily as updates arrive.
    tail_pages: HashMap<usize, TailPage>,
}

impl PageRange {
    /// Create a fresh page range directory under `table_path` and its
    /// metadata blob.
    pub fn create(
        table_path: &str,
        page_range_index: usize,
        num_columns: usize,
    ) -> Result<Self, DatabaseError> {
        let page_range_path = Path::new(table_path)
            .join(format!("PR{}", page_range_index))
            .to_string_lossy()
            .into_owned();
        disk::create_path_directory(&page_range_path)?;
        disk::write_to_path_metadata(
            &page_range_path,
            &PageRangePersistable {
                page_range_path: page_range_path.clone(),
                page_range_index,
                latest_tid: 0,
                tps_index: 0,
            },
        )?;

        Ok(PageRange {
            page_range_path,
            page_range_index,
            num_columns,
            latest_tid: 0,
            tps_index: 0,
            base_pages: HashMap::new(),
            tail_pages: HashMap::new(),
        })
    }

    /// Load an existing page range: its metadata blob plus every `BP` and
    /// `TP` directory found underneath it.
    pub fn load(page_range_path: &str, num_columns: usize) -> Result<Self, DatabaseError> {
        let metadata: PageRangePersistable = disk::read_from_path_metadata(page_range_path)?;

        let mut base_pages = HashMap::new();
        let mut tail_pages = HashMap::new();
        for page_dir in disk::list_directories_in_path(page_range_path)? {
            let name = page_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let path = page_dir.to_string_lossy().into_owned();

            if let Some(index) = name.strip_prefix("BP") {
                if let Ok(index) = index.parse::<usize>() {
                    base_pages.insert(index, BasePage::new(path, num_columns));
                }
            } else if let Some(index) = name.strip_prefix("TP") {
                if let Ok(index) = index.parse::<usize>() {
                    tail_pages.insert(index, TailPage::new(path, num_columns));
                }
            }
        }

        Ok(PageRange {
            page_range_path: metadata.page_range_path,
            page_range_index: metadata.page_range_index,
            num_columns,
            latest_tid: metadata.latest_tid,
            tps_index: metadata.tps_index,
            base_pages,
            tail_pages,
        })
    }

    pub fn page_range_index(&self) -> usize {
        self.page_range_index
    }

    /// Write `latest_tid` and `tps_index` back to the range metadata blob.
    pub fn persist(&self) -> Result<(), DatabaseError> {
        disk::write_to_path_metadata(
            &self.page_range_path,
            &PageRangePersistable {
                page_range_path: self.page_range_path.clone(),
                page_range_index: self.page_range_index,
                latest_tid: self.latest_tid,
                tps_index: self.tps_index,
            },
        )
    }

    fn create_page_directory(&self, name: &str, page_index: usize) -> Result<String, DatabaseError> {
        let page_path = Path::new(&self.page_range_path)
            .join(name)
            .to_string_lossy()
            .into_owned();
        disk::create_path_directory(&page_path)?;
        disk::write_to_path_metadata(
            &page_path,
            &PagePersistable {
                page_path: page_path.clone(),
                page_index,
                occupancy: crate::bufferpool::BufferPool::empty_occupancy(),
            },
        )?;
        Ok(page_path)
    }

    /// Base page at `index`, created lazily on first access.
    fn base_page(&mut self, index: usize) -> Result<BasePage, DatabaseError> {
        if !self.base_pages.contains_key(&index) {
            let path = self.create_page_directory(&format!("BP{}", index), index)?;
            self.base_pages
                .insert(index, BasePage::new(path, self.num_columns));
        }
        Ok(self.base_pages[&index].clone())
    }

    /// Tail page at `index`, created lazily on first access.
    fn tail_page(&mut self, index: usize) -> Result<TailPage, DatabaseError> {
        if !self.tail_pages.contains_key(&index) {
            let path = self.create_page_directory(&format!("TP{}", index), index)?;
            self.tail_pages
                .insert(index, TailPage::new(path, self.num_columns));
        }
        Ok(self.tail_pages[&index].clone())
    }

    /// Insert a base record into the page its RID maps to.
    pub fn insert_record(&mut self, record: &Record) -> Result<(), DatabaseError> {
        let page = self.base_page(record.rid.base_page_index())?;
        page.insert_record(record)?;
        Ok(())
    }

    /// Read the user columns of a record. `rollback_version` is zero for
    /// the latest version and `-k` to skip the `k` most recent tail
    /// versions; rewinding past the oldest tail yields the base tuple.
    /// Returns `None` for a deleted record.
    pub fn read_record(
        &mut self,
        rid: Rid,
        rollback_version: i64,
    ) -> Result<Option<Vec<i64>>, DatabaseError> {
        let base = self.base_page(rid.base_page_index())?;

        if !base.is_occupied(rid)? {
            return Ok(None);
        }

        let head = match base.get_indirection_tid(rid)? {
            // Never updated, so every column comes from the base page.
            None => return Ok(Some(self.base_tuple(&base, rid)?)),
            Some(tid) => tid,
        };

        // Walk the version chain backwards from the newest tail.
        let mut tid = head;
        for _ in 0..rollback_version.unsigned_abs() {
            let tail = self.tail_page(tid.tail_page_index())?;
            match tail.get_indirection_tid(tid)? {
                Some(previous) => tid = previous,
                None => return Ok(Some(self.base_tuple(&base, rid)?)),
            }
        }

        let schema = base.get_schema_encoding(rid)?;
        let tail = self.tail_page(tid.tail_page_index())?;
        let mut columns = Vec::with_capacity(self.num_columns);
        for column in 0..self.num_columns {
            let value = if schema.is_updated(column) {
                let tail_value = tail.select_entry(tid, column)?;
                if tail_value == NONE_VALUE {
                    base.select_entry(rid, column)?
                } else {
                    tail_value
                }
            } else {
                base.select_entry(rid, column)?
            };
            columns.push(value);
        }
        Ok(Some(columns))
    }

    fn base_tuple(&self, base: &BasePage, rid: Rid) -> Result<Vec<i64>, DatabaseError> {
        let mut columns = Vec::with_capacity(self.num_columns);
        for column in 0..self.num_columns {
            columns.push(base.select_entry(rid, column)?);
        }
        Ok(columns)
    }

    /// Append a new version of the record. `None` entries in `new_columns`
    /// keep the previous value. Allocates a TID even if nothing changed.
    pub fn update_record(
        &mut self,
        rid: Rid,
        new_columns: &[Option<i64>],
    ) -> Result<(), DatabaseError> {
        let base = self.base_page(rid.base_page_index())?;

        let old_columns = self
            .read_record(rid, 0)?
            .ok_or(DatabaseError::NotFound)?;
        let old_indirection = base.get_indirection_tid(rid)?;
        let mut schema = base.get_schema_encoding(rid)?;

        // Cumulative scheme: the tail record carries the full merged tuple.
        let mut merged = old_columns.clone();
        for (column, update) in new_columns.iter().enumerate() {
            if let Some(value) = *update {
                if value != old_columns[column] {
                    schema.mark_updated(column);
                }
                merged[column] = value;
            }
        }

        self.latest_tid += 1;
        let tid = Tid::new(self.latest_tid);
        let tail = self.tail_page(tid.tail_page_index())?;

        let indirection_entry = old_indirection.map(|t| t.raw() as i64).unwrap_or(0);
        tail.insert_record(tid, rid.raw() as i64, &merged, indirection_entry)?;

        // Publish the new version on the base record last.
        base.set_indirection_tid(rid, tid)?;
        base.set_schema_encoding(rid, schema)?;
        Ok(())
    }

    /// Logically delete the record: append a tombstone tail whose RID entry
    /// is negated, then retire the base slot. The slot is never reused.
    pub fn delete_record(&mut self, rid: Rid) -> Result<(), DatabaseError> {
        let base = self.base_page(rid.base_page_index())?;
        let old_indirection = base.get_indirection_tid(rid)?;

        self.latest_tid += 1;
        let tid = Tid::new(self.latest_tid);
        let tail = self.tail_page(tid.tail_page_index())?;

        let tombstone = vec![NONE_VALUE; self.num_columns];
        let indirection_entry = old_indirection.map(|t| t.raw() as i64).unwrap_or(0);
        tail.insert_record(tid, -(rid.raw() as i64), &tombstone, indirection_entry)?;

        base.set_indirection_tid(rid, tid)?;
        base.clear_slot(rid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bufferpool::BUFFERPOOL;

    fn scratch_range(dir: &tempfile::TempDir, num_columns: usize) -> PageRange {
        let table_path = dir.path().to_string_lossy().into_owned();
        PageRange::create(&table_path, 0, num_columns).unwrap()
    }

    #[test]
    fn insert_and_read_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut range = scratch_range(&dir, 3);

        let rid = Rid::new(1);
        range
            .insert_record(&Record::new(rid, 0, vec![10, 20, 30]))
            .unwrap();

        assert_eq!(range.read_record(rid, 0).unwrap(), Some(vec![10, 20, 30]));

        BUFFERPOOL.discard_pages_under(dir.path().to_string_lossy().as_ref());
    }

    #[test]
    fn update_chain_and_version_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let mut range = scratch_range(&dir, 3);

        let rid = Rid::new(1);
        range
            .insert_record(&Record::new(rid, 0, vec![10, 20, 30]))
            .unwrap();
        range.update_record(rid, &[None, Some(25), None]).unwrap();
        range.update_record(rid, &[None, Some(26), None]).unwrap();

        assert_eq!(range.read_record(rid, 0).unwrap(), Some(vec![10, 26, 30]));
        assert_eq!(range.read_record(rid, -1).unwrap(), Some(vec![10, 25, 30]));
        assert_eq!(range.read_record(rid, -2).unwrap(), Some(vec![10, 20, 30]));
        // Rewinding past the oldest tail clamps to the base tuple.
        assert_eq!(range.read_record(rid, -5).unwrap(), Some(vec![10, 20, 30]));

        BUFFERPOOL.discard_pages_under(dir.path().to_string_lossy().as_ref());
    }

    #[test]
    fn unchanged_update_still_allocates_a_tid() {
        let dir = tempfile::tempdir().unwrap();
        let mut range = scratch_range(&dir, 2);

        let rid = Rid::new(1);
        range.insert_record(&Record::new(rid, 0, vec![1, 2])).unwrap();
        range.update_record(rid, &[Some(1), Some(2)]).unwrap();
        range.update_record(rid, &[Some(1), Some(2)]).unwrap();

        assert_eq!(range.latest_tid, 2);
        assert_eq!(range.read_record(rid, 0).unwrap(), Some(vec![1, 2]));

        BUFFERPOOL.discard_pages_under(dir.path().to_string_lossy().as_ref());
    }

    #[test]
    fn deleted_record_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut range = scratch_range(&dir, 2);

        let rid = Rid::new(1);
        range.insert_record(&Record::new(rid, 0, vec![5, 6])).unwrap();
        range.delete_record(rid).unwrap();

        assert_eq!(range.read_record(rid, 0).unwrap(), None);
        assert_eq!(range.read_record(rid, -1).unwrap(), None);

        BUFFERPOOL.discard_pages_under(dir.path().to_string_lossy().as_ref());
    }
}
