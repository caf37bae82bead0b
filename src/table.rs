//! A table orchestrates page ranges, the buffer pool, the secondary index,
//! and the lock manager for a single relation. Query methods whose public
//! contract is `bool` (insert, update, delete) translate every internal
//! failure into `false`, which the transaction layer treats as an abort
//! signal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;

use log::{info, warn};

use crate::constants::MAX_COLUMNS;
use crate::disk;
use crate::errors::DatabaseError;
use crate::helpers::project_columns;
use crate::index::Index;
use crate::lock_manager::LOCK_MANAGER;
use crate::page_range::PageRange;
use crate::persistables::TablePersistable;
use crate::records::{Record, Rid};

pub struct Table {
    /// Directory holding everything this table owns.
    table_path: String,

    /// Name of the table.
    pub name: String,

    /// Number of user columns.
    pub num_columns: usize,

    /// Index of the primary key column.
    key_index: usize,

    /// RID sequence: the number of records ever inserted. Monotone for the
    /// life of the table; deletes retire RIDs but never free them.
    num_records: AtomicU64,

    /// Secondary index over the user columns.
    index: Index,

    /// Page ranges, created lazily as the RID sequence grows into them.
    page_ranges: Mutex<HashMap<usize, PageRange>>,
}

impl Table {
    /// Create a brand new table directory under `db_path`.
    pub fn create(
        db_path: &str,
        name: &str,
        num_columns: usize,
        key_index: usize,
    ) -> Result<Self, DatabaseError> {
        if num_columns == 0 || num_columns > MAX_COLUMNS {
            return Err(DatabaseError::InvalidSchema(format!(
                "{} columns (supported: 1 through {})",
                num_columns, MAX_COLUMNS
            )));
        }
        if key_index >= num_columns {
            return Err(DatabaseError::InvalidSchema(format!(
                "key index {} out of range for {} columns",
                key_index, num_columns
            )));
        }

        let table_path = Path::new(db_path).join(name).to_string_lossy().into_owned();
        if disk::path_exists(&table_path) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }
        disk::create_path_directory(&table_path)?;
        disk::write_to_path_metadata(
            &table_path,
            &TablePersistable {
                table_path: table_path.clone(),
                num_columns,
                key_index,
                num_records: 0,
            },
        )?;

        info!("created table {}", table_path);
        Ok(Table {
            table_path,
            name: name.to_string(),
            num_columns,
            key_index,
            num_records: AtomicU64::new(0),
            index: Index::new(num_columns, key_index),
            page_ranges: Mutex::new(HashMap::new()),
        })
    }

    /// Load an existing table directory: metadata, page ranges, and a fresh
    /// secondary index rebuilt by scanning the live records.
    pub fn load(table_path: &str) -> Result<Self, DatabaseError> {
        let metadata: TablePersistable = disk::read_from_path_metadata(table_path)?;

        let mut ranges = HashMap::new();
        for range_dir in disk::list_directories_in_path(table_path)? {
            let name = range_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(index) = name.strip_prefix("PR") {
                if let Ok(index) = index.parse::<usize>() {
                    let path = range_dir.to_string_lossy().into_owned();
                    ranges.insert(index, PageRange::load(&path, metadata.num_columns)?);
                }
            }
        }

        // The index is not persisted; rebuild it from the live records.
        let index = Index::new(metadata.num_columns, metadata.key_index);
        for n in 1..=metadata.num_records {
            let rid = Rid::new(n);
            if let Some(range) = ranges.get_mut(&rid.page_range_index()) {
                if let Some(columns) = range.read_record(rid, 0)? {
                    index.insert(&columns, rid);
                }
            }
        }

        let name = Path::new(table_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            "loaded table {} with {} records",
            metadata.table_path, metadata.num_records
        );
        Ok(Table {
            table_path: metadata.table_path.clone(),
            name,
            num_columns: metadata.num_columns,
            key_index: metadata.key_index,
            num_records: AtomicU64::new(metadata.num_records),
            index,
            page_ranges: Mutex::new(ranges),
        })
    }

    pub fn table_path(&self) -> &str {
        &self.table_path
    }

    /// Number of records ever inserted (the RID high-water mark).
    pub fn num_records(&self) -> u64 {
        self.num_records.load(Ordering::SeqCst)
    }

    /// Write table metadata and every page range's metadata back to disk.
    pub fn persist(&self) -> Result<(), DatabaseError> {
        self.write_metadata()?;
        let ranges = self.page_ranges.lock().unwrap();
        for range in ranges.values() {
            range.persist()?;
        }
        Ok(())
    }

    fn write_metadata(&self) -> Result<(), DatabaseError> {
        disk::write_to_path_metadata(
            &self.table_path,
            &TablePersistable {
                table_path: self.table_path.clone(),
                num_columns: self.num_columns,
                key_index: self.key_index,
                num_records: self.num_records(),
            },
        )
    }

    fn lock_read(&self, page_range_index: usize) {
        while !LOCK_MANAGER.acquire_read(&self.table_path, page_range_index) {
            thread::yield_now();
        }
    }

    fn lock_write(&self, page_range_index: usize) {
        while !LOCK_MANAGER.acquire_write(&self.table_path, page_range_index) {
            thread::yield_now();
        }
    }

    /// Run `f` against one page range, creating the range lazily.
    fn with_page_range<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut PageRange) -> Result<R, DatabaseError>,
    ) -> Result<R, DatabaseError> {
        let mut ranges = self.page_ranges.lock().unwrap();
        if !ranges.contains_key(&index) {
            let range = PageRange::create(&self.table_path, index, self.num_columns)?;
            ranges.insert(index, range);
        }
        f(ranges.get_mut(&index).unwrap())
    }

    /// Every RID ever issued, live or retired.
    fn all_rids(&self) -> Vec<Rid> {
        (1..=self.num_records()).map(Rid::new).collect()
    }

    /// Create a new base record. Returns `true` if committed, `false` if
    /// the operation aborted (wrong arity or duplicate key).
    pub fn insert_record(&self, columns: &[i64]) -> bool {
        loop {
            let observed = self.num_records();
            let rid = Rid::new(observed + 1);
            let page_range_index = rid.page_range_index();
            self.lock_write(page_range_index);

            // An insert to another range may have taken this RID while we
            // were acquiring the lock; recompute if the sequence moved.
            if self.num_records() != observed {
                LOCK_MANAGER.release_write(&self.table_path, page_range_index);
                continue;
            }

            let committed = self.try_insert(rid, columns);
            LOCK_MANAGER.release_write(&self.table_path, page_range_index);
            return committed;
        }
    }

    fn try_insert(&self, rid: Rid, columns: &[i64]) -> bool {
        if columns.len() != self.num_columns {
            return false;
        }
        // The key column is always indexed, so a failed lookup is fatal
        // rather than a scan fallback.
        match self.index.locate(columns[self.key_index], self.key_index) {
            Ok(rids) if rids.is_empty() => {}
            Ok(_) => return false, // duplicate key
            Err(error) => {
                warn!("insert aborted: {}", error);
                return false;
            }
        }

        let record = Record::new(rid, self.key_index, columns.to_vec());
        if let Err(error) =
            self.with_page_range(rid.page_range_index(), |range| range.insert_record(&record))
        {
            warn!("insert aborted: {}", error);
            return false;
        }

        self.index.insert(columns, rid);

        self.num_records.fetch_add(1, Ordering::SeqCst);
        if let Err(error) = self.write_metadata() {
            warn!("insert aborted: {}", error);
            return false;
        }
        true
    }

    /// Select every record whose `search_column` equals `search_key`.
    /// `selected_columns` is an optional projection bitmask over the user
    /// columns; `rollback_version` is 0 for the latest version and `-k` to
    /// rewind `k` tail versions.
    pub fn select_record(
        &self,
        search_key: i64,
        search_column: usize,
        selected_columns: Option<&[usize]>,
        rollback_version: i64,
    ) -> Result<Vec<Record>, DatabaseError> {
        if search_column >= self.num_columns {
            return Err(DatabaseError::UnknownColumn(search_column));
        }
        if let Some(mask) = selected_columns {
            if mask.len() != self.num_columns {
                return Err(DatabaseError::ArityMismatch {
                    expected: self.num_columns,
                    got: mask.len(),
                });
            }
        }

        let mut rids: Vec<Rid> = match self.index.locate(search_key, search_column) {
            Ok(rids) => rids.into_iter().collect(),
            // No index on this column, so scan every RID ever issued.
            Err(DatabaseError::NoIndex(_)) => self.all_rids(),
            Err(error) => return Err(error),
        };
        rids.sort();

        let mut records = Vec::new();
        for rid in rids {
            let page_range_index = rid.page_range_index();
            self.lock_read(page_range_index);
            let outcome =
                self.with_page_range(page_range_index, |range| {
                    range.read_record(rid, rollback_version)
                });
            LOCK_MANAGER.release_read(&self.table_path, page_range_index);

            let columns = match outcome? {
                Some(columns) => columns,
                None => continue, // deleted
            };
            // Required on the scan path, and protects against an index
            // entry going stale between locate and read.
            if columns[search_column] != search_key {
                continue;
            }

            let projected = match selected_columns {
                Some(mask) => project_columns(&columns, mask),
                None => columns,
            };
            records.push(Record::new(rid, self.key_index, projected));
        }
        Ok(records)
    }

    /// Sum `aggregate_column` over every record whose primary key falls in
    /// the inclusive range `[start_range, end_range]`. An empty range sums
    /// to zero.
    pub fn sum_records(
        &self,
        start_range: i64,
        end_range: i64,
        aggregate_column: usize,
        rollback_version: i64,
    ) -> Result<i64, DatabaseError> {
        if aggregate_column >= self.num_columns {
            return Err(DatabaseError::UnknownColumn(aggregate_column));
        }

        let rids: Vec<Rid> = match self.index.locate_range(start_range, end_range, self.key_index)
        {
            Ok(rids) => rids.into_iter().collect(),
            Err(DatabaseError::NoIndex(_)) => self.all_rids(),
            Err(error) => return Err(error),
        };

        let mut sum = 0;
        for rid in rids {
            let page_range_index = rid.page_range_index();
            self.lock_read(page_range_index);
            let outcome =
                self.with_page_range(page_range_index, |range| {
                    range.read_record(rid, rollback_version)
                });
            LOCK_MANAGER.release_read(&self.table_path, page_range_index);

            if let Some(columns) = outcome? {
                let key = columns[self.key_index];
                if key >= start_range && key <= end_range {
                    sum += columns[aggregate_column];
                }
            }
        }
        Ok(sum)
    }

    /// Append a new version of the record with this primary key. `None`
    /// entries keep the previous value.
    pub fn update_record(&self, primary_key: i64, new_columns: &[Option<i64>]) -> bool {
        if new_columns.len() != self.num_columns {
            return false;
        }

        let rids = match self.index.locate(primary_key, self.key_index) {
            Ok(rids) => rids,
            Err(error) => {
                warn!("update aborted: {}", error);
                return false;
            }
        };
        if rids.is_empty() {
            return false;
        }
        debug_assert!(rids.len() == 1, "key index maps a live key to one RID");
        let rid = *rids.iter().next().unwrap();
        let page_range_index = rid.page_range_index();

        self.lock_write(page_range_index);
        let outcome = (|| {
            let old_columns = self
                .with_page_range(page_range_index, |range| range.read_record(rid, 0))?
                .ok_or(DatabaseError::NotFound)?;
            self.index.update(&old_columns, new_columns, rid);
            self.with_page_range(page_range_index, |range| {
                range.update_record(rid, new_columns)
            })
        })();
        LOCK_MANAGER.release_write(&self.table_path, page_range_index);

        match outcome {
            Ok(()) => true,
            Err(error) => {
                warn!("update aborted: {}", error);
                false
            }
        }
    }

    /// Logically delete the record with this primary key.
    pub fn delete_record(&self, primary_key: i64) -> bool {
        let rids = match self.index.locate(primary_key, self.key_index) {
            Ok(rids) => rids,
            Err(error) => {
                warn!("delete aborted: {}", error);
                return false;
            }
        };
        if rids.is_empty() {
            return false;
        }
        debug_assert!(rids.len() == 1, "key index maps a live key to one RID");
        let rid = *rids.iter().next().unwrap();
        let page_range_index = rid.page_range_index();

        self.lock_write(page_range_index);
        let outcome = (|| {
            let columns = self
                .with_page_range(page_range_index, |range| range.read_record(rid, 0))?
                .ok_or(DatabaseError::NotFound)?;
            self.index.delete(&columns, rid);
            self.with_page_range(page_range_index, |range| range.delete_record(rid))
        })();
        LOCK_MANAGER.release_write(&self.table_path, page_range_index);

        match outcome {
            Ok(()) => true,
            Err(error) => {
                warn!("delete aborted: {}", error);
                false
            }
        }
    }

    /// Enable a secondary index on a non-key column and backfill it from
    /// the live records.
    pub fn create_index(&self, column: usize) -> Result<(), DatabaseError> {
        if column >= self.num_columns {
            return Err(DatabaseError::UnknownColumn(column));
        }
        self.index.create_index(column)?;

        for rid in self.all_rids() {
            let page_range_index = rid.page_range_index();
            self.lock_read(page_range_index);
            let outcome =
                self.with_page_range(page_range_index, |range| range.read_record(rid, 0));
            LOCK_MANAGER.release_read(&self.table_path, page_range_index);

            if let Some(columns) = outcome? {
                self.index.add_entry(columns[column], column, rid);
            }
        }
        Ok(())
    }

    /// Drop the secondary index on a non-key column.
    pub fn drop_index(&self, column: usize) -> Result<(), DatabaseError> {
        self.index.drop_index(column)
    }
}
