//! Thin page adapters over the buffer pool. A page object holds no data of
//! its own, only its path and column count; every read and write goes
//! through [`BUFFERPOOL`](crate::bufferpool::BUFFERPOOL).

use crate::bufferpool::BUFFERPOOL;
use crate::constants::{
    INDIRECTION_COL, NUM_METADATA_COLS, RID_COL, SCHEMA_ENCODING_COL, TIMESTAMP_COL,
};
use crate::errors::DatabaseError;
use crate::helpers::unix_timestamp;
use crate::records::{Record, Rid, SchemaEncoding, Tid};

/// Lay out one full record image: user columns followed by the reserved
/// metadata columns.
fn record_image(columns: &[i64], indirection: i64, schema: i64, rid_entry: i64) -> Vec<i64> {
    let num_columns = columns.len();
    let mut values = vec![0; num_columns + NUM_METADATA_COLS];
    values[..num_columns].copy_from_slice(columns);
    values[num_columns + INDIRECTION_COL] = indirection;
    values[num_columns + SCHEMA_ENCODING_COL] = schema;
    values[num_columns + RID_COL] = rid_entry;
    values[num_columns + TIMESTAMP_COL] = unix_timestamp();
    values
}

/// A base page: original inserted tuples plus the full metadata surface.
#[derive(Clone, Debug)]
pub struct BasePage {
    page_path: String,
    num_columns: usize,
}

impl BasePage {
    pub fn new(page_path: String, num_columns: usize) -> Self {
        BasePage {
            page_path,
            num_columns,
        }
    }

    /// Write a freshly inserted record: user columns, then indirection 0,
    /// schema encoding 0, the record's own RID, and the current timestamp.
    pub fn insert_record(&self, record: &Record) -> Result<usize, DatabaseError> {
        let values = record_image(&record.columns, 0, 0, record.rid.raw() as i64);
        BUFFERPOOL.insert_record(&self.page_path, record.rid.slot_index(), &values)
    }

    pub fn select_entry(&self, rid: Rid, column: usize) -> Result<i64, DatabaseError> {
        BUFFERPOOL.get_entry(&self.page_path, column, rid.slot_index())
    }

    pub fn get_schema_encoding(&self, rid: Rid) -> Result<SchemaEncoding, DatabaseError> {
        let bits = BUFFERPOOL.get_entry(
            &self.page_path,
            self.num_columns + SCHEMA_ENCODING_COL,
            rid.slot_index(),
        )?;
        Ok(SchemaEncoding::from_raw(bits))
    }

    pub fn set_schema_encoding(
        &self,
        rid: Rid,
        encoding: SchemaEncoding,
    ) -> Result<(), DatabaseError> {
        BUFFERPOOL.set_entry(
            &self.page_path,
            self.num_columns + SCHEMA_ENCODING_COL,
            rid.slot_index(),
            encoding.raw(),
        )
    }

    /// The head of the record's version chain, or `None` if it was never
    /// updated.
    pub fn get_indirection_tid(&self, rid: Rid) -> Result<Option<Tid>, DatabaseError> {
        let entry = BUFFERPOOL.get_entry(
            &self.page_path,
            self.num_columns + INDIRECTION_COL,
            rid.slot_index(),
        )?;
        Ok(if entry == 0 {
            None
        } else {
            Some(Tid::new(entry as u64))
        })
    }

    pub fn set_indirection_tid(&self, rid: Rid, tid: Tid) -> Result<(), DatabaseError> {
        BUFFERPOOL.set_entry(
            &self.page_path,
            self.num_columns + INDIRECTION_COL,
            rid.slot_index(),
            tid.raw() as i64,
        )
    }

    pub fn is_occupied(&self, rid: Rid) -> Result<bool, DatabaseError> {
        BUFFERPOOL.is_slot_occupied(&self.page_path, rid.slot_index())
    }

    /// Retire the record's slot. The slot is never handed out again because
    /// RIDs are never reused.
    pub fn clear_slot(&self, rid: Rid) -> Result<(), DatabaseError> {
        BUFFERPOOL.clear_slot(&self.page_path, rid.slot_index())
    }
}

/// A tail page: append-only delta tuples. Exposes just enough surface to
/// append a version and to walk the chain backwards.
#[derive(Clone, Debug)]
pub struct TailPage {
    page_path: String,
    num_columns: usize,
}

impl TailPage {
    pub fn new(page_path: String, num_columns: usize) -> Self {
        TailPage {
            page_path,
            num_columns,
        }
    }

    /// Append a tail record. `rid_entry` is the owning base record's RID
    /// (negated for tombstones) and `indirection` the previous chain head,
    /// which threads the version chain oldest-ward.
    pub fn insert_record(
        &self,
        tid: Tid,
        rid_entry: i64,
        columns: &[i64],
        indirection: i64,
    ) -> Result<usize, DatabaseError> {
        // Schema encoding is tracked on the base record; tail records carry 0.
        let values = record_image(columns, indirection, 0, rid_entry);
        BUFFERPOOL.insert_record(&self.page_path, tid.slot_index(), &values)
    }

    pub fn select_entry(&self, tid: Tid, column: usize) -> Result<i64, DatabaseError> {
        BUFFERPOOL.get_entry(&self.page_path, column, tid.slot_index())
    }

    /// The previous (older) tail version, or `None` at the oldest tail.
    pub fn get_indirection_tid(&self, tid: Tid) -> Result<Option<Tid>, DatabaseError> {
        let entry = BUFFERPOOL.get_entry(
            &self.page_path,
            self.num_columns + INDIRECTION_COL,
            tid.slot_index(),
        )?;
        Ok(if entry == 0 {
            None
        } else {
            Some(Tid::new(entry as u64))
        })
    }
}
