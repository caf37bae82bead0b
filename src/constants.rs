/// Number of record slots in every physical page. Changing this value
/// re-partitions the RID space and invalidates existing databases.
pub const RECORDS_PER_PAGE: usize = 512;

/// The number of base pages owned by each page range. Changing this value
/// re-partitions the RID space and invalidates existing databases.
pub const BASE_PAGES_PER_RANGE: usize = 16;

/// Number of reserved metadata columns appended after the user columns.
pub const NUM_METADATA_COLS: usize = 4;

/// Offset (from `num_columns`) of the INDIRECTION column. Holds the TID of
/// the most recent tail record, or zero if the record was never updated.
pub const INDIRECTION_COL: usize = 0;

/// Offset (from `num_columns`) of the SCHEMA ENCODING column. A bitmask
/// with bit `i` set once column `i` has been updated.
pub const SCHEMA_ENCODING_COL: usize = 1;

/// Offset (from `num_columns`) of the RID column. Base records store their
/// own RID; tail records store the RID of the base record they belong to,
/// negated for deletion tombstones.
pub const RID_COL: usize = 2;

/// Offset (from `num_columns`) of the TIMESTAMP column (seconds since epoch).
pub const TIMESTAMP_COL: usize = 3;

/// Width of a single column value in bytes. All columns are 64 bit integers.
pub const VALUE_WIDTH: usize = 8;

/// Reserved sentinel meaning "no value" inside a record. Tombstone tail
/// records carry it in every user column, and versioned reads fall back to
/// the base column when they encounter it. User data must never contain it.
pub const NONE_VALUE: i64 = i64::MIN;

/// Number of frames in the buffer pool. One frame holds one column of one
/// physical page. The pool stays correct below the working set size, only
/// slower.
pub const BP_NUM_FRAMES: usize = 512;

/// Largest number of user columns a table may have. The schema encoding is
/// a single 64 bit bitmask.
pub const MAX_COLUMNS: usize = 64;

/// Name of the metadata blob stored in every directory of the database tree.
pub const METADATA_FILE: &str = "meta";
