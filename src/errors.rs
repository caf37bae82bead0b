use thiserror::Error;

/// Every way an engine operation can fail. Query methods whose public
/// contract is `bool` translate these into `false` at the table boundary.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("page at {0} has not been allocated")]
    PageNotAllocated(String),

    #[error("slot {slot} of page {path} already holds a record")]
    SlotOccupied { path: String, slot: usize },

    #[error("slot {slot} is out of bounds")]
    SlotOutOfBounds { slot: usize },

    #[error("buffer pool is full and every frame is pinned")]
    PoolExhausted,

    #[error("no index on column {0}")]
    NoIndex(usize),

    #[error("expected {expected} columns, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("column {0} does not exist")]
    UnknownColumn(usize),

    #[error("unsupported schema: {0}")]
    InvalidSchema(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} does not exist")]
    NoSuchTable(String),

    #[error("database is not open")]
    DatabaseClosed,

    #[error("record not found")]
    NotFound,
}
