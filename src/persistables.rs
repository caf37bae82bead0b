use serde::{Deserialize, Serialize};

/// Contents of a table directory's metadata blob.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TablePersistable {
    pub table_path: String,
    pub num_columns: usize,
    pub key_index: usize,
    pub num_records: u64,
}

/// Contents of a page range directory's metadata blob. `tps_index` is the
/// tail page sequence marker up to which merge has folded tails into base
/// pages; it is carried and persisted but only a future merge advances it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PageRangePersistable {
    pub page_range_path: String,
    pub page_range_index: usize,
    pub latest_tid: u64,
    pub tps_index: u64,
}

/// Contents of a base or tail page directory's metadata blob. `occupancy`
/// is the slot bitmap, one bit per record slot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PagePersistable {
    pub page_path: String,
    pub page_index: usize,
    pub occupancy: Vec<u64>,
}
