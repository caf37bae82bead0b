//! Transactions: an ordered list of queries bound to their tables, run
//! sequentially. The first failing query aborts the transaction; success
//! commits by flushing the buffer pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::bufferpool::BUFFERPOOL;
use crate::table::Table;

/// Next transaction id, unique for the life of the process.
static NUM_TRANSACTIONS: AtomicUsize = AtomicUsize::new(0);

/// A query bound to the table it will run against.
#[derive(Clone)]
pub enum Query {
    Insert {
        table: Arc<Table>,
        columns: Vec<i64>,
    },
    Update {
        table: Arc<Table>,
        primary_key: i64,
        columns: Vec<Option<i64>>,
    },
    Select {
        table: Arc<Table>,
        search_key: i64,
        search_column: usize,
        projection: Option<Vec<usize>>,
        rollback_version: i64,
    },
    Sum {
        table: Arc<Table>,
        start_range: i64,
        end_range: i64,
        aggregate_column: usize,
        rollback_version: i64,
    },
    Delete {
        table: Arc<Table>,
        primary_key: i64,
    },
}

impl Query {
    /// Run the query. `false` means the owning transaction must abort.
    fn run(&self) -> bool {
        match self {
            Query::Insert { table, columns } => table.insert_record(columns),
            Query::Update {
                table,
                primary_key,
                columns,
            } => table.update_record(*primary_key, columns),
            Query::Select {
                table,
                search_key,
                search_column,
                projection,
                rollback_version,
            } => table
                .select_record(
                    *search_key,
                    *search_column,
                    projection.as_deref(),
                    *rollback_version,
                )
                .is_ok(),
            Query::Sum {
                table,
                start_range,
                end_range,
                aggregate_column,
                rollback_version,
            } => table
                .sum_records(
                    *start_range,
                    *end_range,
                    *aggregate_column,
                    *rollback_version,
                )
                .is_ok(),
            Query::Delete { table, primary_key } => table.delete_record(*primary_key),
        }
    }
}

/// An ordered list of queries that commit or abort together.
#[derive(Clone)]
pub struct Transaction {
    pub id: usize,
    queries: Vec<Query>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            id: NUM_TRANSACTIONS.fetch_add(1, Ordering::SeqCst),
            queries: Vec::new(),
        }
    }

    pub fn add_query(&mut self, query: Query) {
        self.queries.push(query);
    }

    pub fn add_insert(&mut self, table: &Arc<Table>, columns: Vec<i64>) {
        self.add_query(Query::Insert {
            table: table.clone(),
            columns,
        });
    }

    pub fn add_update(&mut self, table: &Arc<Table>, primary_key: i64, columns: Vec<Option<i64>>) {
        self.add_query(Query::Update {
            table: table.clone(),
            primary_key,
            columns,
        });
    }

    pub fn add_select(
        &mut self,
        table: &Arc<Table>,
        search_key: i64,
        search_column: usize,
        projection: Option<Vec<usize>>,
    ) {
        self.add_select_version(table, search_key, search_column, projection, 0);
    }

    pub fn add_select_version(
        &mut self,
        table: &Arc<Table>,
        search_key: i64,
        search_column: usize,
        projection: Option<Vec<usize>>,
        rollback_version: i64,
    ) {
        self.add_query(Query::Select {
            table: table.clone(),
            search_key,
            search_column,
            projection,
            rollback_version,
        });
    }

    pub fn add_sum(
        &mut self,
        table: &Arc<Table>,
        start_range: i64,
        end_range: i64,
        aggregate_column: usize,
    ) {
        self.add_sum_version(table, start_range, end_range, aggregate_column, 0);
    }

    pub fn add_sum_version(
        &mut self,
        table: &Arc<Table>,
        start_range: i64,
        end_range: i64,
        aggregate_column: usize,
        rollback_version: i64,
    ) {
        self.add_query(Query::Sum {
            table: table.clone(),
            start_range,
            end_range,
            aggregate_column,
            rollback_version,
        });
    }

    pub fn add_delete(&mut self, table: &Arc<Table>, primary_key: i64) {
        self.add_query(Query::Delete {
            table: table.clone(),
            primary_key,
        });
    }

    /// Run every query in order. The first `false` result aborts the
    /// transaction; otherwise it commits.
    pub fn run(&self) -> bool {
        for query in &self.queries {
            if !query.run() {
                return self.abort();
            }
        }
        self.commit()
    }

    /// Abort: report failure to the caller. Queries already applied stay in
    /// place; there is no undo log.
    fn abort(&self) -> bool {
        warn!("transaction {} aborted", self.id);
        false
    }

    /// Commit: flush every dirty buffer pool frame to disk.
    fn commit(&self) -> bool {
        match BUFFERPOOL.commit_writes_to_disk() {
            Ok(()) => {
                debug!("transaction {} committed", self.id);
                true
            }
            Err(error) => {
                warn!("transaction {} failed to commit: {}", self.id, error);
                false
            }
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
