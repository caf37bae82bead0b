//! The database handle: owns the working directory and the set of open
//! tables, and ties buffer pool teardown to `close`.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use crate::bufferpool::BUFFERPOOL;
use crate::disk;
use crate::errors::DatabaseError;
use crate::table::Table;

pub struct Database {
    /// Working directory; set by `open`.
    db_path: Option<String>,

    /// Open tables by name.
    tables: HashMap<String, Arc<Table>>,
}

impl Database {
    pub fn new() -> Self {
        Database {
            db_path: None,
            tables: HashMap::new(),
        }
    }

    /// Set the working directory to `path`, creating it if needed. An
    /// existing directory has all of its tables loaded.
    pub fn open(&mut self, path: &str) -> Result<(), DatabaseError> {
        if disk::path_exists(path) {
            info!("database at path {} already exists", path);
            self.db_path = Some(path.to_string());
            self.load_tables()?;
        } else {
            disk::create_path_directory(path)?;
            info!("database at path {} created", path);
            self.db_path = Some(path.to_string());
        }
        Ok(())
    }

    fn load_tables(&mut self) -> Result<(), DatabaseError> {
        let db_path = self.db_path.as_deref().ok_or(DatabaseError::DatabaseClosed)?;
        for table_dir in disk::list_directories_in_path(db_path)? {
            let table = Table::load(&table_dir.to_string_lossy())?;
            self.tables.insert(table.name.clone(), Arc::new(table));
        }
        Ok(())
    }

    /// Persist every table, flush the buffer pool, and release the pool
    /// frames this database was using.
    pub fn close(&mut self) -> Result<(), DatabaseError> {
        for table in self.tables.values() {
            table.persist()?;
        }
        BUFFERPOOL.commit_writes_to_disk()?;
        for table in self.tables.values() {
            BUFFERPOOL.discard_pages_under(table.table_path());
        }
        self.tables.clear();
        self.db_path = None;
        info!("database closed");
        Ok(())
    }

    /// Create a new table owned by this database.
    pub fn create_table(
        &mut self,
        name: &str,
        num_columns: usize,
        key_index: usize,
    ) -> Result<Arc<Table>, DatabaseError> {
        let db_path = self.db_path.as_deref().ok_or(DatabaseError::DatabaseClosed)?;
        if self.tables.contains_key(name) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }

        let table = Arc::new(Table::create(db_path, name, num_columns, key_index)?);
        self.tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Drop a table: forget it, discard its buffer pool frames without
    /// flushing, and delete its directory.
    pub fn drop_table(&mut self, name: &str) -> Result<(), DatabaseError> {
        let table = self
            .tables
            .remove(name)
            .ok_or_else(|| DatabaseError::NoSuchTable(name.to_string()))?;
        BUFFERPOOL.discard_pages_under(table.table_path());
        disk::remove_path_directory(table.table_path())?;
        info!("dropped table {}", table.table_path());
        Ok(())
    }

    /// Get an open table by name.
    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).cloned()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
