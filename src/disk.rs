//! Byte-level access to the database directory tree: opaque metadata blobs
//! (one `meta` file per directory) and raw column files. Everything above
//! this module goes through the buffer pool; nothing above it touches the
//! filesystem directly.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::{METADATA_FILE, RECORDS_PER_PAGE, VALUE_WIDTH};
use crate::errors::DatabaseError;

/// Read and deserialize the metadata blob stored in `path`.
pub fn read_from_path_metadata<T: DeserializeOwned>(path: &str) -> Result<T, DatabaseError> {
    let mut file = File::open(Path::new(path).join(METADATA_FILE))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Serialize and write a metadata blob into `path`, replacing any previous one.
pub fn write_to_path_metadata<T: Serialize>(path: &str, metadata: &T) -> Result<(), DatabaseError> {
    let serialized = serde_json::to_string(metadata)?;
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .open(Path::new(path).join(METADATA_FILE))?;
    file.write_all(serialized.as_bytes())?;
    Ok(())
}

/// Create the directory at `path`. Fails if it already exists.
pub fn create_path_directory(path: &str) -> Result<(), DatabaseError> {
    fs::create_dir_all(Path::new(path).parent().unwrap_or(Path::new("")))?;
    fs::create_dir(path)?;
    Ok(())
}

/// Remove the directory at `path` and everything under it.
pub fn remove_path_directory(path: &str) -> Result<(), DatabaseError> {
    fs::remove_dir_all(path)?;
    Ok(())
}

/// List the subdirectories of `path`.
pub fn list_directories_in_path(path: &str) -> Result<Vec<PathBuf>, DatabaseError> {
    let mut directories = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            directories.push(entry.path());
        }
    }
    Ok(directories)
}

pub fn path_exists(path: &str) -> bool {
    Path::new(path).exists()
}

fn column_file(page_path: &str, column: usize) -> PathBuf {
    Path::new(page_path).join(format!("{}.dat", column))
}

/// Read one column of a physical page. Returns `None` when the column file
/// has never been flushed (a fresh page), `Some` with exactly
/// `RECORDS_PER_PAGE` values otherwise.
pub fn read_column_file(page_path: &str, column: usize) -> Result<Option<Vec<i64>>, DatabaseError> {
    let path = column_file(page_path, column);
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    let mut bytes = vec![0u8; RECORDS_PER_PAGE * VALUE_WIDTH];
    file.read_exact(&mut bytes)?;

    let values = bytes
        .chunks_exact(VALUE_WIDTH)
        .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    Ok(Some(values))
}

/// Write one column of a physical page, replacing any previous contents.
pub fn write_column_file(
    page_path: &str,
    column: usize,
    values: &[i64],
) -> Result<(), DatabaseError> {
    let mut bytes = Vec::with_capacity(values.len() * VALUE_WIDTH);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .open(column_file(page_path, column))?;
    file.write_all(&bytes)?;
    Ok(())
}
