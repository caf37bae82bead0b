//! The buffer pool mediating every byte-level page access. Frames are keyed
//! by `(page_path, column_index)` and hold one column of one physical page;
//! slot occupancy bitmaps are kept per page and persisted inside the page
//! metadata blob. Eviction is LRU over unpinned frames, and dirty frames are
//! flushed through the disk module before they are dropped.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Mutex;

use log::debug;
use once_cell::sync::Lazy;

use crate::constants::{BP_NUM_FRAMES, RECORDS_PER_PAGE};
use crate::disk;
use crate::errors::DatabaseError;
use crate::persistables::PagePersistable;

/// Buffer pool shared by every table in the process.
pub static BUFFERPOOL: Lazy<BufferPool> = Lazy::new(BufferPool::new);

/// Number of words in a slot occupancy bitmap.
const OCCUPANCY_WORDS: usize = RECORDS_PER_PAGE.div_ceil(64);

fn bit_is_set(words: &[u64], slot: usize) -> bool {
    words[slot / 64] >> (slot % 64) & 1 == 1
}

fn set_bit(words: &mut [u64], slot: usize) {
    words[slot / 64] |= 1 << (slot % 64);
}

fn clear_bit(words: &mut [u64], slot: usize) {
    words[slot / 64] &= !(1 << (slot % 64));
}

type FrameKey = (String, usize);

/// One in-memory column of one physical page.
struct Frame {
    values: Vec<i64>,
    dirty: bool,
    pins: u32,
    last_used: u64,
}

/// In-memory state of one physical page: its metadata blob (which carries
/// the occupancy bitmap) and whether the blob needs rewriting.
struct PageState {
    meta: PagePersistable,
    dirty: bool,
}

struct PoolInner {
    frames: HashMap<FrameKey, Frame>,
    pages: HashMap<String, PageState>,
    capacity: usize,
    tick: u64,
}

impl PoolInner {
    /// Fetch the state of a page, loading its metadata blob on first touch.
    /// A path with no in-memory state and no blob on disk has never been
    /// allocated.
    fn page_state_mut(&mut self, page_path: &str) -> Result<&mut PageState, DatabaseError> {
        if !self.pages.contains_key(page_path) {
            let mut meta: PagePersistable = match disk::read_from_path_metadata(page_path) {
                Ok(meta) => meta,
                Err(DatabaseError::Io(error)) if error.kind() == ErrorKind::NotFound => {
                    return Err(DatabaseError::PageNotAllocated(page_path.to_string()));
                }
                Err(error) => return Err(error),
            };
            meta.occupancy.resize(OCCUPANCY_WORDS, 0);
            self.pages
                .insert(page_path.to_string(), PageState { meta, dirty: false });
        }

        Ok(self.pages.get_mut(page_path).unwrap())
    }

    /// Make sure the frame for `(page_path, column)` is resident, evicting
    /// the least recently used unpinned frame if the pool is full.
    fn ensure_frame(&mut self, page_path: &str, column: usize) -> Result<(), DatabaseError> {
        let key = (page_path.to_string(), column);
        if self.frames.contains_key(&key) {
            return Ok(());
        }

        if self.frames.len() >= self.capacity {
            self.evict_one()?;
        }

        let values = disk::read_column_file(page_path, column)?
            .unwrap_or_else(|| vec![0; RECORDS_PER_PAGE]);
        let tick = self.tick;
        self.frames.insert(
            key,
            Frame {
                values,
                dirty: false,
                pins: 0,
                last_used: tick,
            },
        );
        Ok(())
    }

    fn evict_one(&mut self) -> Result<(), DatabaseError> {
        let victim = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.pins == 0)
            .min_by_key(|(_, frame)| frame.last_used)
            .map(|(key, _)| key.clone())
            .ok_or(DatabaseError::PoolExhausted)?;

        let frame = self.frames.remove(&victim).unwrap();
        if frame.dirty {
            debug!("evicting dirty frame {}:{}", victim.0, victim.1);
            disk::write_column_file(&victim.0, victim.1, &frame.values)?;
        }
        Ok(())
    }

    fn touch(&mut self, page_path: &str, column: usize) -> &mut Frame {
        self.tick += 1;
        let frame = self
            .frames
            .get_mut(&(page_path.to_string(), column))
            .unwrap();
        frame.last_used = self.tick;
        frame
    }

    fn pin(&mut self, page_path: &str, column: usize) {
        self.touch(page_path, column).pins += 1;
    }

    fn unpin(&mut self, page_path: &str, column: usize) {
        let frame = self
            .frames
            .get_mut(&(page_path.to_string(), column))
            .unwrap();
        frame.pins -= 1;
    }
}

pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(BP_NUM_FRAMES)
    }

    /// Create a pool with an explicit frame budget. A budget smaller than
    /// the working set stays correct, only slower.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool needs at least one frame");
        BufferPool {
            inner: Mutex::new(PoolInner {
                frames: HashMap::new(),
                pages: HashMap::new(),
                capacity,
                tick: 0,
            }),
        }
    }

    /// Fresh occupancy bitmap for a newly allocated page.
    pub fn empty_occupancy() -> Vec<u64> {
        vec![0; OCCUPANCY_WORDS]
    }

    /// Write one full record (user columns followed by the reserved
    /// columns) into `slot` of the page at `page_path`, marking the slot
    /// occupied. Returns the slot on success.
    pub fn insert_record(
        &self,
        page_path: &str,
        slot: usize,
        values: &[i64],
    ) -> Result<usize, DatabaseError> {
        if slot >= RECORDS_PER_PAGE {
            return Err(DatabaseError::SlotOutOfBounds { slot });
        }

        let mut inner = self.inner.lock().unwrap();

        let state = inner.page_state_mut(page_path)?;
        if bit_is_set(&state.meta.occupancy, slot) {
            return Err(DatabaseError::SlotOccupied {
                path: page_path.to_string(),
                slot,
            });
        }

        // Pin every column frame up front so writing one column cannot
        // evict another column written moments earlier.
        for column in 0..values.len() {
            if let Err(error) = inner.ensure_frame(page_path, column) {
                for pinned in 0..column {
                    inner.unpin(page_path, pinned);
                }
                return Err(error);
            }
            inner.pin(page_path, column);
        }

        for (column, value) in values.iter().enumerate() {
            let frame = inner.touch(page_path, column);
            frame.values[slot] = *value;
            frame.dirty = true;
        }

        for column in 0..values.len() {
            inner.unpin(page_path, column);
        }

        let state = inner.page_state_mut(page_path)?;
        set_bit(&mut state.meta.occupancy, slot);
        state.dirty = true;

        Ok(slot)
    }

    /// Read the value of one column at one slot.
    pub fn get_entry(
        &self,
        page_path: &str,
        column: usize,
        slot: usize,
    ) -> Result<i64, DatabaseError> {
        if slot >= RECORDS_PER_PAGE {
            return Err(DatabaseError::SlotOutOfBounds { slot });
        }

        let mut inner = self.inner.lock().unwrap();
        inner.page_state_mut(page_path)?;
        inner.ensure_frame(page_path, column)?;
        Ok(inner.touch(page_path, column).values[slot])
    }

    /// Overwrite the value of one column at one slot, marking the frame dirty.
    pub fn set_entry(
        &self,
        page_path: &str,
        column: usize,
        slot: usize,
        value: i64,
    ) -> Result<(), DatabaseError> {
        if slot >= RECORDS_PER_PAGE {
            return Err(DatabaseError::SlotOutOfBounds { slot });
        }

        let mut inner = self.inner.lock().unwrap();
        inner.page_state_mut(page_path)?;
        inner.ensure_frame(page_path, column)?;
        let frame = inner.touch(page_path, column);
        frame.values[slot] = value;
        frame.dirty = true;
        Ok(())
    }

    pub fn is_slot_occupied(&self, page_path: &str, slot: usize) -> Result<bool, DatabaseError> {
        if slot >= RECORDS_PER_PAGE {
            return Err(DatabaseError::SlotOutOfBounds { slot });
        }

        let mut inner = self.inner.lock().unwrap();
        let state = inner.page_state_mut(page_path)?;
        Ok(bit_is_set(&state.meta.occupancy, slot))
    }

    /// Clear the occupancy bit of a slot. The record's bytes stay in place;
    /// readers treat the slot as empty from now on.
    pub fn clear_slot(&self, page_path: &str, slot: usize) -> Result<(), DatabaseError> {
        if slot >= RECORDS_PER_PAGE {
            return Err(DatabaseError::SlotOutOfBounds { slot });
        }

        let mut inner = self.inner.lock().unwrap();
        let state = inner.page_state_mut(page_path)?;
        clear_bit(&mut state.meta.occupancy, slot);
        state.dirty = true;
        Ok(())
    }

    /// Flush every dirty frame and every dirty page blob through the disk
    /// module, then clear the dirty flags. This is the commit point.
    pub fn commit_writes_to_disk(&self) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();

        for ((page_path, column), frame) in inner.frames.iter_mut() {
            if frame.dirty {
                disk::write_column_file(page_path, *column, &frame.values)?;
                frame.dirty = false;
            }
        }

        for (page_path, state) in inner.pages.iter_mut() {
            if state.dirty {
                disk::write_to_path_metadata(page_path, &state.meta)?;
                state.dirty = false;
            }
        }

        Ok(())
    }

    /// Drop every frame and page state whose path starts with `path_prefix`
    /// without flushing. Used when a table or database is dropped.
    pub fn discard_pages_under(&self, path_prefix: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .frames
            .retain(|(page_path, _), _| !page_path.starts_with(path_prefix));
        inner
            .pages
            .retain(|page_path, _| !page_path.starts_with(path_prefix));
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistables::PagePersistable;

    fn allocate_page(dir: &tempfile::TempDir, name: &str) -> String {
        let page_path = dir.path().join(name).to_string_lossy().into_owned();
        disk::create_path_directory(&page_path).unwrap();
        disk::write_to_path_metadata(
            &page_path,
            &PagePersistable {
                page_path: page_path.clone(),
                page_index: 0,
                occupancy: BufferPool::empty_occupancy(),
            },
        )
        .unwrap();
        page_path
    }

    #[test]
    fn insert_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let page = allocate_page(&dir, "BP0");
        let pool = BufferPool::with_capacity(16);

        pool.insert_record(&page, 0, &[1, 2, 3]).unwrap();
        assert_eq!(pool.get_entry(&page, 0, 0).unwrap(), 1);
        assert_eq!(pool.get_entry(&page, 2, 0).unwrap(), 3);
        assert!(pool.is_slot_occupied(&page, 0).unwrap());
        assert!(!pool.is_slot_occupied(&page, 1).unwrap());
    }

    #[test]
    fn occupied_slot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let page = allocate_page(&dir, "BP0");
        let pool = BufferPool::with_capacity(16);

        pool.insert_record(&page, 3, &[7]).unwrap();
        let error = pool.insert_record(&page, 3, &[8]).unwrap_err();
        assert!(matches!(error, DatabaseError::SlotOccupied { slot: 3, .. }));
    }

    #[test]
    fn unallocated_page_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("BP9").to_string_lossy().into_owned();
        let pool = BufferPool::with_capacity(16);

        let error = pool.get_entry(&missing, 0, 0).unwrap_err();
        assert!(matches!(error, DatabaseError::PageNotAllocated(_)));
    }

    #[test]
    fn eviction_keeps_results_correct() {
        let dir = tempfile::tempdir().unwrap();
        // Two pages of two columns each against a two frame pool, so
        // every access cycles frames through eviction.
        let first = allocate_page(&dir, "BP0");
        let second = allocate_page(&dir, "BP1");
        let pool = BufferPool::with_capacity(2);

        for slot in 0..8 {
            pool.insert_record(&first, slot, &[slot as i64, 100 + slot as i64])
                .unwrap();
            pool.insert_record(&second, slot, &[-(slot as i64), 200 + slot as i64])
                .unwrap();
        }

        for slot in 0..8 {
            assert_eq!(pool.get_entry(&first, 0, slot).unwrap(), slot as i64);
            assert_eq!(pool.get_entry(&second, 1, slot).unwrap(), 200 + slot as i64);
        }
    }

    #[test]
    fn commit_persists_frames_and_occupancy() {
        let dir = tempfile::tempdir().unwrap();
        let page = allocate_page(&dir, "BP0");

        {
            let pool = BufferPool::with_capacity(16);
            pool.insert_record(&page, 0, &[42, 43]).unwrap();
            pool.commit_writes_to_disk().unwrap();
        }

        // A fresh pool must observe the committed state from disk.
        let pool = BufferPool::with_capacity(16);
        assert_eq!(pool.get_entry(&page, 0, 0).unwrap(), 42);
        assert_eq!(pool.get_entry(&page, 1, 0).unwrap(), 43);
        assert!(pool.is_slot_occupied(&page, 0).unwrap());
    }
}
