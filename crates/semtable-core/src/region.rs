//! Shared table region management

use crate::shm::SharedMemory;
use crate::table::SharedTable;
use crate::{Error, Result};

/// Mapping of the shared segment that holds one [`SharedTable`]
#[derive(Debug)]
pub struct TableRegion {
    shm: SharedMemory,
}

impl TableRegion {
    /// Create a new region; fails if the segment already exists
    pub fn create(name: &str) -> Result<Self> {
        Self::from_shm(SharedMemory::create(name, SharedTable::SIZE)?)
    }

    /// Attach to an existing region
    pub fn open(name: &str) -> Result<Self> {
        Self::from_shm(SharedMemory::open(name)?)
    }

    /// Create the region or attach to an existing one
    pub fn open_or_create(name: &str) -> Result<Self> {
        Self::from_shm(SharedMemory::open_or_create(name, SharedTable::SIZE)?)
    }

    // A new segment is zero-filled by ftruncate, and all-zero bytes are an
    // empty table, so nothing is written here. Writing would race with an
    // attacher that already holds the mutex.
    fn from_shm(shm: SharedMemory) -> Result<Self> {
        if shm.size() < SharedTable::SIZE {
            return Err(Error::SegmentTooSmall {
                name: shm.name().to_string(),
                expected: SharedTable::SIZE,
                actual: shm.size(),
            });
        }
        if shm.as_ptr().align_offset(std::mem::align_of::<SharedTable>()) != 0 {
            return Err(Error::SharedMemory(format!(
                "{}: mapping is not aligned for the table",
                shm.name()
            )));
        }
        Ok(Self { shm })
    }

    pub fn name(&self) -> &str {
        self.shm.name()
    }

    /// Whether this handle created the segment
    pub fn created(&self) -> bool {
        self.shm.created()
    }

    /// Pointer to the table; dereference only inside a critical section
    pub(crate) fn table_ptr(&self) -> *mut SharedTable {
        self.shm.as_mut_ptr() as *mut SharedTable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unique_name;

    #[test]
    fn test_new_region_is_empty_table() {
        let name = unique_name("region");
        let region = TableRegion::create(&name).unwrap();
        assert!(region.created());
        let table = unsafe { &*region.table_ptr() };
        assert_eq!(*table, SharedTable::new());
        drop(region);
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_attach_sees_existing_items() {
        let name = unique_name("region");
        let first = TableRegion::open_or_create(&name).unwrap();
        unsafe { (*first.table_ptr()).try_push(11) };

        let second = TableRegion::open_or_create(&name).unwrap();
        assert!(!second.created());
        assert_eq!(unsafe { (*second.table_ptr()).as_slice() }, &[11]);

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_rejects_small_segment() {
        let name = unique_name("region");
        let _shm = SharedMemory::create(&name, 4).unwrap();
        let err = TableRegion::open(&name).unwrap_err();
        assert!(matches!(err, Error::SegmentTooSmall { actual: 4, .. }));
        SharedMemory::unlink(&name).unwrap();
    }
}
