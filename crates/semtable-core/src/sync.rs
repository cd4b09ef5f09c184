//! The empty/full/mutex semaphore triplet

use crate::names::ResourceNames;
use crate::semaphore::NamedSemaphore;
use crate::table::TABLE_SIZE;
use crate::Result;

/// Counting semaphores that gate access to one shared table
#[derive(Debug)]
pub struct SyncTriplet {
    /// Free slots, starts at `TABLE_SIZE`
    pub empty: NamedSemaphore,
    /// Items ready to read, starts at 0
    pub full: NamedSemaphore,
    /// Binary lock around the table, starts at 1
    pub mutex: NamedSemaphore,
}

/// Current permit counts of a triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permits {
    pub empty: u32,
    pub full: u32,
    pub mutex: u32,
}

impl SyncTriplet {
    pub const EMPTY_INITIAL: u32 = TABLE_SIZE as u32;
    pub const FULL_INITIAL: u32 = 0;
    pub const MUTEX_INITIAL: u32 = 1;

    /// Create all three; any existing name is an error.
    ///
    /// Semaphores created before a failure are unlinked again.
    pub fn create(names: &ResourceNames) -> Result<Self> {
        let empty = NamedSemaphore::create(&names.empty, Self::EMPTY_INITIAL)?;
        let full = match NamedSemaphore::create(&names.full, Self::FULL_INITIAL) {
            Ok(full) => full,
            Err(e) => {
                let _ = NamedSemaphore::unlink(&names.empty);
                return Err(e);
            }
        };
        let mutex = match NamedSemaphore::create(&names.mutex, Self::MUTEX_INITIAL) {
            Ok(mutex) => mutex,
            Err(e) => {
                let _ = NamedSemaphore::unlink(&names.empty);
                let _ = NamedSemaphore::unlink(&names.full);
                return Err(e);
            }
        };
        Ok(Self { empty, full, mutex })
    }

    /// Attach to all three
    pub fn open(names: &ResourceNames) -> Result<Self> {
        Ok(Self {
            empty: NamedSemaphore::open(&names.empty)?,
            full: NamedSemaphore::open(&names.full)?,
            mutex: NamedSemaphore::open(&names.mutex)?,
        })
    }

    /// Create each missing semaphore with its initial value, attach to the rest
    pub fn open_or_create(names: &ResourceNames) -> Result<Self> {
        Ok(Self {
            empty: NamedSemaphore::open_or_create(&names.empty, Self::EMPTY_INITIAL)?,
            full: NamedSemaphore::open_or_create(&names.full, Self::FULL_INITIAL)?,
            mutex: NamedSemaphore::open_or_create(&names.mutex, Self::MUTEX_INITIAL)?,
        })
    }

    /// True if every semaphore was created by this handle
    pub fn all_created(&self) -> bool {
        self.empty.created() && self.full.created() && self.mutex.created()
    }

    /// True if none of the semaphores was created by this handle
    pub fn none_created(&self) -> bool {
        !self.empty.created() && !self.full.created() && !self.mutex.created()
    }

    pub fn permits(&self) -> Result<Permits> {
        Ok(Permits {
            empty: self.empty.value()?,
            full: self.full.value()?,
            mutex: self.mutex.value()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unique_name;

    fn unlink_all(names: &ResourceNames) {
        for name in [&names.empty, &names.full, &names.mutex] {
            let _ = NamedSemaphore::unlink(name);
        }
    }

    #[test]
    fn test_initial_values() {
        let names = ResourceNames::with_prefix(&unique_name("sync"));
        let sync = SyncTriplet::create(&names).unwrap();
        assert!(sync.all_created());
        assert_eq!(
            sync.permits().unwrap(),
            Permits {
                empty: TABLE_SIZE as u32,
                full: 0,
                mutex: 1
            }
        );
        unlink_all(&names);
    }

    #[test]
    fn test_open_or_create_attaches_without_reset() {
        let names = ResourceNames::with_prefix(&unique_name("sync"));
        let first = SyncTriplet::open_or_create(&names).unwrap();
        first.empty.wait().unwrap();
        first.full.post().unwrap();

        let second = SyncTriplet::open_or_create(&names).unwrap();
        assert!(second.none_created());
        let permits = second.permits().unwrap();
        assert_eq!(permits.empty, TABLE_SIZE as u32 - 1);
        assert_eq!(permits.full, 1);
        unlink_all(&names);
    }

    #[test]
    fn test_create_rolls_back_on_conflict() {
        let names = ResourceNames::with_prefix(&unique_name("sync"));
        let _taken = NamedSemaphore::create(&names.mutex, 1).unwrap();
        assert!(SyncTriplet::create(&names).is_err());
        assert!(!NamedSemaphore::unlink(&names.empty).unwrap());
        assert!(!NamedSemaphore::unlink(&names.full).unwrap());
        unlink_all(&names);
    }

    #[test]
    fn test_open_requires_all() {
        let names = ResourceNames::with_prefix(&unique_name("sync"));
        let _empty = NamedSemaphore::create(&names.empty, 2).unwrap();
        assert!(SyncTriplet::open(&names).is_err());
        unlink_all(&names);
    }
}
