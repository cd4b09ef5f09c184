//! RAII critical section guard

use std::ops::{Deref, DerefMut};

use crate::semaphore::NamedSemaphore;
use crate::table::SharedTable;
use crate::Result;

/// Exclusive access to the shared table while the `mutex` permit is held.
///
/// The permit is returned on drop. Call [`CriticalSection::unlock`] to
/// observe a failing `sem_post`.
pub struct CriticalSection<'a> {
    mutex: &'a NamedSemaphore,
    table: *mut SharedTable,
    /// Whether this guard still owns the mutex permit
    held: bool,
}

impl<'a> CriticalSection<'a> {
    /// # Safety
    ///
    /// The caller must have just taken the permit of `mutex`, and `table`
    /// must point into a live mapping guarded by that same semaphore.
    pub(crate) unsafe fn new(mutex: &'a NamedSemaphore, table: *mut SharedTable) -> Self {
        Self {
            mutex,
            table,
            held: true,
        }
    }

    /// Leave the critical section
    pub fn unlock(mut self) -> Result<()> {
        self.held = false;
        self.mutex.post()
    }
}

impl Deref for CriticalSection<'_> {
    type Target = SharedTable;

    fn deref(&self) -> &SharedTable {
        // Safety: the mutex permit grants exclusive access across processes.
        unsafe { &*self.table }
    }
}

impl DerefMut for CriticalSection<'_> {
    fn deref_mut(&mut self) -> &mut SharedTable {
        unsafe { &mut *self.table }
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.mutex.post() {
                log::error!("failed to leave critical section: {}", e);
            }
        }
    }
}
