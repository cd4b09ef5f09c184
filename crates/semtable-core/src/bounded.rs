//! Bounded table handle

use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::guard::CriticalSection;
use crate::lifecycle::{teardown, TeardownReport};
use crate::names::ResourceNames;
use crate::region::TableRegion;
use crate::semaphore::NamedSemaphore;
use crate::shm::SharedMemory;
use crate::sync::{Permits, SyncTriplet};
use crate::table::{Item, TABLE_SIZE};
use crate::{Error, Result};

/// How a counting permit is obtained
#[derive(Clone, Copy)]
enum Wait<'a> {
    /// Block, polling `cancel` every `poll`
    Until(&'a CancellationToken, Duration),
    /// Block for at most `limit` in total, counted from `started`
    Timeout { limit: Duration, started: Instant },
    /// Do not block
    Try,
}

impl Wait<'_> {
    fn timeout(limit: Duration) -> Self {
        Wait::Timeout {
            limit,
            started: Instant::now(),
        }
    }
}

/// Point-in-time view of the table and its counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Valid items, bottom first
    pub items: Vec<Item>,
    pub empty: u32,
    pub full: u32,
}

/// Handle to one shared table and its semaphores
///
/// Owns the mapping and the semaphore handles. Dropping it releases both
/// but leaves the named resources in place for the other participant.
#[derive(Debug)]
pub struct BoundedTable {
    names: ResourceNames,
    region: TableRegion,
    sync: SyncTriplet,
}

// Safety: the table is only dereferenced through a CriticalSection, which
// requires the mutex permit. The semaphores are thread-safe.
unsafe impl Send for BoundedTable {}
unsafe impl Sync for BoundedTable {}

impl BoundedTable {
    /// Create every resource; fails if any of them exists
    pub fn create(names: &ResourceNames) -> Result<Self> {
        names.validate()?;
        let region = TableRegion::create(&names.shm)?;
        let sync = match SyncTriplet::create(names) {
            Ok(sync) => sync,
            Err(e) => {
                drop(region);
                let _ = SharedMemory::unlink(&names.shm);
                return Err(e);
            }
        };
        log::info!("created table {}", names.shm);
        Ok(Self::from_parts(names, region, sync))
    }

    /// Attach to resources another participant created
    pub fn open(names: &ResourceNames) -> Result<Self> {
        names.validate()?;
        let region = TableRegion::open(&names.shm)?;
        let sync = SyncTriplet::open(names)?;
        log::info!("attached to table {}", names.shm);
        Ok(Self::from_parts(names, region, sync))
    }

    /// Create what is missing and attach to the rest
    pub fn open_or_create(names: &ResourceNames) -> Result<Self> {
        names.validate()?;
        let region = TableRegion::open_or_create(&names.shm)?;
        let sync = SyncTriplet::open_or_create(names)?;
        let consistent = if region.created() {
            sync.all_created()
        } else {
            sync.none_created()
        };
        if !consistent {
            log::warn!(
                "table {} was partly left over from an earlier run; counts may not match, run cleanup",
                names.shm
            );
        }
        log::info!(
            "{} table {}",
            if region.created() { "created" } else { "attached to" },
            names.shm
        );
        Ok(Self::from_parts(names, region, sync))
    }

    fn from_parts(names: &ResourceNames, region: TableRegion, sync: SyncTriplet) -> Self {
        Self {
            names: names.clone(),
            region,
            sync,
        }
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    /// Whether this handle created the shared segment
    pub fn is_creator(&self) -> bool {
        self.region.created()
    }

    pub fn capacity(&self) -> usize {
        TABLE_SIZE
    }

    pub fn semaphores(&self) -> &SyncTriplet {
        &self.sync
    }

    pub fn permits(&self) -> Result<Permits> {
        self.sync.permits()
    }

    /// Enter the critical section, blocking until `mutex` is free
    pub fn lock(&self) -> Result<CriticalSection<'_>> {
        self.sync.mutex.wait()?;
        // Safety: permit just taken; region outlives the guard.
        Ok(unsafe { CriticalSection::new(&self.sync.mutex, self.region.table_ptr()) })
    }

    /// Read the table contents and counters under the lock
    pub fn snapshot(&self) -> Result<Snapshot> {
        let cs = self.lock()?;
        let items = cs.as_slice().to_vec();
        let empty = self.sync.empty.value()?;
        let full = self.sync.full.value()?;
        cs.unlock()?;
        Ok(Snapshot { items, empty, full })
    }

    /// Put `item` on the table, blocking until a slot frees or `cancel` fires
    pub fn produce(&self, item: Item, cancel: &CancellationToken, poll: Duration) -> Result<()> {
        self.produce_with(item, Wait::Until(cancel, poll)).map(drop)
    }

    /// Like [`produce`](Self::produce) but gives up with [`Error::Timeout`]
    pub fn produce_timeout(&self, item: Item, timeout: Duration) -> Result<()> {
        self.produce_with(item, Wait::timeout(timeout)).map(drop)
    }

    /// Put `item` on the table only if a slot is free right now
    pub fn try_produce(&self, item: Item) -> Result<bool> {
        self.produce_with(item, Wait::Try)
    }

    /// Take the top item, blocking until one arrives or `cancel` fires
    pub fn consume(&self, cancel: &CancellationToken, poll: Duration) -> Result<Item> {
        self.consume_with(Wait::Until(cancel, poll))?
            .ok_or(Error::Cancelled)
    }

    /// Like [`consume`](Self::consume) but gives up with [`Error::Timeout`]
    pub fn consume_timeout(&self, timeout: Duration) -> Result<Item> {
        self.consume_with(Wait::timeout(timeout))?
            .ok_or(Error::Timeout(timeout))
    }

    /// Take the top item only if one is available right now
    pub fn try_consume(&self) -> Result<Option<Item>> {
        self.consume_with(Wait::Try)
    }

    fn produce_with(&self, item: Item, wait: Wait<'_>) -> Result<bool> {
        if !self.acquire(&self.sync.empty, wait)? {
            return Ok(false);
        }
        let mut cs = self.enter(&self.sync.empty, wait)?;
        if !cs.try_push(item) {
            let len = cs.len();
            cs.unlock()?;
            log::error!(
                "slot permit held but table {} is full ({} items), not signalling {}",
                self.names.shm,
                len,
                self.sync.full.name()
            );
            return Err(Error::InvariantViolation(format!(
                "slot permit held but table holds {} of {} items",
                len, TABLE_SIZE
            )));
        }
        cs.unlock()?;
        self.sync.full.post()?;
        Ok(true)
    }

    fn consume_with(&self, wait: Wait<'_>) -> Result<Option<Item>> {
        if !self.acquire(&self.sync.full, wait)? {
            return Ok(None);
        }
        let mut cs = self.enter(&self.sync.full, wait)?;
        let item = match cs.try_pop() {
            Some(item) => item,
            None => {
                cs.unlock()?;
                log::error!(
                    "item permit held but table {} is empty, not signalling {}",
                    self.names.shm,
                    self.sync.empty.name()
                );
                return Err(Error::InvariantViolation(
                    "item permit held but table is empty".to_string(),
                ));
            }
        };
        cs.unlock()?;
        self.sync.empty.post()?;
        Ok(Some(item))
    }

    /// Take one counting permit. `Ok(false)` only for [`Wait::Try`].
    fn acquire(&self, sem: &NamedSemaphore, wait: Wait<'_>) -> Result<bool> {
        match wait {
            Wait::Until(cancel, poll) => sem.wait_cancellable(cancel, poll).map(|()| true),
            Wait::Timeout { limit, started } => {
                if sem.wait_timeout(limit.saturating_sub(started.elapsed()))? {
                    Ok(true)
                } else {
                    Err(Error::Timeout(limit))
                }
            }
            Wait::Try => sem.try_wait(),
        }
    }

    /// Take the mutex while holding a permit of `held`.
    ///
    /// If the lock cannot be taken the permit is posted back so the
    /// counters keep matching the table.
    fn enter(&self, held: &NamedSemaphore, wait: Wait<'_>) -> Result<CriticalSection<'_>> {
        let locked = match wait {
            Wait::Until(cancel, poll) => self.sync.mutex.wait_cancellable(cancel, poll),
            Wait::Timeout { limit, started } => {
                match self.sync.mutex.wait_timeout(limit.saturating_sub(started.elapsed())) {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(Error::Timeout(limit)),
                    Err(e) => Err(e),
                }
            }
            // The lock is only held around a push or pop.
            Wait::Try => self.sync.mutex.wait(),
        };
        if let Err(e) = locked {
            held.post()?;
            return Err(e);
        }
        // Safety: mutex permit just taken; region outlives the guard.
        Ok(unsafe { CriticalSection::new(&self.sync.mutex, self.region.table_ptr()) })
    }

    /// Close this handle and remove the named resources
    pub fn destroy(self) -> Result<TeardownReport> {
        let names = self.names.clone();
        drop(self);
        teardown(&names)
    }
}
