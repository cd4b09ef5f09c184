//! semtable - Bounded producer/consumer table in named shared memory
//!
//! One producer and one consumer share a fixed-size table guarded by three
//! named POSIX semaphores: `empty` counts free slots, `full` counts items
//! and `mutex` serialises access to the table itself.

pub mod bounded;
pub mod cancel;
pub mod config;
pub mod consumer;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod names;
pub mod producer;
pub mod region;
pub mod semaphore;
pub mod shm;
pub mod sync;
pub mod table;

pub use bounded::{BoundedTable, Snapshot};
pub use cancel::CancellationToken;
pub use config::LoopConfig;
pub use consumer::Consumer;
pub use error::{Error, Result};
pub use guard::CriticalSection;
pub use lifecycle::{teardown, Outcome, ResourceKind, TeardownReport};
pub use names::ResourceNames;
pub use producer::{Producer, RunSummary};
pub use semaphore::NamedSemaphore;
pub use sync::{Permits, SyncTriplet};
pub use table::{Item, SharedTable, TABLE_SIZE};

/// Unique POSIX IPC name for tests running in parallel
#[cfg(test)]
pub(crate) fn unique_name(tag: &str) -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static NEXT: AtomicU32 = AtomicU32::new(0);
    format!(
        "/semtable_test_{}_{}_{}",
        tag,
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}
