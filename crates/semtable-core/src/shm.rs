//! POSIX shared memory wrapper

use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::mman::shm_unlink;
use shared_memory::{Shmem, ShmemConf, ShmemError};

use crate::names::validate_name;
use crate::{Error, Result};

/// Attempts made to attach to a segment another process is still sizing
const ATTACH_RETRIES: u32 = 20;
const ATTACH_BACKOFF: Duration = Duration::from_millis(50);

/// Shared memory region wrapper
///
/// The mapping is released on drop; the named segment is not. Use
/// [`SharedMemory::unlink`] to remove it.
pub struct SharedMemory {
    inner: Shmem,
    name: String,
    size: usize,
    created: bool,
}

impl SharedMemory {
    /// Create a new shared memory region, failing if the name exists
    pub fn create(name: &str, size: usize) -> Result<Self> {
        validate_name(name)?;
        let shmem = Self::create_raw(name, size).map_err(|e| shm_error(name, e))?;
        Ok(Self::from_shmem(shmem, name, size, true))
    }

    /// Open an existing shared memory region
    pub fn open(name: &str) -> Result<Self> {
        validate_name(name)?;
        let shmem = ShmemConf::new()
            .os_id(name)
            .open()
            .map_err(|e| shm_error(name, e))?;
        let size = shmem.len();
        Ok(Self::from_shmem(shmem, name, size, false))
    }

    /// Create the region, or attach to it if another participant already did.
    ///
    /// A freshly created region is zero-filled; an attached one is left as is.
    /// Attaching fails if the existing region is smaller than `size`.
    pub fn open_or_create(name: &str, size: usize) -> Result<Self> {
        validate_name(name)?;
        match Self::create_raw(name, size) {
            Ok(shmem) => return Ok(Self::from_shmem(shmem, name, size, true)),
            Err(ShmemError::MappingIdExists) => {}
            Err(e) => return Err(shm_error(name, e)),
        }

        // The creator may not have sized the segment yet.
        let mut last_err = None;
        for attempt in 0..ATTACH_RETRIES {
            if attempt > 0 {
                thread::sleep(ATTACH_BACKOFF);
            }
            match Self::open(name) {
                Ok(shm) if shm.size() >= size => return Ok(shm),
                Ok(shm) => {
                    last_err = Some(Error::SegmentTooSmall {
                        name: name.to_string(),
                        expected: size,
                        actual: shm.size(),
                    })
                }
                Err(e) => last_err = Some(e),
            }
            log::debug!("attach to {} not ready (attempt {})", name, attempt + 1);
        }
        Err(last_err.unwrap_or_else(|| Error::SharedMemory(format!("{}: attach failed", name))))
    }

    /// Remove the name from the system. Returns `false` if it did not exist.
    pub fn unlink(name: &str) -> Result<bool> {
        validate_name(name)?;
        match shm_unlink(name) {
            Ok(()) => Ok(true),
            Err(Errno::ENOENT) => Ok(false),
            Err(e) => Err(Error::SharedMemory(format!("shm_unlink {}: {}", name, e))),
        }
    }

    fn create_raw(name: &str, size: usize) -> std::result::Result<Shmem, ShmemError> {
        let mut shmem = ShmemConf::new().size(size).os_id(name).create()?;
        // Ownership would unlink the segment when this handle drops.
        shmem.set_owner(false);
        Ok(shmem)
    }

    fn from_shmem(inner: Shmem, name: &str, size: usize, created: bool) -> Self {
        log::debug!(
            "{} shared memory {} ({} bytes)",
            if created { "created" } else { "attached to" },
            name,
            size
        );
        Self {
            inner,
            name: name.to_string(),
            size,
            created,
        }
    }

    /// Get the name of the shared memory region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of the shared memory region
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this handle created the region
    pub fn created(&self) -> bool {
        self.created
    }

    /// Get a raw pointer to the shared memory
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Get a mutable raw pointer to the shared memory
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_ptr()
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("created", &self.created)
            .finish()
    }
}

fn shm_error(name: &str, e: ShmemError) -> Error {
    Error::SharedMemory(format!("{}: {}", name, e))
}
