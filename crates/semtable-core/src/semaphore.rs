//! POSIX named semaphore wrapper

use std::ffi::CString;
use std::time::Duration;

use nix::errno::Errno;
use nix::libc::{self, c_int, c_uint, sem_t};
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};

use crate::cancel::CancellationToken;
use crate::names::validate_name;
use crate::{Error, Result};

/// Permission bits for newly created semaphores (subject to umask)
const SEM_MODE: libc::mode_t = 0o666;

/// Longest single timed wait; keeps the absolute deadline inside `i64` nanoseconds.
const MAX_TIMEOUT: Duration = Duration::from_secs(u32::MAX as u64);

/// Handle to a counting semaphore that unrelated processes can open by name.
///
/// Dropping the handle closes it. The semaphore itself survives until
/// [`NamedSemaphore::unlink`] is called.
pub struct NamedSemaphore {
    sem: *mut sem_t,
    name: String,
    created: bool,
}

// Safety: the sem_* functions are thread-safe and the pointer stays valid
// until sem_close in Drop.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Create a new semaphore; fails with `EEXIST` if the name is taken
    pub fn create(name: &str, value: u32) -> Result<Self> {
        validate_name(name)?;
        let sem = raw_open(name, libc::O_CREAT | libc::O_EXCL, value)
            .map_err(|e| Error::semaphore(name, "sem_open", e))?;
        log::debug!("created semaphore {} with value {}", name, value);
        Ok(Self {
            sem,
            name: name.to_string(),
            created: true,
        })
    }

    /// Open an existing semaphore without touching its value
    pub fn open(name: &str) -> Result<Self> {
        validate_name(name)?;
        let sem = raw_open(name, 0, 0).map_err(|e| Error::semaphore(name, "sem_open", e))?;
        log::debug!("attached to semaphore {}", name);
        Ok(Self {
            sem,
            name: name.to_string(),
            created: false,
        })
    }

    /// Create with `value` if absent, otherwise attach with the current value
    pub fn open_or_create(name: &str, value: u32) -> Result<Self> {
        // A concurrent unlink between the two calls makes open fail with
        // ENOENT; try creating again in that case.
        let mut last = Errno::ENOENT;
        for _ in 0..3 {
            match Self::create(name, value) {
                Err(Error::Semaphore {
                    source: Errno::EEXIST,
                    ..
                }) => {}
                other => return other,
            }
            match Self::open(name) {
                Err(Error::Semaphore {
                    source: Errno::ENOENT,
                    ..
                }) => last = Errno::ENOENT,
                other => return other,
            }
        }
        Err(Error::semaphore(name, "sem_open", last))
    }

    /// Remove the name from the system. Returns `false` if it did not exist.
    pub fn unlink(name: &str) -> Result<bool> {
        validate_name(name)?;
        let c_name = c_name(name).map_err(|e| Error::semaphore(name, "sem_unlink", e))?;
        match Errno::result(unsafe { libc::sem_unlink(c_name.as_ptr()) }) {
            Ok(_) => Ok(true),
            Err(Errno::ENOENT) => Ok(false),
            Err(e) => Err(Error::semaphore(name, "sem_unlink", e)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle created the semaphore
    pub fn created(&self) -> bool {
        self.created
    }

    /// Block until a permit is available and take it
    pub fn wait(&self) -> Result<()> {
        loop {
            match Errno::result(unsafe { libc::sem_wait(self.sem) }) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Error::semaphore(&self.name, "sem_wait", e)),
            }
        }
    }

    /// Take a permit if one is available right now
    pub fn try_wait(&self) -> Result<bool> {
        loop {
            match Errno::result(unsafe { libc::sem_trywait(self.sem) }) {
                Ok(_) => return Ok(true),
                Err(Errno::EAGAIN) => return Ok(false),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Error::semaphore(&self.name, "sem_trywait", e)),
            }
        }
    }

    /// Wait at most `timeout` for a permit. Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME)
            .map_err(|e| Error::semaphore(&self.name, "clock_gettime", e))?;
        let deadline = now + TimeSpec::from_duration(timeout.min(MAX_TIMEOUT));
        let deadline: &libc::timespec = deadline.as_ref();
        loop {
            match Errno::result(unsafe { libc::sem_timedwait(self.sem, deadline) }) {
                Ok(_) => return Ok(true),
                Err(Errno::ETIMEDOUT) => return Ok(false),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Error::semaphore(&self.name, "sem_timedwait", e)),
            }
        }
    }

    /// Block until a permit is taken or `cancel` fires.
    ///
    /// The token is polled every `poll` while blocked.
    pub fn wait_cancellable(&self, cancel: &CancellationToken, poll: Duration) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.wait_timeout(poll)? {
                return Ok(());
            }
        }
    }

    /// Release one permit
    pub fn post(&self) -> Result<()> {
        Errno::result(unsafe { libc::sem_post(self.sem) })
            .map(drop)
            .map_err(|e| Error::semaphore(&self.name, "sem_post", e))
    }

    /// Current number of permits
    pub fn value(&self) -> Result<u32> {
        let mut value: c_int = 0;
        Errno::result(unsafe { libc::sem_getvalue(self.sem, &mut value) })
            .map_err(|e| Error::semaphore(&self.name, "sem_getvalue", e))?;
        // Linux reports 0 rather than a negative waiter count.
        Ok(value.max(0) as u32)
    }
}

impl std::fmt::Debug for NamedSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedSemaphore")
            .field("name", &self.name)
            .field("created", &self.created)
            .finish()
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        if let Err(e) = Errno::result(unsafe { libc::sem_close(self.sem) }) {
            log::warn!("sem_close {} failed: {}", self.name, e);
        }
    }
}

fn c_name(name: &str) -> std::result::Result<CString, Errno> {
    CString::new(name).map_err(|_| Errno::EINVAL)
}

fn raw_open(name: &str, oflag: c_int, value: u32) -> std::result::Result<*mut sem_t, Errno> {
    let c_name = c_name(name)?;
    let sem = unsafe {
        libc::sem_open(
            c_name.as_ptr(),
            oflag,
            SEM_MODE as c_uint,
            value as c_uint,
        )
    };
    if sem == libc::SEM_FAILED {
        Err(Errno::last())
    } else {
        Ok(sem)
    }
}
