//! Process-wide resource names

use crate::{Error, Result};

/// Default shared memory segment name
pub const SHM_NAME: &str = "/my_shared_memory";
/// Default name of the free-slot semaphore
pub const SEM_EMPTY: &str = "/empty";
/// Default name of the available-item semaphore
pub const SEM_FULL: &str = "/full";
/// Default name of the exclusion semaphore
pub const SEM_MUTEX: &str = "/mutex";

/// Names both participants rendezvous on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub shm: String,
    pub empty: String,
    pub full: String,
    pub mutex: String,
}

impl ResourceNames {
    /// Names namespaced by `prefix`, e.g. `/demo_shm`, `/demo_empty`
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_start_matches('/');
        Self {
            shm: format!("/{}_shm", prefix),
            empty: format!("/{}_empty", prefix),
            full: format!("/{}_full", prefix),
            mutex: format!("/{}_mutex", prefix),
        }
    }

    /// Check every name is a valid POSIX IPC name
    pub fn validate(&self) -> Result<()> {
        for name in self.iter() {
            validate_name(name)?;
        }
        Ok(())
    }

    /// Segment first, then `empty`, `full`, `mutex`
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [
            self.shm.as_str(),
            self.empty.as_str(),
            self.full.as_str(),
            self.mutex.as_str(),
        ]
        .into_iter()
    }
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            shm: SHM_NAME.to_string(),
            empty: SEM_EMPTY.to_string(),
            full: SEM_FULL.to_string(),
            mutex: SEM_MUTEX.to_string(),
        }
    }
}

/// POSIX IPC names are `/` followed by 1..=250 non-slash bytes.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let rest = match name.strip_prefix('/') {
        Some(rest) => rest,
        None => return Err(Error::InvalidName(name.to_string())),
    };
    // sem_open prepends "sem." to the name, so leave room under NAME_MAX.
    if rest.is_empty() || rest.len() > 250 || rest.contains('/') || rest.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
