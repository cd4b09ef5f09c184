//! Error types for semtable

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    #[error("shared memory {name} too small: expected {expected} bytes, got {actual}")]
    SegmentTooSmall {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("semaphore {name}: {op} failed: {source}")]
    Semaphore {
        name: String,
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("invalid resource name: {0:?}")]
    InvalidName(String),

    #[error("table invariant violated: {0}")]
    InvariantViolation(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{0} thread panicked")]
    WorkerPanicked(String),

    #[error("item sequence exhausted")]
    SequenceExhausted,
}

impl Error {
    pub(crate) fn semaphore(name: &str, op: &'static str, source: nix::Error) -> Self {
        Error::Semaphore {
            name: name.to_string(),
            op,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_os_error() {
        let err = Error::semaphore("/full", "sem_open", nix::Error::ENOENT);
        let msg = err.to_string();
        assert!(msg.contains("/full"));
        assert!(msg.contains("sem_open"));
    }

    #[test]
    fn test_worker_panic_is_not_an_invariant_violation() {
        let err = Error::WorkerPanicked("producer".into());
        assert_eq!(err.to_string(), "producer thread panicked");
        assert!(!matches!(err, Error::InvariantViolation(_)));
    }
}
