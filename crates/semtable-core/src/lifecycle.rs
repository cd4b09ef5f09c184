//! Removal of the named resources

use std::fmt;

use crate::names::ResourceNames;
use crate::semaphore::NamedSemaphore;
use crate::shm::SharedMemory;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    SharedMemory,
    Semaphore,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::SharedMemory => write!(f, "shared memory"),
            ResourceKind::Semaphore => write!(f, "semaphore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Removed,
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: Outcome,
}

/// Per-resource result of [`teardown`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removals: Vec<Removal>,
}

impl TeardownReport {
    /// True unless some unlink failed; missing resources count as clean
    pub fn is_clean(&self) -> bool {
        self.removals
            .iter()
            .all(|r| !matches!(r.outcome, Outcome::Failed(_)))
    }

    pub fn removed(&self) -> usize {
        self.removals
            .iter()
            .filter(|r| r.outcome == Outcome::Removed)
            .count()
    }

    fn push(&mut self, kind: ResourceKind, name: &str, outcome: Outcome) {
        match &outcome {
            Outcome::Removed => log::info!("removed {} {}", kind, name),
            Outcome::NotFound => log::debug!("{} {} not found", kind, name),
            Outcome::Failed(e) => log::warn!("could not remove {} {}: {}", kind, name, e),
        }
        self.removals.push(Removal {
            kind,
            name: name.to_string(),
            outcome,
        });
    }
}

/// Unlink the shared segment and all three semaphores.
///
/// Every resource is attempted even if an earlier one fails. Processes that
/// still have them open keep working until they close their handles.
pub fn teardown(names: &ResourceNames) -> Result<TeardownReport> {
    names.validate()?;
    let mut report = TeardownReport::default();

    let outcome = to_outcome(SharedMemory::unlink(&names.shm));
    report.push(ResourceKind::SharedMemory, &names.shm, outcome);
    for name in [&names.empty, &names.full, &names.mutex] {
        let outcome = to_outcome(NamedSemaphore::unlink(name));
        report.push(ResourceKind::Semaphore, name, outcome);
    }
    Ok(report)
}

fn to_outcome(result: Result<bool>) -> Outcome {
    match result {
        Ok(true) => Outcome::Removed,
        Ok(false) => Outcome::NotFound,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}
