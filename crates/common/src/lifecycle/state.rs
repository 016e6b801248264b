//! Component status and guarded transitions
//!
//! `StatusCell` stores a [`ComponentStatus`] in an atomic so that hot paths
//! (listener registration, cache lookups) can check it without locking, while
//! transitions use compare-and-swap so two concurrent `initialize` calls
//! cannot both win.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Lifecycle status shared by caches and managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentStatus {
    /// Created but not initialized
    Unavailable = 0,
    /// Initialization in progress
    Initializing = 1,
    /// Operational
    Running = 2,
    /// Shutdown in progress
    Stopping = 3,
    /// Shut down
    Terminated = 4,
    /// Initialization or shutdown failed
    Failed = 5,
}

impl ComponentStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unavailable,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Terminated,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Terminated => write!(f, "TERMINATED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// An operation was attempted while the component was in the wrong state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "'{operation}' requires {} state but component is {actual}",
    join_statuses(.required)
)]
pub struct LifecycleError {
    /// Rejected operation
    pub operation: String,
    /// States in which the operation is allowed
    pub required: Vec<ComponentStatus>,
    /// State observed when the operation was attempted
    pub actual: ComponentStatus,
}

fn join_statuses(statuses: &[ComponentStatus]) -> String {
    statuses.iter().map(ToString::to_string).collect::<Vec<_>>().join(" or ")
}

/// Atomic holder for a [`ComponentStatus`]
#[derive(Debug)]
pub struct StatusCell {
    value: AtomicU8,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ComponentStatus::Unavailable)
    }
}

impl StatusCell {
    /// Create a cell holding `initial`
    pub const fn new(initial: ComponentStatus) -> Self {
        Self { value: AtomicU8::new(initial as u8) }
    }

    /// Current status
    pub fn get(&self) -> ComponentStatus {
        ComponentStatus::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Unconditionally store `status`
    pub fn set(&self, status: ComponentStatus) {
        self.value.store(status as u8, Ordering::Release);
    }

    /// Fail with a [`LifecycleError`] unless the current status is one of
    /// `required`.
    pub fn require(
        &self,
        operation: &str,
        required: &[ComponentStatus],
    ) -> Result<(), LifecycleError> {
        let actual = self.get();
        if required.contains(&actual) {
            Ok(())
        } else {
            Err(LifecycleError {
                operation: operation.to_string(),
                required: required.to_vec(),
                actual,
            })
        }
    }

    /// Atomically move from `from` to `to`.
    pub fn transition(
        &self,
        operation: &str,
        from: ComponentStatus,
        to: ComponentStatus,
    ) -> Result<(), LifecycleError> {
        self.value
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| LifecycleError {
                operation: operation.to_string(),
                required: vec![from],
                actual: ComponentStatus::from_u8(actual),
            })
    }
}
