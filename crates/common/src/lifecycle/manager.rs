//! Standard lifecycle trait for components that own background resources

use super::state::ComponentStatus;

/// Lifecycle shared by caches and cache managers
///
/// Components start in [`ComponentStatus::Unavailable`], move through
/// `Initializing` to `Running` on [`initialize`](Lifecycle::initialize), and
/// through `Stopping` to `Terminated` on [`shutdown`](Lifecycle::shutdown).
/// A failure during either transition leaves the component `Failed`.
pub trait Lifecycle: Send + Sync {
    /// Error type for this component
    type Error: std::error::Error + Send + Sync + 'static;

    /// Acquire resources and become operational
    fn initialize(&self) -> Result<(), Self::Error>;

    /// Release resources; further lifecycle calls are rejected
    fn shutdown(&self) -> Result<(), Self::Error>;

    /// Current status
    fn status(&self) -> ComponentStatus;

    /// Shorthand for `status() == Running`
    fn is_running(&self) -> bool {
        self.status() == ComponentStatus::Running
    }
}
