use std::time::Duration;

use thiserror::Error;

/// Configuration errors surfaced by registry operations.
///
/// Everything that goes wrong inside a tick (probe, provider or display
/// failures) is logged by the scheduler and never reaches the caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A collaborator the scheduler needs was never wired into the registry.
    #[error("scheduler is missing a {0} implementation")]
    MissingProvider(&'static str),

    /// Refresh intervals must be strictly positive.
    #[error("refresh interval must be greater than zero (got {0:?})")]
    InvalidInterval(Duration),
}

impl SchedulerError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingProvider(_) | Self::InvalidInterval(_))
    }
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
