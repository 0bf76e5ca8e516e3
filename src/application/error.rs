//! Errors raised while assembling components.

use thiserror::Error;

/// Error returned when building a component fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Garbage collection interval must be greater than zero
    #[error("sweep interval must be greater than 0")]
    ZeroSweepInterval,
    /// Grouping window must be greater than zero
    #[error("group window must be greater than 0")]
    ZeroGroupWindow,
    /// Housekeeping interval must be greater than zero
    #[error("housekeeping interval must be greater than 0")]
    ZeroHousekeepingInterval,
}
