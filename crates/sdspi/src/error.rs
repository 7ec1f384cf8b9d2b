//! Driver error type

use thiserror_no_std::Error;

/// Errors surfaced by the block storage driver.
///
/// Transport timeouts are not a distinct case: a bus that stays busy past
/// its soft-timer bound surfaces as the non-ready or missing-token response
/// it produced, which callers see as [`DiskError::Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiskError {
    /// A parameter was rejected before any bus traffic: zero block count or
    /// a buffer shorter than the requested transfer.
    #[error("invalid parameter")]
    InvalidParameter,
    /// The card has not completed initialization.
    #[error("card not initialized")]
    NotReady,
    /// The medium is write protected.
    #[error("medium is write protected")]
    WriteProtected,
    /// The card rejected a command, returned an unexpected data token, or a
    /// transfer failed mid-stream.
    #[error("card protocol error")]
    Protocol,
    /// The serial bus peripheral itself reported a fault.
    #[error("serial bus fault")]
    Bus,
}
