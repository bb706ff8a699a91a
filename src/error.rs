//! Custom error types for the application.
//!
//! This module defines the primary error type, [`Error`], for the entire crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! classify everything that can go wrong during a run:
//!
//! - **`Configuration`**: Semantically invalid session or run parameters
//!   (an unbounded block count, a template larger than the frame). Always
//!   surfaced before any hardware I/O is attempted.
//! - **`GrabTimeout` / `AcquisitionTimeout`**: A frame grab or chunk read did
//!   not complete within its bounded wait. Recoverable; the caller decides
//!   whether to retry or abort.
//! - **`DataLoss`**: The validity channel flagged a sample as untrustworthy.
//!   Fatal for the acquisition session: a lost transport unit invalidates
//!   cross-channel alignment for that chunk, so no partial tolerance exists.
//! - **`Actuator`**: The steering mirror rejected a command or the handle was
//!   lost. Fatal; triggers an orderly stop of the whole run.
//! - **`Camera` / `Acquisition`**: Device-reported failures from the respective
//!   collaborator.
//! - **`Storage`**: Persisting a result block kept failing after the configured
//!   number of attempts.
//!
//! Workers never let these cross a thread boundary as a panic; each worker
//! reports "I have stopped, here is why" and the coordinator logs the reason.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error taxonomy.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid session or run parameters, caught before hardware I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A frame grab did not complete within the bounded wait.
    #[error("frame grab timed out after {0:?}")]
    GrabTimeout(Duration),

    /// A chunk read did not complete within the bounded wait.
    #[error("chunk read incomplete after {0:?}")]
    AcquisitionTimeout(Duration),

    /// The validity channel reported a false sample; the chunk is untrustworthy.
    #[error("data packet lost (validity channel reported false)")]
    DataLoss,

    /// The steering mirror rejected a command or its handle was lost.
    #[error("actuator error: {0}")]
    Actuator(String),

    /// Camera collaborator failure.
    #[error("camera error: {0}")]
    Camera(String),

    /// Acquisition collaborator failure other than a timeout.
    #[error("acquisition device error: {0}")]
    Acquisition(String),

    /// Persisting a result block failed on every attempt.
    #[error("storage error after {attempts} attempts: {source}")]
    Storage {
        /// How many write attempts were made before giving up.
        attempts: u32,
        /// The last I/O error observed.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may sensibly retry the failed operation.
    ///
    /// Only the bounded-wait timeouts are recoverable; everything else is
    /// fatal for at least the current session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::GrabTimeout(_) | Error::AcquisitionTimeout(_))
    }
}
