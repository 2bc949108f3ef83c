//! This module contains the error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur while storing or removing buffered alerts.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// A general error occurred during a buffer operation.
    #[error("An alert buffer operation failed: {0}")]
    OperationFailed(String),

    /// The buffer's internal lock was poisoned by a panicking writer.
    #[error("The alert buffer lock is poisoned")]
    Poisoned,
}
