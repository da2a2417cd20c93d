//! Error types for repository operations

use std::fmt;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors that can occur while reading or writing the inventory store.
///
/// Repository failures are expected to be transient: the scheduler skips
/// the affected device or alert update and retries on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The requested record does not exist
    NotFound(String),

    /// The backing store rejected or could not complete the operation
    Unavailable(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::NotFound(what) => write!(f, "record not found: {what}"),
            RepositoryError::Unavailable(msg) => {
                write!(f, "repository unavailable: {msg}")
            }
        }
    }
}

impl std::error::Error for RepositoryError {}
