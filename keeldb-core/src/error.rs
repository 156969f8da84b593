//! Error types for KeelDB

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for KeelDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// KeelDB error types
///
/// Precondition violations (nested `begin`, a replace with neither
/// tuple, a failing commit/rollback hook) are programming errors and
/// panic instead of surfacing here. Row-level corruption never becomes
/// an error either: the cursor recovers locally by resynchronizing.
#[derive(Error, Debug)]
pub enum Error {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Log directory could not be read
    #[error("cannot read log directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bad segment header, version or filetype
    #[error("invalid log format: {0}")]
    InvalidFormat(String),

    /// Checksum mismatch
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Data corruption detected
    #[error("data corruption: {0}")]
    Corruption(String),

    /// WAL append failed; the transaction stays un-committed
    #[error("durability error: {0}")]
    Durability(String),

    /// Storage engine rejected a mutation
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization of a redo payload failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption(_) | Error::ChecksumMismatch { .. } | Error::InvalidFormat(_)
        )
    }
}
