//! Error types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CBOR encoding or decoding of the snapshot failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The snapshot file is structurally valid but unusable.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the exclusive lock on the store directory.
    #[error("store locked: another process has exclusive access to {0}")]
    Locked(PathBuf),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The referenced operation is not in the queue.
    #[error("unknown operation id: {id}")]
    UnknownOperation {
        /// The id that was looked up.
        id: u64,
    },
}
