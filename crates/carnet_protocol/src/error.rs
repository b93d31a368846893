//! Protocol error type.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization or parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The batch endpoint answered with the wrong number of results.
    #[error("misaligned batch response: sent {expected} operations, got {got} results")]
    MisalignedResults {
        /// Operations in the submitted chunk.
        expected: usize,
        /// Results in the response.
        got: usize,
    },
}
