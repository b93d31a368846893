//! Error types for the engine.

use carnet_protocol::ProtocolError;
use carnet_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the gateway, the reconciler, and the scheduler.
///
/// Two outcomes that look like errors deliberately are not: a mutation
/// captured while offline comes back as
/// [`FetchResult::Queued`](crate::FetchResult::Queued), and a replay
/// rejected by the server goes through the retry policy and shows up in
/// [`PassSummary::errors`](crate::PassSummary) instead of aborting the
/// pass.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The durable store could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A wire message could not be built or parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No HTTP response could be obtained and no cached copy exists.
    #[error("network unreachable: {message}")]
    Unreachable {
        /// Transport-level failure description.
        message: String,
    },

    /// A reconciliation pass is already running.
    #[error("a reconciliation pass is already running")]
    SyncInProgress,
}

impl EngineError {
    /// Creates an unreachable-network error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }
}
