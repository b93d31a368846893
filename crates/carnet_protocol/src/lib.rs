//! Wire types shared between the offline queue and the reconciliation
//! engine.
//!
//! A [`PendingOperation`] is a captured HTTP mutation: endpoint, method,
//! opaque JSON payload, headers, and retry bookkeeping. Operations are
//! shipped to the remote batch endpoint as a [`BatchRequest`] and answered
//! positionally by a [`BatchResponse`].
//!
//! Payloads are carried as [`serde_json::Value`] and never interpreted;
//! the shape of the entities moving through the queue is the caller's
//! business, not ours.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod operation;

pub use batch::{BatchItem, BatchOutcome, BatchRequest, BatchResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{
    HttpMethod, OperationDraft, OperationKind, PendingOperation, DEFAULT_MAX_RETRIES,
};
