//! Snapshot backend trait definition.

use crate::error::StoreResult;

/// A byte store for the durable snapshot.
///
/// Backends are **opaque byte stores**. The store owns the snapshot
/// format; backends only load and persist the encoded bytes.
///
/// # Invariants
///
/// - `load` returns exactly the bytes most recently persisted, or `None`
///   if nothing has been persisted yet
/// - after `persist` returns, the bytes survive process termination (for
///   persistent backends)
/// - `persist` replaces the previous snapshot atomically: a crash leaves
///   either the old bytes or the new bytes, never a mix
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - for tests and ephemeral stores
/// - [`super::FileBackend`] - for persistent storage
pub trait SnapshotBackend: Send {
    /// Loads the last persisted snapshot bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Persists a new snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be made durable.
    fn persist(&mut self, bytes: &[u8]) -> StoreResult<()>;
}
