//! In-memory snapshot backend for testing.

use crate::backend::SnapshotBackend;
use crate::error::StoreResult;

/// An in-memory snapshot backend.
///
/// Holds the encoded snapshot in a buffer. Suitable for unit tests and
/// ephemeral stores that don't need persistence.
///
/// # Example
///
/// ```rust
/// use carnet_store::{MemoryBackend, SnapshotBackend};
///
/// let mut backend = MemoryBackend::new();
/// assert!(backend.load().unwrap().is_none());
/// backend.persist(b"snapshot").unwrap();
/// assert_eq!(backend.load().unwrap().unwrap(), b"snapshot");
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    bytes: Option<Vec<u8>>,
}

impl MemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-loaded with snapshot bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes: Some(bytes) }
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.bytes.clone())
    }

    fn persist(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.bytes = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn memory_persist_replaces() {
        let mut backend = MemoryBackend::new();

        backend.persist(b"first").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"first");

        backend.persist(b"second").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"second");
    }

    #[test]
    fn memory_preloaded_bytes_visible() {
        let backend = MemoryBackend::with_bytes(b"seeded".to_vec());
        assert_eq!(backend.load().unwrap().unwrap(), b"seeded");
    }
}
