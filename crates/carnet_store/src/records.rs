//! Persisted record types and the snapshot codec.
//!
//! The whole store state is one [`StoreSnapshot`]: the operation queue,
//! the response cache, and the singleton [`SyncStatus`]. The snapshot is
//! encoded with CBOR and rewritten as a unit on every mutation; the store
//! is small (queued edits and cached reads, not a database), so whole-
//! snapshot writes buy crash atomicity cheaply.

use crate::error::{StoreError, StoreResult};
use carnet_protocol::PendingOperation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot format version.
pub const FORMAT_VERSION: u32 = 1;

/// One cached GET response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Encrypted payload: `nonce || ciphertext || tag`.
    pub sealed: Vec<u8>,
    /// Epoch milliseconds at insertion.
    pub stored_at_ms: u64,
    /// Epoch milliseconds after which the entry is dead. `None` never
    /// expires.
    pub expires_at_ms: Option<u64>,
}

impl CacheEntry {
    /// Whether the entry is expired at `now_ms`.
    ///
    /// The boundary instant itself counts as expired.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(at) if now_ms >= at)
    }
}

/// Reconciliation phase, as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// No pass running; nothing known to be wrong.
    #[default]
    Idle,
    /// A reconciliation pass is in flight.
    Syncing,
    /// The last pass finished with failures.
    Error,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// The singleton reconciliation status record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Current phase.
    pub phase: SyncPhase,
    /// Epoch milliseconds of the last completed pass, successful or not.
    pub last_sync_ms: Option<u64>,
    /// Number of operations currently queued.
    pub pending_count: u64,
    /// First error message of the last pass, if any.
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Merge-applies a partial update.
    pub fn apply(&mut self, patch: StatusPatch) {
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
        if let Some(ts) = patch.last_sync_ms {
            self.last_sync_ms = Some(ts);
        }
        if let Some(count) = patch.pending_count {
            self.pending_count = count;
        }
        if let Some(error) = patch.last_error {
            self.last_error = error;
        }
    }
}

/// A partial update to [`SyncStatus`]; unset fields are left alone.
///
/// # Example
///
/// ```rust
/// use carnet_store::{StatusPatch, SyncPhase, SyncStatus};
///
/// let mut status = SyncStatus::default();
/// status.apply(
///     StatusPatch::new()
///         .phase(SyncPhase::Idle)
///         .last_sync_ms(1_000)
///         .clear_error(),
/// );
/// assert_eq!(status.last_sync_ms, Some(1_000));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    phase: Option<SyncPhase>,
    last_sync_ms: Option<u64>,
    pending_count: Option<u64>,
    last_error: Option<Option<String>>,
}

impl StatusPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the phase.
    #[must_use]
    pub fn phase(mut self, phase: SyncPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets the last-pass timestamp.
    #[must_use]
    pub fn last_sync_ms(mut self, at_ms: u64) -> Self {
        self.last_sync_ms = Some(at_ms);
        self
    }

    /// Sets the pending-operation count.
    #[must_use]
    pub fn pending_count(mut self, count: u64) -> Self {
        self.pending_count = Some(count);
        self
    }

    /// Records an error message.
    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self
    }

    /// Clears any recorded error.
    #[must_use]
    pub fn clear_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }
}

/// The complete persisted state of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Snapshot format version; bumped on incompatible layout changes.
    pub format_version: u32,
    /// Next operation id to assign. Starts at 1 and never reuses ids.
    pub next_operation_id: u64,
    /// Queued mutations in insertion order.
    pub operations: Vec<PendingOperation>,
    /// Cached GET responses by cache key.
    pub cache: BTreeMap<String, CacheEntry>,
    /// The singleton status record.
    pub status: SyncStatus,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            next_operation_id: 1,
            operations: Vec::new(),
            cache: BTreeMap::new(),
            status: SyncStatus::default(),
        }
    }
}

impl StoreSnapshot {
    /// Creates an empty snapshot at the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes the snapshot to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| StoreError::Codec(err.to_string()))?;
        Ok(bytes)
    }

    /// Decodes a snapshot from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns `Codec` on malformed CBOR and `Corrupted` on an
    /// unsupported format version.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let snapshot: Self =
            ciborium::de::from_reader(bytes).map_err(|err| StoreError::Codec(err.to_string()))?;

        if snapshot.format_version != FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported snapshot version {} (this build reads {FORMAT_VERSION})",
                snapshot.format_version
            )));
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnet_protocol::{HttpMethod, OperationDraft, PendingOperation};

    fn sample_op(id: u64) -> PendingOperation {
        let draft = OperationDraft::new(HttpMethod::Post, "/api/things")
            .unwrap()
            .with_payload(serde_json::json!({"n": id}));
        PendingOperation::from_draft(draft, id, id * 10)
    }

    #[test]
    fn fresh_snapshot_is_empty() {
        let snapshot = StoreSnapshot::new();
        assert_eq!(snapshot.format_version, FORMAT_VERSION);
        assert_eq!(snapshot.next_operation_id, 1);
        assert!(snapshot.operations.is_empty());
        assert!(snapshot.cache.is_empty());
        assert_eq!(snapshot.status, SyncStatus::default());
    }

    #[test]
    fn snapshot_round_trips_through_cbor() {
        let mut snapshot = StoreSnapshot::new();
        snapshot.operations.push(sample_op(1));
        snapshot.operations.push(sample_op(2));
        snapshot.next_operation_id = 3;
        snapshot.cache.insert(
            "classes:/academics/classes".to_string(),
            CacheEntry {
                sealed: vec![1, 2, 3, 4],
                stored_at_ms: 500,
                expires_at_ms: Some(7_200_500),
            },
        );
        snapshot.status.pending_count = 2;
        snapshot.status.last_error = Some("boom".to_string());

        let decoded = StoreSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut snapshot = StoreSnapshot::new();
        snapshot.format_version = 99;

        let bytes = snapshot.encode().unwrap();
        let result = StoreSnapshot::decode(&bytes);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn garbage_bytes_are_a_codec_error() {
        let result = StoreSnapshot::decode(b"not cbor at all");
        assert!(matches!(result, Err(StoreError::Codec(_))));
    }

    #[test]
    fn entry_without_ttl_never_expires() {
        let entry = CacheEntry {
            sealed: vec![],
            stored_at_ms: 0,
            expires_at_ms: None,
        };
        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn entry_expires_at_the_boundary() {
        let entry = CacheEntry {
            sealed: vec![],
            stored_at_ms: 0,
            expires_at_ms: Some(1_000),
        };
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));
        assert!(entry.is_expired(1_001));
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut status = SyncStatus {
            phase: SyncPhase::Error,
            last_sync_ms: Some(10),
            pending_count: 4,
            last_error: Some("old".to_string()),
        };

        status.apply(StatusPatch::new().pending_count(3));

        assert_eq!(status.phase, SyncPhase::Error);
        assert_eq!(status.last_sync_ms, Some(10));
        assert_eq!(status.pending_count, 3);
        assert_eq!(status.last_error.as_deref(), Some("old"));
    }

    #[test]
    fn patch_can_clear_the_error() {
        let mut status = SyncStatus {
            phase: SyncPhase::Error,
            last_sync_ms: None,
            pending_count: 0,
            last_error: Some("old".to_string()),
        };

        status.apply(StatusPatch::new().phase(SyncPhase::Idle).clear_error());

        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn phase_displays_lowercase() {
        assert_eq!(SyncPhase::Idle.to_string(), "idle");
        assert_eq!(SyncPhase::Syncing.to_string(), "syncing");
        assert_eq!(SyncPhase::Error.to_string(), "error");
    }
}
