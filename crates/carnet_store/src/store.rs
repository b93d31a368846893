//! The durable store: operation queue, response cache, and sync status
//! behind one lock.

use crate::backend::SnapshotBackend;
use crate::clock::Clock;
use crate::crypto::{CryptoManager, EncryptionKey};
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::keyfile;
use crate::memory::MemoryBackend;
use crate::records::{CacheEntry, StatusPatch, StoreSnapshot, SyncPhase, SyncStatus};
use carnet_protocol::{OperationDraft, PendingOperation};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default soft high-water mark for the operation queue.
///
/// The queue is unbounded; crossing the mark only raises
/// [`DurableStore::queue_pressure`] and logs a warning.
pub const DEFAULT_QUEUE_HIGH_WATER: usize = 500;

/// The only home of pending operations, cached responses, and the
/// sync-status record.
///
/// Everything else in the engine reads and mutates persisted state
/// through this type; no component keeps an independent copy that could
/// drift from disk.
///
/// # Durability
///
/// Every mutation rewrites the whole snapshot through the backend before
/// returning. A mutation that cannot persist returns an error and leaves
/// the in-memory state exactly as it was.
///
/// # Concurrency
///
/// All operations serialize behind one internal lock; each call is atomic
/// with respect to every other call. The store is `Send + Sync` and is
/// normally shared as `Arc<DurableStore>`.
pub struct DurableStore {
    inner: Mutex<Inner>,
    crypto: CryptoManager,
    clock: Arc<dyn Clock>,
    queue_high_water: usize,
}

struct Inner {
    backend: Box<dyn SnapshotBackend>,
    snapshot: StoreSnapshot,
}

impl DurableStore {
    /// Opens or creates a file-backed store in `dir`.
    ///
    /// Takes the directory's exclusive lock, loads or creates the
    /// installation seed, and loads the last snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is locked by another process,
    /// the key file or snapshot is unusable, or I/O fails.
    pub fn open(dir: &Path, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let backend = FileBackend::open(dir)?;
        let key = keyfile::load_or_create(&backend.key_path())?;
        Self::with_backend(Box::new(backend), key, clock)
    }

    /// Opens an ephemeral in-memory store with a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial snapshot cannot be decoded
    /// (never, for a fresh backend).
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()), EncryptionKey::generate(), clock)
    }

    /// Opens a store over an explicit backend and key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend holds an undecodable snapshot.
    pub fn with_backend(
        backend: Box<dyn SnapshotBackend>,
        key: EncryptionKey,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let mut snapshot = match backend.load()? {
            Some(bytes) => StoreSnapshot::decode(&bytes)?,
            None => StoreSnapshot::new(),
        };

        // A persisted `syncing` phase means the last process died
        // mid-pass; no pass is running now.
        if snapshot.status.phase == SyncPhase::Syncing {
            debug!("clearing syncing phase left behind by a previous process");
            snapshot.status.phase = SyncPhase::Idle;
        }

        Ok(Self {
            inner: Mutex::new(Inner { backend, snapshot }),
            crypto: CryptoManager::new(key),
            clock,
            queue_high_water: DEFAULT_QUEUE_HIGH_WATER,
        })
    }

    /// Overrides the queue's soft high-water mark.
    #[must_use]
    pub fn with_queue_high_water(mut self, limit: usize) -> Self {
        self.queue_high_water = limit;
        self
    }

    /// The clock this store stamps records with.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Mutates a copy of the snapshot, persists it, then commits it.
    /// A failed persist leaves the in-memory state untouched.
    fn commit<T>(
        &self,
        inner: &mut Inner,
        mutate: impl FnOnce(&mut StoreSnapshot) -> T,
    ) -> StoreResult<T> {
        let mut next = inner.snapshot.clone();
        let out = mutate(&mut next);
        let bytes = next.encode()?;
        inner.backend.persist(&bytes)?;
        inner.snapshot = next;
        Ok(out)
    }

    /// Appends a mutation to the queue and returns its assigned id.
    ///
    /// Ids are monotonic and never reused; `retry_count` starts at 0 and
    /// the enqueue instant comes from the store clock. The queue is
    /// unbounded: at or above the high-water mark the enqueue still
    /// succeeds, but a warning is logged and [`Self::queue_pressure`]
    /// reports `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub fn enqueue_operation(&self, draft: OperationDraft) -> StoreResult<u64> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let (id, queued) = self.commit(&mut inner, |snap| {
            let id = snap.next_operation_id;
            snap.next_operation_id += 1;
            snap.operations.push(PendingOperation::from_draft(draft, id, now));
            snap.status.pending_count = snap.operations.len() as u64;
            (id, snap.operations.len())
        })?;

        if queued >= self.queue_high_water {
            warn!(
                queued,
                high_water = self.queue_high_water,
                "offline queue is above its high-water mark"
            );
        }

        Ok(id)
    }

    /// Returns all queued operations, oldest first.
    ///
    /// Ordered by enqueue timestamp ascending, ids breaking ties.
    /// Safe to call repeatedly; reads have no side effects.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the signature stable.
    pub fn pending_operations(&self) -> StoreResult<Vec<PendingOperation>> {
        let inner = self.inner.lock();
        let mut ops = inner.snapshot.operations.clone();
        ops.sort_by_key(|op| (op.enqueued_at_ms, op.id));
        Ok(ops)
    }

    /// Deletes one operation. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub fn remove_operation(&self, id: u64) -> StoreResult<bool> {
        let mut inner = self.inner.lock();

        let Some(index) = inner.snapshot.operations.iter().position(|op| op.id == id) else {
            return Ok(false);
        };

        self.commit(&mut inner, |snap| {
            snap.operations.remove(index);
            snap.status.pending_count = snap.operations.len() as u64;
        })?;

        Ok(true)
    }

    /// Bumps an operation's retry count and returns the new value.
    ///
    /// Refuses to move past `max_retries`: at the ceiling the stored
    /// count is returned unchanged (the caller's cue is
    /// [`PendingOperation::retries_exhausted`], and its move is to
    /// delete, not to keep counting).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownOperation`] if `id` is not queued,
    /// or a persistence error.
    pub fn increment_retry(&self, id: u64) -> StoreResult<u32> {
        let mut inner = self.inner.lock();

        let Some(index) = inner.snapshot.operations.iter().position(|op| op.id == id) else {
            return Err(StoreError::UnknownOperation { id });
        };

        let op = &inner.snapshot.operations[index];
        if op.retry_count >= op.max_retries {
            return Ok(op.retry_count);
        }

        self.commit(&mut inner, |snap| {
            let op = &mut snap.operations[index];
            op.retry_count += 1;
            op.retry_count
        })
    }

    /// Encrypts `payload` and stores it under `key`, overwriting any
    /// previous entry.
    ///
    /// The cache key doubles as the AEAD associated data, so a sealed
    /// payload copied to another slot fails authentication there.
    /// With a `ttl`, the entry dies at `now + ttl`; without one it lives
    /// until overwritten or invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or persistence fails.
    pub fn put_cache_entry(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let sealed = self.crypto.seal(payload, key.as_bytes())?;
        let entry = CacheEntry {
            sealed,
            stored_at_ms: now,
            expires_at_ms: ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64)),
        };

        let mut inner = self.inner.lock();
        self.commit(&mut inner, |snap| {
            snap.cache.insert(key.to_string(), entry);
        })
    }

    /// Returns the decrypted payload under `key`, or `None`.
    ///
    /// Expired entries are purged lazily on lookup; the expiry instant
    /// itself counts as expired. An entry that fails decryption (corrupt
    /// data, rotated key) is purged and reported as absent rather than
    /// surfaced as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if purging cannot be persisted.
    pub fn get_cache_entry(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let sealed = match inner.snapshot.cache.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(entry.sealed.clone()),
        };

        let Some(sealed) = sealed else {
            debug!(key, "cache entry expired; purging");
            self.commit(&mut inner, |snap| {
                snap.cache.remove(key);
            })?;
            return Ok(None);
        };

        match self.crypto.open(&sealed, key.as_bytes()) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(_) => {
                debug!(key, "cache entry failed authentication; purging");
                self.commit(&mut inner, |snap| {
                    snap.cache.remove(key);
                })?;
                Ok(None)
            }
        }
    }

    /// Drops the entry under `key`. Returns whether one was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub fn invalidate_cache_entry(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();

        if !inner.snapshot.cache.contains_key(key) {
            return Ok(false);
        }

        self.commit(&mut inner, |snap| {
            snap.cache.remove(key);
        })?;

        Ok(true)
    }

    /// Returns a copy of the singleton status record.
    #[must_use]
    pub fn read_sync_status(&self) -> SyncStatus {
        self.inner.lock().snapshot.status.clone()
    }

    /// Merge-applies a partial status update and returns the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub fn write_sync_status(&self, patch: StatusPatch) -> StoreResult<SyncStatus> {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, |snap| {
            snap.status.apply(patch);
            snap.status.clone()
        })
    }

    /// Number of operations currently queued.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.lock().snapshot.operations.len()
    }

    /// Whether the queue sits at or above its soft high-water mark.
    #[must_use]
    pub fn queue_pressure(&self) -> bool {
        self.queue_len() >= self.queue_high_water
    }
}
