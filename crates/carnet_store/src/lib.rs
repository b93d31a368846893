//! # Carnet Store
//!
//! Encrypted durable store for the carnet sync engine.
//!
//! This crate is the only place where pending operations, cached GET
//! responses, and the sync-status record survive a process restart.
//! Everything else in the engine goes through [`DurableStore`]; nothing
//! holds an independent copy of persisted state.
//!
//! ## Design
//!
//! - One CBOR snapshot per store, rewritten atomically on every mutation
//!   (temp file + rename)
//! - An fs2 `LOCK` file gives one process exclusive ownership of a store
//!   directory
//! - Cache payloads are sealed with AES-256-GCM; the key is derived with
//!   HKDF-SHA256 from a per-installation seed
//! - Time flows through the [`Clock`] trait so expiry is testable
//!
//! ## Example
//!
//! ```rust
//! use carnet_store::{DurableStore, SystemClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = DurableStore::open_in_memory(Arc::new(SystemClock)).unwrap();
//! store
//!     .put_cache_entry("classes:/academics/classes", b"[]", Some(Duration::from_secs(7200)))
//!     .unwrap();
//! assert!(store.get_cache_entry("classes:/academics/classes").unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod clock;
mod crypto;
mod error;
mod file;
mod keyfile;
mod memory;
mod records;
mod store;

pub use backend::SnapshotBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{CryptoManager, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use records::{CacheEntry, StatusPatch, StoreSnapshot, SyncPhase, SyncStatus, FORMAT_VERSION};
pub use store::{DurableStore, DEFAULT_QUEUE_HIGH_WATER};
