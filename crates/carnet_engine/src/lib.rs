//! # Carnet Engine
//!
//! Offline-first synchronization for HTTP clients.
//!
//! This crate provides:
//! - Connectivity tracking with subscriber notifications
//! - Request interception: cache write-through and fallback for reads,
//!   durable capture for writes that cannot reach the server
//! - Queue reconciliation: batch replay with per-item fallback and
//!   bounded retries
//! - A scheduler that triggers passes periodically and on reconnect
//!
//! ## Architecture
//!
//! The engine is entity-agnostic: it moves opaque
//! `{endpoint, method, payload, headers}` tuples and never inspects
//! what they mean. All durable state lives in a
//! [`carnet_store::DurableStore`]; the pieces here coordinate around it
//! and an [`HttpClient`] you implement over your HTTP library.
//!
//! ## Key Invariants
//!
//! - A captured mutation survives process restarts until it is either
//!   applied or has exhausted its retries
//! - Queued operations replay in enqueue order, on the batch path and
//!   the per-item fallback alike
//! - At most one reconciliation pass runs at a time
//! - An operation with `max_retries = N` is attempted at most N times,
//!   and its final failure is surfaced, not swallowed
//!
//! ## Example
//!
//! ```no_run
//! use carnet_engine::{
//!     CachePolicy, ConnectivityMonitor, EngineConfig, HttpRequest, OfflineGateway,
//!     Reconciler, ScriptedClient, SyncScheduler,
//! };
//! use carnet_store::{DurableStore, SystemClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new("https://api.example.com");
//! let store = Arc::new(DurableStore::open(
//!     "/var/lib/myapp/carnet".as_ref(),
//!     Arc::new(SystemClock),
//! )?);
//! let monitor = Arc::new(ConnectivityMonitor::new(true));
//! let client = Arc::new(ScriptedClient::new()); // your HttpClient impl
//!
//! let policy = CachePolicy::new()
//!     .with_rule("/academics", "academics", Some(Duration::from_secs(30 * 60)));
//! let gateway = OfflineGateway::new(
//!     config.clone(),
//!     Arc::clone(&store),
//!     Arc::clone(&monitor),
//!     Arc::clone(&client),
//!     policy,
//! );
//!
//! let reconciler = Arc::new(Reconciler::new(config.clone(), store, Arc::clone(&monitor), client));
//! let scheduler = SyncScheduler::start(Arc::clone(&reconciler), monitor, config.sync_interval);
//!
//! // Application traffic goes through the gateway.
//! let result = gateway.execute(HttpRequest::get("/academics/classes"))?;
//! # drop((result, scheduler));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod http;
mod intercept;
mod reconcile;
mod scheduler;

pub use config::EngineConfig;
pub use connectivity::{ConnectivityMonitor, SubscriptionId};
pub use error::{EngineError, EngineResult};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, RecordedRequest, ScriptedClient, TransportError,
};
pub use intercept::{cache_key, CachePolicy, CacheRule, FetchResult, OfflineGateway};
pub use reconcile::{OperationFailure, PassSummary, Reconciler};
pub use scheduler::SyncScheduler;
