//! Queue reconciliation.
//!
//! A reconciliation pass drains the durable queue against the remote
//! API: chunks go to the batch endpoint first, and a chunk the batch
//! endpoint cannot answer is replayed one operation at a time. Failed
//! operations are retried on later passes until their attempt ceiling,
//! then given up and surfaced.

use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, SubscriptionId};
use crate::error::{EngineError, EngineResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse, TransportError};
use carnet_protocol::{BatchRequest, BatchResponse, PendingOperation, ProtocolError};
use carnet_store::{DurableStore, StatusPatch, SyncPhase};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One operation that failed during a pass.
#[derive(Debug, Clone)]
pub struct OperationFailure {
    /// Id of the failed operation.
    pub operation_id: u64,
    /// Endpoint the operation targets.
    pub endpoint: String,
    /// What went wrong on this attempt.
    pub error: String,
    /// Whether the operation exhausted its attempts and was removed.
    /// `false` means it stays queued for the next pass.
    pub exhausted: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct PassSummary {
    /// Operations confirmed applied and removed from the queue.
    pub processed: u64,
    /// Operations whose replay failed this pass.
    pub failed: u64,
    /// One entry per failed operation, in replay order.
    pub errors: Vec<OperationFailure>,
    /// Operations still queued when the pass ended.
    pub remaining: u64,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl PassSummary {
    /// Whether every replayed operation was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

type ResultListener = Box<dyn Fn(&PassSummary) + Send + Sync>;

/// Releases the single-flight latch on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains the durable queue against the remote API.
///
/// At most one pass runs at a time; a pass started while another is in
/// flight fails fast with [`EngineError::SyncInProgress`] and mutates
/// nothing. Every wire attempt doubles as connectivity evidence: an
/// HTTP response of any status proves the network reachable, a
/// transport failure proves it is not, and the monitor is updated
/// accordingly.
///
/// # Thread Safety
///
/// All methods take `&self`; share the reconciler as `Arc<Reconciler>`.
/// Result listeners run synchronously on the passing thread, before the
/// single-flight latch releases, and must not register or remove
/// listeners from inside the callback.
pub struct Reconciler<C: HttpClient> {
    config: EngineConfig,
    store: Arc<DurableStore>,
    monitor: Arc<ConnectivityMonitor>,
    client: Arc<C>,
    in_flight: AtomicBool,
    next_subscription: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, ResultListener)>>,
}

impl<C: HttpClient> Reconciler<C> {
    /// Creates a reconciler over shared engine components.
    pub fn new(
        config: EngineConfig,
        store: Arc<DurableStore>,
        monitor: Arc<ConnectivityMonitor>,
        client: Arc<C>,
    ) -> Self {
        Self {
            config,
            store,
            monitor,
            client,
            in_flight: AtomicBool::new(false),
            next_subscription: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a listener invoked with the summary of every pass.
    pub fn subscribe_results(
        &self,
        listener: impl Fn(&PassSummary) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, Box::new(listener)));
        id
    }

    /// Removes a result listener. Returns whether it was registered.
    pub fn unsubscribe_results(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Runs one reconciliation pass over the whole queue.
    ///
    /// The queue is drained oldest-first in chunks of the configured
    /// batch size. Operations rejected by the server are retried on
    /// later passes until their attempt ceiling; the final failure is
    /// reported with `exhausted: true` and the operation is removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SyncInProgress`] when a pass is already
    /// running (nothing is mutated), or [`EngineError::Store`] when the
    /// durable store fails mid-pass. Unreachable servers and rejected
    /// operations are not errors here; they surface in the summary.
    pub fn run_pass(&self) -> EngineResult<PassSummary> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(EngineError::SyncInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        match self.drain() {
            Ok(summary) => {
                for (_, listener) in self.listeners.read().iter() {
                    listener(&summary);
                }
                Ok(summary)
            }
            Err(err) => {
                // Losing durability mid-pass is the error worth surfacing;
                // recording it in the status is best effort.
                if let Err(status_err) = self.store.write_sync_status(
                    StatusPatch::new()
                        .phase(SyncPhase::Error)
                        .error(err.to_string()),
                ) {
                    debug!(error = %status_err, "could not persist error phase");
                }
                Err(err)
            }
        }
    }

    fn drain(&self) -> EngineResult<PassSummary> {
        let started = Instant::now();
        self.store
            .write_sync_status(StatusPatch::new().phase(SyncPhase::Syncing))?;

        let pending = self.store.pending_operations()?;
        info!(pending = pending.len(), "reconciliation pass started");

        let mut summary = PassSummary {
            processed: 0,
            failed: 0,
            errors: Vec::new(),
            remaining: 0,
            duration: Duration::ZERO,
        };

        for chunk in pending.chunks(self.config.batch_size) {
            self.drain_chunk(chunk, &mut summary)?;
        }

        summary.remaining = self.store.queue_len() as u64;
        summary.duration = started.elapsed();

        let mut patch = StatusPatch::new()
            .phase(if summary.is_clean() {
                SyncPhase::Idle
            } else {
                SyncPhase::Error
            })
            .last_sync_ms(self.store.clock().now_ms())
            .pending_count(summary.remaining);
        patch = match summary.errors.first() {
            Some(failure) => patch.error(failure.error.clone()),
            None => patch.clear_error(),
        };
        self.store.write_sync_status(patch)?;

        info!(
            processed = summary.processed,
            failed = summary.failed,
            remaining = summary.remaining,
            duration_ms = summary.duration.as_millis() as u64,
            "reconciliation pass finished"
        );
        Ok(summary)
    }

    /// Replays one chunk, preferring the batch endpoint.
    fn drain_chunk(
        &self,
        chunk: &[PendingOperation],
        summary: &mut PassSummary,
    ) -> EngineResult<()> {
        let body = BatchRequest::from_operations(chunk).encode()?;
        let request = HttpRequest::post(self.config.batch_url(), body)
            .with_timeout(self.config.request_timeout);

        let batch = match self.send(request) {
            Ok(response) if response.is_success() => {
                match BatchResponse::decode(&response.body)
                    .and_then(|decoded| decoded.check_alignment(chunk.len()).map(|()| decoded))
                {
                    Ok(decoded) => Some(decoded),
                    Err(err) => {
                        warn!(error = %err, "unusable batch response; replaying chunk per item");
                        None
                    }
                }
            }
            Ok(response) => {
                warn!(
                    status = response.status,
                    "batch endpoint rejected the chunk; replaying per item"
                );
                None
            }
            Err(err) => {
                warn!(error = %err, "batch call failed in transit; replaying chunk per item");
                None
            }
        };

        match batch {
            Some(response) => {
                for (op, outcome) in chunk.iter().zip(response.results.iter()) {
                    if outcome.success {
                        self.store.remove_operation(op.id)?;
                        summary.processed += 1;
                        debug!(id = op.id, "operation applied by batch");
                    } else {
                        let message = outcome
                            .error
                            .clone()
                            .unwrap_or_else(|| "operation rejected".to_string());
                        self.retry_or_exhaust(op, message, summary)?;
                    }
                }
                Ok(())
            }
            None => self.replay_individually(chunk, summary),
        }
    }

    /// Replays each operation of a chunk against its own endpoint, in
    /// queue order.
    fn replay_individually(
        &self,
        chunk: &[PendingOperation],
        summary: &mut PassSummary,
    ) -> EngineResult<()> {
        for op in chunk {
            let mut request = HttpRequest::new(
                op.method,
                format!("{}{}", self.config.base_url, op.endpoint),
            )
            .with_timeout(self.config.request_timeout);
            request.headers = op.headers.clone();
            if let Some(payload) = &op.payload {
                request.body = Some(serde_json::to_vec(payload).map_err(ProtocolError::from)?);
            }

            match self.send(request) {
                Ok(response) if response.is_success() => {
                    self.store.remove_operation(op.id)?;
                    summary.processed += 1;
                    debug!(id = op.id, "operation applied individually");
                }
                Ok(response) => {
                    self.retry_or_exhaust(op, format!("HTTP {}", response.status), summary)?;
                }
                Err(err) => {
                    self.retry_or_exhaust(op, err.to_string(), summary)?;
                }
            }
        }
        Ok(())
    }

    /// Books one failed attempt: schedule another pass or give up.
    fn retry_or_exhaust(
        &self,
        op: &PendingOperation,
        message: String,
        summary: &mut PassSummary,
    ) -> EngineResult<()> {
        let exhausted = op.retry_count + 1 >= op.max_retries;
        if exhausted {
            self.store.remove_operation(op.id)?;
            warn!(
                id = op.id,
                attempts = op.retry_count + 1,
                "operation exhausted its attempts and was given up"
            );
        } else {
            self.store.increment_retry(op.id)?;
            debug!(id = op.id, attempt = op.retry_count + 1, "operation will be retried");
        }
        summary.failed += 1;
        summary.errors.push(OperationFailure {
            operation_id: op.id,
            endpoint: op.endpoint.clone(),
            error: message,
            exhausted,
        });
        Ok(())
    }

    /// Sends a request and feeds the outcome to the connectivity monitor.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.client.send(request) {
            Ok(response) => {
                self.monitor.set_online(true);
                Ok(response)
            }
            Err(err) => {
                self.monitor.mark_offline();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ScriptedClient;
    use carnet_protocol::{BatchOutcome, HttpMethod, OperationDraft};
    use carnet_store::ManualClock;
    use parking_lot::Mutex;

    fn draft(endpoint: &str) -> OperationDraft {
        OperationDraft::new(HttpMethod::Post, endpoint)
            .unwrap()
            .with_payload(serde_json::json!({"n": 1}))
    }

    fn reconciler() -> (
        Arc<Reconciler<ScriptedClient>>,
        Arc<DurableStore>,
        Arc<ConnectivityMonitor>,
        Arc<ScriptedClient>,
    ) {
        let store = Arc::new(
            DurableStore::open_in_memory(Arc::new(ManualClock::new(10_000))).unwrap(),
        );
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let client = Arc::new(ScriptedClient::new());
        let reconciler = Arc::new(Reconciler::new(
            EngineConfig::new("https://api.example.com"),
            Arc::clone(&store),
            Arc::clone(&monitor),
            Arc::clone(&client),
        ));
        (reconciler, store, monitor, client)
    }

    fn batch_response(outcomes: Vec<BatchOutcome>) -> HttpResponse {
        let body = BatchResponse { results: outcomes }.encode().unwrap();
        HttpResponse::new(200, body)
    }

    #[test]
    fn empty_pass_is_clean_and_writes_idle_status() {
        let (reconciler, store, _monitor, client) = reconciler();

        let summary = reconciler.run_pass().unwrap();
        assert!(summary.is_clean());
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.remaining, 0);
        assert_eq!(client.request_count(), 0);

        let status = store.read_sync_status();
        assert_eq!(status.phase, SyncPhase::Idle);
        assert_eq!(status.last_sync_ms, Some(10_000));
        assert_eq!(status.pending_count, 0);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn batch_success_drains_the_queue() {
        let (reconciler, store, _monitor, client) = reconciler();
        store.enqueue_operation(draft("/api/a")).unwrap();
        store.enqueue_operation(draft("/api/b")).unwrap();
        client.script_response(batch_response(vec![
            BatchOutcome::success(),
            BatchOutcome::success(),
        ]));

        let summary = reconciler.run_pass().unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.remaining, 0);
        assert_eq!(store.queue_len(), 0);

        // One batch call, addressed to the batch endpoint.
        let seen = client.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://api.example.com/sync/batch");
        assert_eq!(seen[0].method, HttpMethod::Post);
    }

    #[test]
    fn server_rejection_schedules_a_retry() {
        let (reconciler, store, _monitor, client) = reconciler();
        let id = store.enqueue_operation(draft("/api/a")).unwrap();
        client.script_response(batch_response(vec![BatchOutcome::failure("conflict")]));

        let summary = reconciler.run_pass().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.remaining, 1);
        assert!(!summary.errors[0].exhausted);
        assert_eq!(summary.errors[0].operation_id, id);
        assert_eq!(summary.errors[0].error, "conflict");

        let op = &store.pending_operations().unwrap()[0];
        assert_eq!(op.retry_count, 1);
    }

    #[test]
    fn exhausted_operation_is_removed_and_flagged() {
        let (reconciler, store, _monitor, client) = reconciler();
        store
            .enqueue_operation(draft("/api/a").with_max_retries(2))
            .unwrap();

        client.script_response(batch_response(vec![BatchOutcome::failure("down")]));
        let first = reconciler.run_pass().unwrap();
        assert!(!first.errors[0].exhausted);

        client.script_response(batch_response(vec![BatchOutcome::failure("down")]));
        let second = reconciler.run_pass().unwrap();
        assert!(second.errors[0].exhausted);
        assert_eq!(second.remaining, 0);
        assert_eq!(store.queue_len(), 0);

        let status = store.read_sync_status();
        assert_eq!(status.phase, SyncPhase::Error);
        assert_eq!(status.last_error.as_deref(), Some("down"));
    }

    #[test]
    fn failing_pass_keeps_first_error_in_status() {
        let (reconciler, store, _monitor, client) = reconciler();
        store.enqueue_operation(draft("/api/a")).unwrap();
        store.enqueue_operation(draft("/api/b")).unwrap();
        client.script_response(batch_response(vec![
            BatchOutcome::failure("first failure"),
            BatchOutcome::failure("second failure"),
        ]));

        let summary = reconciler.run_pass().unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(
            store.read_sync_status().last_error.as_deref(),
            Some("first failure")
        );
    }

    #[test]
    fn reentrant_pass_from_a_listener_is_rejected() {
        let (reconciler, _store, _monitor, _client) = reconciler();

        let verdicts = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&reconciler);
        let verdicts_in = Arc::clone(&verdicts);
        reconciler.subscribe_results(move |_| {
            verdicts_in
                .lock()
                .push(matches!(inner.run_pass(), Err(EngineError::SyncInProgress)));
        });

        reconciler.run_pass().unwrap();
        assert_eq!(*verdicts.lock(), vec![true]);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let (reconciler, _store, _monitor, _client) = reconciler();

        let calls = Arc::new(Mutex::new(0u32));
        let calls_in = Arc::clone(&calls);
        let id = reconciler.subscribe_results(move |_| *calls_in.lock() += 1);

        reconciler.run_pass().unwrap();
        assert!(reconciler.unsubscribe_results(id));
        reconciler.run_pass().unwrap();

        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn wire_outcomes_feed_the_monitor() {
        let (reconciler, store, monitor, client) = reconciler();
        store.enqueue_operation(draft("/api/a")).unwrap();

        // Nothing scripted: the batch call and the individual replay
        // both fail in transit.
        let summary = reconciler.run_pass().unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!monitor.is_online());

        // A reachable server flips the monitor back.
        client.script_response(batch_response(vec![BatchOutcome::success()]));
        reconciler.run_pass().unwrap();
        assert!(monitor.is_online());
    }
}
