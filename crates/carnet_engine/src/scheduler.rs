//! Pass scheduling.
//!
//! One worker thread triggers reconciliation passes: periodically on a
//! fixed interval, and immediately when connectivity comes back. The
//! worker is the only thread the engine spawns.

use crate::connectivity::{ConnectivityMonitor, SubscriptionId};
use crate::error::EngineError;
use crate::http::HttpClient;
use crate::reconcile::Reconciler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Triggers reconciliation passes until stopped.
///
/// Passes run only while the monitor believes the network is up; a
/// scheduled trigger that collides with a pass already in flight is
/// dropped, not queued. Manual force-sync is just calling
/// [`Reconciler::run_pass`] directly.
pub struct SyncScheduler {
    shutdown: Arc<AtomicBool>,
    wake: Sender<()>,
    worker: Option<JoinHandle<()>>,
    monitor: Arc<ConnectivityMonitor>,
    subscription: SubscriptionId,
}

impl SyncScheduler {
    /// Spawns the worker thread.
    ///
    /// The worker wakes every `interval`, and immediately on an
    /// offline-to-online transition of the monitor.
    pub fn start<C: HttpClient + 'static>(
        reconciler: Arc<Reconciler<C>>,
        monitor: Arc<ConnectivityMonitor>,
        interval: Duration,
    ) -> Self {
        let (wake, triggers) = mpsc::channel::<()>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let back_online = wake.clone();
        let subscription = monitor.subscribe(move |online| {
            if online {
                let _ = back_online.send(());
            }
        });

        let worker_shutdown = Arc::clone(&shutdown);
        let worker_monitor = Arc::clone(&monitor);
        let worker = std::thread::spawn(move || loop {
            match triggers.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if worker_shutdown.load(Ordering::SeqCst) {
                break;
            }
            if !worker_monitor.is_online() {
                debug!("skipping scheduled pass while offline");
                continue;
            }
            match reconciler.run_pass() {
                Ok(_) => {}
                Err(EngineError::SyncInProgress) => {
                    debug!("dropping trigger; a pass is already running");
                }
                Err(err) => warn!(error = %err, "scheduled pass failed"),
            }
        });

        Self {
            shutdown,
            wake,
            worker: Some(worker),
            monitor,
            subscription,
        }
    }

    /// Stops the worker and waits for it to finish.
    ///
    /// Idempotent; also runs on drop. An in-flight pass is not cancelled,
    /// only future triggers are.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
        let _ = worker.join();
        self.monitor.unsubscribe(self.subscription);
        debug!("scheduler stopped");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
