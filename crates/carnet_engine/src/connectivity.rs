//! Connectivity tracking.
//!
//! The monitor keeps an optimistic online/offline flag and tells
//! subscribers when it flips. The flag is a hint, not a guarantee: the
//! gateway always tries real requests and feeds the outcome back, and
//! [`ConnectivityMonitor::probe_reachability`] can ask the server
//! directly.

use crate::http::{HttpClient, HttpRequest};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Identifies a registered listener for later removal.
pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(bool) + Send + Sync>;

/// Tracks whether the remote API is believed reachable.
///
/// # Thread Safety
///
/// All methods take `&self`; the monitor is normally shared as
/// `Arc<ConnectivityMonitor>`. Listeners run synchronously on the thread
/// that reported the transition and must not subscribe or unsubscribe
/// from inside the callback.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    next_subscription: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial belief.
    pub fn new(initial_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initial_online),
            next_subscription: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Whether the remote API is currently believed reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records a connectivity change.
    ///
    /// Platform integrations call this from their network-change events.
    /// Listeners are notified in registration order, and only when the
    /// value actually flips; repeating the current state is free.
    pub fn set_online(&self, online: bool) {
        // The write lock serializes transitions so notifications cannot
        // arrive out of order.
        let listeners = self.listeners.write();
        let was = self.online.swap(online, Ordering::SeqCst);
        if was == online {
            return;
        }
        debug!(online, "connectivity changed");
        for (_, listener) in listeners.iter() {
            listener(online);
        }
    }

    /// Records evidence that the network is down.
    ///
    /// Called by the gateway and the reconciler when a request fails at
    /// the transport level; a failed request outranks an optimistic flag.
    pub fn mark_offline(&self) {
        self.set_online(false);
    }

    /// Registers a listener for connectivity transitions.
    ///
    /// The listener receives the new state, `true` for online.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Asks the server whether it is reachable.
    ///
    /// GETs `health_url` with the given timeout and treats anything but
    /// a 2xx response as unreachable. The verdict is fed back through
    /// [`Self::set_online`], so subscribers hear about a flip. Never
    /// errors; an unanswerable probe simply returns `false`.
    pub fn probe_reachability(
        &self,
        client: &dyn HttpClient,
        health_url: &str,
        timeout: Duration,
    ) -> bool {
        let request = HttpRequest::get(health_url).with_timeout(timeout);
        let reachable = match client.send(request) {
            Ok(response) => response.is_success(),
            Err(err) => {
                debug!(error = %err, "reachability probe failed");
                false
            }
        };
        self.set_online(reachable);
        reachable
    }
}
