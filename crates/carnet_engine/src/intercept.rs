//! Request interception.
//!
//! The gateway sits where the application would otherwise call its HTTP
//! client directly. Reads get cache write-through and cache fallback;
//! writes that cannot reach the server are captured into the durable
//! queue instead of being lost.

use crate::config::EngineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{EngineError, EngineResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use carnet_protocol::{OperationDraft, OperationKind, ProtocolError};
use carnet_store::DurableStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builds the cache slot name for a response.
///
/// Query pairs are sorted so that `?b=2&a=1` and `?a=1&b=2` share a
/// slot; without a query the `?` is dropped entirely.
pub fn cache_key(class_tag: &str, path: &str, query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
    if pairs.is_empty() {
        return format!("{class_tag}:{path}");
    }
    pairs.sort_unstable();
    format!("{class_tag}:{path}?{}", pairs.join("&"))
}

/// One caching rule: responses under `path_prefix` are cached in the
/// `class_tag` namespace for `ttl`.
#[derive(Debug, Clone)]
pub struct CacheRule {
    /// Path prefix the rule applies to.
    pub path_prefix: String,
    /// Namespace tag for the cache key.
    pub class_tag: String,
    /// Entry lifetime. `None` never expires.
    pub ttl: Option<Duration>,
}

/// Ordered caching rules; the first matching prefix wins.
///
/// Paths with no matching rule are not cached at all.
///
/// # Example
///
/// ```
/// use carnet_engine::CachePolicy;
/// use std::time::Duration;
///
/// let policy = CachePolicy::new()
///     .with_rule("/academics/classes", "classes", Some(Duration::from_secs(120 * 60)))
///     .with_rule("/academics", "academics", Some(Duration::from_secs(30 * 60)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    rules: Vec<CacheRule>,
}

impl CachePolicy {
    /// Creates an empty policy: nothing is cached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Earlier rules take precedence.
    pub fn with_rule(
        mut self,
        path_prefix: impl Into<String>,
        class_tag: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        self.rules.push(CacheRule {
            path_prefix: path_prefix.into(),
            class_tag: class_tag.into(),
            ttl,
        });
        self
    }

    /// The first rule whose prefix matches `path`, if any.
    #[must_use]
    pub fn rule_for(&self, path: &str) -> Option<&CacheRule> {
        self.rules
            .iter()
            .find(|rule| path.starts_with(&rule.path_prefix))
    }
}

/// What became of an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The caller has a response, live or cached.
    Response {
        /// The HTTP response.
        response: HttpResponse,
        /// Whether the body came from the local cache.
        from_cache: bool,
    },
    /// The mutation was captured for later replay.
    Queued {
        /// Store-assigned id of the queued operation.
        operation_id: u64,
    },
}

impl FetchResult {
    /// Whether the request was queued instead of answered.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// Whether the response body came from the cache.
    #[must_use]
    pub fn is_from_cache(&self) -> bool {
        matches!(self, Self::Response { from_cache: true, .. })
    }
}

/// Intercepts application requests and makes them offline-safe.
///
/// Requests carry paths relative to the configured base URL; the
/// gateway prefixes them on the way out, which also keeps queued
/// endpoints portable across environments.
///
/// # Rules
///
/// - A mutation while offline, or one that fails in transit, is queued
///   and reported as [`FetchResult::Queued`]. A transit failure also
///   marks the monitor offline.
/// - A mutation the server answered passes through untouched, whatever
///   the status.
/// - A successful GET is written through to the cache when a
///   [`CachePolicy`] rule covers its path.
/// - A GET that fails in transit is served from the cache when
///   possible; otherwise [`EngineError::Unreachable`] is returned.
///   Server-delivered errors never fall back to the cache.
///
/// GETs are always attempted regardless of the monitor's flag: the flag
/// is optimistic, and only a real transport failure proves the network
/// is down.
pub struct OfflineGateway<C: HttpClient> {
    config: EngineConfig,
    store: Arc<DurableStore>,
    monitor: Arc<ConnectivityMonitor>,
    client: Arc<C>,
    policy: CachePolicy,
}

impl<C: HttpClient> OfflineGateway<C> {
    /// Creates a gateway over shared engine components.
    pub fn new(
        config: EngineConfig,
        store: Arc<DurableStore>,
        monitor: Arc<ConnectivityMonitor>,
        client: Arc<C>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            config,
            store,
            monitor,
            client,
            policy,
        }
    }

    /// Executes a request with offline handling.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unreachable`] for a GET with no response
    /// and no cached copy, [`EngineError::Protocol`] for a mutating
    /// body that is not valid JSON, and [`EngineError::Store`] when
    /// capture or cache persistence fails.
    pub fn execute(&self, request: HttpRequest) -> EngineResult<FetchResult> {
        match OperationKind::from_method(request.method) {
            Some(kind) => self.execute_mutation(kind, request),
            None => self.execute_read(request),
        }
    }

    fn execute_mutation(
        &self,
        kind: OperationKind,
        request: HttpRequest,
    ) -> EngineResult<FetchResult> {
        if !self.monitor.is_online() {
            let operation_id = self.capture(kind, &request)?;
            return Ok(FetchResult::Queued { operation_id });
        }

        match self.client.send(self.to_wire(&request)) {
            Ok(response) => Ok(FetchResult::Response {
                response,
                from_cache: false,
            }),
            Err(err) => {
                debug!(error = %err, endpoint = %request.url, "mutation failed in transit; capturing");
                self.monitor.mark_offline();
                let operation_id = self.capture(kind, &request)?;
                Ok(FetchResult::Queued { operation_id })
            }
        }
    }

    fn execute_read(&self, request: HttpRequest) -> EngineResult<FetchResult> {
        let slot = self.cache_slot(&request.url);

        match self.client.send(self.to_wire(&request)) {
            Ok(response) => {
                if response.is_success() {
                    if let Some((key, ttl)) = &slot {
                        self.store.put_cache_entry(key, &response.body, *ttl)?;
                    }
                }
                Ok(FetchResult::Response {
                    response,
                    from_cache: false,
                })
            }
            Err(err) => {
                if let Some((key, _)) = &slot {
                    if let Some(body) = self.store.get_cache_entry(key)? {
                        debug!(cache_key = %key, "network unreachable; serving cached response");
                        return Ok(FetchResult::Response {
                            response: HttpResponse::new(200, body),
                            from_cache: true,
                        });
                    }
                }
                Err(EngineError::unreachable(err.to_string()))
            }
        }
    }

    /// Queues a mutation for later replay.
    ///
    /// The body must be valid JSON (or absent): the batch protocol
    /// embeds payloads as JSON values, so anything else cannot be
    /// replayed and is rejected here rather than lost later.
    fn capture(&self, kind: OperationKind, request: &HttpRequest) -> EngineResult<u64> {
        let payload = match request.body.as_deref() {
            None | Some([]) => None,
            Some(bytes) => Some(serde_json::from_slice(bytes).map_err(ProtocolError::from)?),
        };

        let draft = OperationDraft {
            kind,
            endpoint: request.url.clone(),
            method: request.method,
            payload,
            headers: request.headers.clone(),
            max_retries: self.config.default_max_retries,
        };

        let operation_id = self.store.enqueue_operation(draft)?;
        debug!(operation_id, endpoint = %request.url, "mutation queued for replay");
        Ok(operation_id)
    }

    /// The cache slot for a relative URL, per the policy.
    fn cache_slot(&self, url: &str) -> Option<(String, Option<Duration>)> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, query),
            None => (url, ""),
        };
        let rule = self.policy.rule_for(path)?;
        Some((cache_key(&rule.class_tag, path, query), rule.ttl))
    }

    /// Resolves a relative request against the base URL and applies the
    /// default timeout.
    fn to_wire(&self, request: &HttpRequest) -> HttpRequest {
        HttpRequest {
            method: request.method,
            url: format!("{}{}", self.config.base_url, request.url),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: request.timeout.or(Some(self.config.request_timeout)),
        }
    }
}
