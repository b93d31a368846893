//! HTTP client abstraction.
//!
//! The engine never opens sockets itself. Implement [`HttpClient`] over
//! the HTTP library of your choice (reqwest, ureq, hyper, ...) and hand
//! it to the gateway and the reconciler.

use carnet_protocol::HttpMethod;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// An HTTP request as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Target URL. The gateway accepts paths relative to its configured
    /// base URL and prefixes them before the request goes on the wire.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
    /// Per-request timeout. `None` lets the configured default apply.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Creates a request with no headers, body, or timeout.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a POST request with a body.
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(HttpMethod::Post, url).with_body(body)
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An HTTP response obtained from the server.
///
/// Any response, including 4xx and 5xx, means the network worked; those
/// statuses are application answers, not transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A transport-level failure: no HTTP response was obtained.
///
/// DNS errors, refused connections, and timeouts land here. Server
/// error statuses do not; they arrive as ordinary [`HttpResponse`]s.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Failure description.
    pub message: String,
    /// Whether the failure was a timeout.
    pub timed_out: bool,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a timeout error.
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

/// Sends HTTP requests on behalf of the engine.
///
/// # Contract
///
/// `Err` means the request never produced an HTTP response. A response
/// with an error status must come back as `Ok`; the engine decides what
/// a 4xx or 5xx means in context.
pub trait HttpClient: Send + Sync {
    /// Sends a request and waits for the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// A request observed by a [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Full URL the engine asked for.
    pub url: String,
    /// Headers as sent.
    pub headers: Vec<(String, String)>,
    /// Body as sent.
    pub body: Option<Vec<u8>>,
}

/// A scripted client for tests.
///
/// Results are consumed in FIFO order, one per `send`; every request is
/// recorded for later assertions. An exhausted script fails like a dead
/// network, so a client with nothing scripted doubles as an unreachable
/// server.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    /// Creates a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for a future `send`.
    pub fn script_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a transport failure for a future `send`.
    pub fn script_transport_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpClient for ScriptedClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
        });
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("no scripted result")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_the_2xx_range() {
        assert!(HttpResponse::new(200, Vec::new()).is_success());
        assert!(HttpResponse::new(204, Vec::new()).is_success());
        assert!(HttpResponse::new(299, Vec::new()).is_success());
        assert!(!HttpResponse::new(199, Vec::new()).is_success());
        assert!(!HttpResponse::new(301, Vec::new()).is_success());
        assert!(!HttpResponse::new(404, Vec::new()).is_success());
        assert!(!HttpResponse::new(500, Vec::new()).is_success());
    }

    #[test]
    fn request_builders_compose() {
        let request = HttpRequest::get("/health")
            .with_header("accept", "application/json")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "/health");
        assert_eq!(request.headers.len(), 1);
        assert!(request.body.is_none());
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn scripted_results_come_back_in_order() {
        let client = ScriptedClient::new();
        client.script_response(HttpResponse::new(200, b"first".to_vec()));
        client.script_transport_error(TransportError::timed_out("deadline"));
        client.script_response(HttpResponse::new(500, b"third".to_vec()));

        let first = client.send(HttpRequest::get("/a")).unwrap();
        assert_eq!(first.body, b"first");

        let second = client.send(HttpRequest::get("/b")).unwrap_err();
        assert!(second.timed_out);

        let third = client.send(HttpRequest::get("/c")).unwrap();
        assert_eq!(third.status, 500);
    }

    #[test]
    fn exhausted_script_fails_like_a_dead_network() {
        let client = ScriptedClient::new();
        let err = client.send(HttpRequest::get("/a")).unwrap_err();
        assert!(!err.timed_out);
        assert_eq!(err.message, "no scripted result");
    }

    #[test]
    fn every_request_is_recorded() {
        let client = ScriptedClient::new();
        client.script_response(HttpResponse::new(200, Vec::new()));

        let request = HttpRequest::post("/api/items", b"{}".to_vec())
            .with_header("authorization", "Bearer t");
        client.send(request).unwrap();
        let _ = client.send(HttpRequest::get("/api/items"));

        let seen = client.requests();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].url, "/api/items");
        assert_eq!(seen[0].headers.len(), 1);
        assert_eq!(seen[0].body.as_deref(), Some(b"{}".as_slice()));
        assert_eq!(seen[1].method, HttpMethod::Get);
    }
}
