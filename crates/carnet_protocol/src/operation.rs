//! Captured HTTP mutations awaiting replay.

use serde::{Deserialize, Serialize};

/// Default number of delivery attempts before an operation is parked.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP method of a captured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Read a resource.
    Get,
    /// Create a resource.
    Post,
    /// Replace a resource.
    Put,
    /// Partially update a resource.
    Patch,
    /// Remove a resource.
    Delete,
}

impl HttpMethod {
    /// Uppercase wire form of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method changes remote state and must be queued when
    /// the network is unavailable.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a mutation, carried alongside the raw method so the
/// remote batch endpoint can dispatch without re-parsing verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// POST.
    Create,
    /// PUT or PATCH.
    Update,
    /// DELETE.
    Delete,
}

impl OperationKind {
    /// Classify a mutating method. Returns `None` for GET, which is never
    /// queued.
    pub fn from_method(method: HttpMethod) -> Option<Self> {
        match method {
            HttpMethod::Post => Some(Self::Create),
            HttpMethod::Put | HttpMethod::Patch => Some(Self::Update),
            HttpMethod::Delete => Some(Self::Delete),
            HttpMethod::Get => None,
        }
    }
}

/// A mutation captured while offline, not yet assigned a queue slot.
///
/// Drafts come out of the interception layer; the durable store stamps
/// them with an id and an enqueue time to produce a [`PendingOperation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDraft {
    /// Mutation classification.
    pub kind: OperationKind,
    /// Relative endpoint path, e.g. `/api/tasks/42`.
    pub endpoint: String,
    /// Original HTTP method.
    pub method: HttpMethod,
    /// Request body, if any. Opaque JSON; never inspected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Headers to replay with the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// Attempt ceiling for this operation.
    pub max_retries: u32,
}

impl OperationDraft {
    /// Draft a mutation for the given method and endpoint.
    ///
    /// Returns `None` for GET; reads are served from cache, not queued.
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Option<Self> {
        OperationKind::from_method(method).map(|kind| Self {
            kind,
            endpoint: endpoint.into(),
            method,
            payload: None,
            headers: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Attach a JSON body.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach headers to replay verbatim.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Override the attempt ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// A queued mutation with its delivery bookkeeping.
///
/// Ids are assigned by the durable store in strictly increasing order,
/// so sorting by id reproduces enqueue order after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Store-assigned id, unique and monotonic within one store.
    pub id: u64,
    /// Mutation classification.
    pub kind: OperationKind,
    /// Relative endpoint path.
    pub endpoint: String,
    /// Original HTTP method.
    pub method: HttpMethod,
    /// Request body, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Headers to replay with the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// Milliseconds since the Unix epoch at enqueue time.
    pub enqueued_at_ms: u64,
    /// Failed delivery attempts so far.
    pub retry_count: u32,
    /// Attempt ceiling; the operation is parked once `retry_count`
    /// reaches it.
    pub max_retries: u32,
}

impl PendingOperation {
    /// Stamp a draft with its queue slot.
    pub fn from_draft(draft: OperationDraft, id: u64, enqueued_at_ms: u64) -> Self {
        Self {
            id,
            kind: draft.kind,
            endpoint: draft.endpoint,
            method: draft.method,
            payload: draft.payload,
            headers: draft.headers,
            enqueued_at_ms,
            retry_count: 0,
            max_retries: draft.max_retries,
        }
    }

    /// Whether the operation has used up its delivery attempts.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_not_mutating() {
        assert!(!HttpMethod::Get.is_mutating());
        for method in [
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
        ] {
            assert!(method.is_mutating(), "{method} should be mutating");
        }
    }

    #[test]
    fn kind_classification_matches_method() {
        assert_eq!(
            OperationKind::from_method(HttpMethod::Post),
            Some(OperationKind::Create)
        );
        assert_eq!(
            OperationKind::from_method(HttpMethod::Put),
            Some(OperationKind::Update)
        );
        assert_eq!(
            OperationKind::from_method(HttpMethod::Patch),
            Some(OperationKind::Update)
        );
        assert_eq!(
            OperationKind::from_method(HttpMethod::Delete),
            Some(OperationKind::Delete)
        );
        assert_eq!(OperationKind::from_method(HttpMethod::Get), None);
    }

    #[test]
    fn draft_refuses_get() {
        assert!(OperationDraft::new(HttpMethod::Get, "/api/tasks").is_none());
    }

    #[test]
    fn draft_builders_compose() {
        let draft = OperationDraft::new(HttpMethod::Post, "/api/tasks")
            .unwrap()
            .with_payload(serde_json::json!({"title": "water the plants"}))
            .with_headers(vec![("x-request-id".into(), "abc".into())])
            .with_max_retries(5);

        assert_eq!(draft.kind, OperationKind::Create);
        assert_eq!(draft.max_retries, 5);
        assert_eq!(draft.headers.len(), 1);
        assert!(draft.payload.is_some());
    }

    #[test]
    fn stamped_operation_starts_with_zero_retries() {
        let draft = OperationDraft::new(HttpMethod::Delete, "/api/tasks/7").unwrap();
        let op = PendingOperation::from_draft(draft, 12, 1_700_000_000_000);

        assert_eq!(op.id, 12);
        assert_eq!(op.retry_count, 0);
        assert_eq!(op.enqueued_at_ms, 1_700_000_000_000);
        assert!(!op.retries_exhausted());
    }

    #[test]
    fn exhaustion_at_the_ceiling() {
        let draft = OperationDraft::new(HttpMethod::Put, "/api/tasks/7")
            .unwrap()
            .with_max_retries(2);
        let mut op = PendingOperation::from_draft(draft, 1, 0);

        op.retry_count = 1;
        assert!(!op.retries_exhausted());
        op.retry_count = 2;
        assert!(op.retries_exhausted());
    }

    #[test]
    fn operation_json_round_trip() {
        let draft = OperationDraft::new(HttpMethod::Patch, "/api/tasks/3")
            .unwrap()
            .with_payload(serde_json::json!({"done": true}));
        let op = PendingOperation::from_draft(draft, 4, 99);

        let encoded = serde_json::to_string(&op).unwrap();
        let decoded: PendingOperation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn method_serializes_uppercase() {
        let encoded = serde_json::to_string(&HttpMethod::Patch).unwrap();
        assert_eq!(encoded, "\"PATCH\"");
        let decoded: HttpMethod = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(decoded, HttpMethod::Delete);
    }
}
