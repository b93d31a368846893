//! Batch request and response messages for the remote sync endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::{HttpMethod, OperationKind, PendingOperation};

/// One operation as shipped inside a batch request.
///
/// Retry bookkeeping stays local; the remote side only sees what it
/// needs to apply the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Client-assigned operation id, echoed back for correlation.
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
    /// Headers captured at enqueue, replayed by the remote side.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl BatchItem {
    /// Project a queued operation onto its wire form.
    pub fn from_operation(op: &PendingOperation) -> Self {
        Self {
            id: op.id,
            kind: op.kind,
            endpoint: op.endpoint.clone(),
            method: op.method,
            payload: op.payload.clone(),
            headers: op.headers.clone(),
        }
    }
}

/// A chunk of queued operations, posted to the batch endpoint in
/// enqueue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Operations to apply, oldest first.
    pub operations: Vec<BatchItem>,
}

impl BatchRequest {
    /// Build a request from a slice of queued operations.
    pub fn from_operations(ops: &[PendingOperation]) -> Self {
        Self {
            operations: ops.iter().map(BatchItem::from_operation).collect(),
        }
    }

    /// Serialize to the JSON body of the batch POST.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a batch request body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Per-operation verdict inside a [`BatchResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Whether the remote side applied the operation.
    pub success: bool,
    /// Failure description, present when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional server payload, e.g. the created entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl BatchOutcome {
    /// An applied operation.
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    /// An applied operation with a server payload.
    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    /// A rejected operation.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// Response from the batch endpoint.
///
/// Results are positional: `results[i]` answers `operations[i]` of the
/// request. A response whose length does not match the request is
/// rejected rather than guessed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// One outcome per submitted operation, in request order.
    pub results: Vec<BatchOutcome>,
}

impl BatchResponse {
    /// Serialize to a JSON body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a batch response body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Check the positional contract against the submitted chunk size.
    pub fn check_alignment(&self, expected: usize) -> ProtocolResult<()> {
        if self.results.len() == expected {
            Ok(())
        } else {
            Err(ProtocolError::MisalignedResults {
                expected,
                got: self.results.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationDraft;

    fn sample_op(id: u64, endpoint: &str) -> PendingOperation {
        let draft = OperationDraft::new(HttpMethod::Post, endpoint)
            .unwrap()
            .with_payload(serde_json::json!({"id": id}));
        PendingOperation::from_draft(draft, id, 1_000 + id)
    }

    #[test]
    fn batch_item_drops_local_bookkeeping() {
        let mut op = sample_op(9, "/api/notes");
        op.retry_count = 2;
        op.headers = vec![("authorization".into(), "Bearer t".into())];
        let item = BatchItem::from_operation(&op);

        let encoded = serde_json::to_string(&item).unwrap();
        assert!(!encoded.contains("retry_count"));
        assert!(!encoded.contains("enqueued_at_ms"));
        assert!(encoded.contains("\"id\":9"));
        assert!(encoded.contains("authorization"));
    }

    #[test]
    fn request_preserves_operation_order() {
        let ops: Vec<_> = (1..=4).map(|i| sample_op(i, "/api/notes")).collect();
        let request = BatchRequest::from_operations(&ops);

        let ids: Vec<u64> = request.operations.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn request_round_trips_through_json() {
        let ops: Vec<_> = (1..=3).map(|i| sample_op(i, "/api/notes")).collect();
        let request = BatchRequest::from_operations(&ops);

        let decoded = BatchRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_alignment_accepts_matching_length() {
        let response = BatchResponse {
            results: vec![BatchOutcome::success(), BatchOutcome::failure("conflict")],
        };
        assert!(response.check_alignment(2).is_ok());
    }

    #[test]
    fn response_alignment_rejects_short_response() {
        let response = BatchResponse {
            results: vec![BatchOutcome::success()],
        };
        let err = response.check_alignment(3).unwrap_err();
        match err {
            ProtocolError::MisalignedResults { expected, got } => {
                assert_eq!(expected, 3);
                assert_eq!(got, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn outcome_decodes_with_missing_optional_fields() {
        let decoded: BatchOutcome = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(decoded.success);
        assert!(decoded.error.is_none());
        assert!(decoded.data.is_none());
    }

    #[test]
    fn failure_outcome_carries_message() {
        let outcome = BatchOutcome::failure("validation failed");
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("validation failed"));
    }
}
