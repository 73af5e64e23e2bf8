//! Protocol messages for the collab endpoints.

use crate::error::ProtocolResult;
use crate::ids::SessionId;
use crate::step::Step;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message returned by a successful reset.
pub const RESET_MESSAGE: &str = "Document reset successfully.";

/// `error` field of a 409 conflict body.
pub const CONFLICT_ERROR: &str = "Version conflict";

/// JSON encoding shared by every wire message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to JSON bytes.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A slice of a document's step log.
///
/// Returned by `GET /collab/{docId}/steps` and as the body of a 409 conflict.
/// `version` is the server's current version, so after applying `steps` the
/// receiver is at `version`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsResponse {
    /// Steps committed after the requested version, in log order.
    pub steps: Vec<Step>,
    /// Origin session of each step, parallel to `steps`.
    pub origin_ids: Vec<SessionId>,
    /// Current document version.
    pub version: u64,
    /// Present only on 409 responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepsResponse {
    /// Creates a steps response.
    pub fn new(steps: Vec<Step>, origin_ids: Vec<SessionId>, version: u64) -> Self {
        Self {
            steps,
            origin_ids,
            version,
            error: None,
        }
    }

    /// Marks this response as the body of a version conflict.
    pub fn into_conflict(mut self) -> Self {
        self.error = Some(CONFLICT_ERROR.to_string());
        self
    }

    /// Version the first returned step was committed at.
    pub fn base_version(&self) -> u64 {
        self.version.saturating_sub(self.steps.len() as u64)
    }

    /// Returns true if the log has nothing past the requested version.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl WireMessage for StepsResponse {}

/// Body of `POST /collab/{docId}/steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostStepsRequest {
    /// Version the steps were produced against.
    pub base_version: u64,
    /// Steps to append.
    pub steps: Vec<Step>,
    /// Session that produced the steps.
    pub session_id: SessionId,
    /// Optional per-step origins; when absent every step is tagged with
    /// `session_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_ids: Option<Vec<SessionId>>,
}

impl PostStepsRequest {
    /// Creates a push request.
    pub fn new(base_version: u64, steps: Vec<Step>, session_id: SessionId) -> Self {
        Self {
            base_version,
            steps,
            session_id,
            origin_ids: None,
        }
    }

    /// Resolves the origin id of every step.
    ///
    /// Returns `None` if explicit origins were given with the wrong length.
    pub fn resolved_origins(&self) -> Option<Vec<SessionId>> {
        match &self.origin_ids {
            Some(ids) if ids.len() == self.steps.len() => Some(ids.clone()),
            Some(_) => None,
            None => Some(vec![self.session_id.clone(); self.steps.len()]),
        }
    }
}

impl WireMessage for PostStepsRequest {}

/// 200 body of `POST /collab/{docId}/steps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStepsAccepted {
    /// Version after the commit.
    pub version: u64,
}

impl WireMessage for PostStepsAccepted {}

/// Outcome of a push, as seen by a caller of the service.
#[derive(Debug, Clone, PartialEq)]
pub enum PostStepsResponse {
    /// Steps were appended; the document is now at `version`.
    Accepted {
        /// New version.
        version: u64,
    },
    /// The base version was stale; the tail since the base is returned.
    Conflict(StepsResponse),
}

impl PostStepsResponse {
    /// Returns true if the push was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, PostStepsResponse::Accepted { .. })
    }

    /// The authoritative version reported by the server.
    pub fn version(&self) -> u64 {
        match self {
            PostStepsResponse::Accepted { version } => *version,
            PostStepsResponse::Conflict(tail) => tail.version,
        }
    }
}

/// Body of a successful `POST /collab/{docId}/reset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Human readable confirmation.
    pub message: String,
}

impl Default for ResetResponse {
    fn default() -> Self {
        Self {
            message: RESET_MESSAGE.to_string(),
        }
    }
}

impl WireMessage for ResetResponse {}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server answers.
    pub status: String,
}

impl HealthResponse {
    /// A healthy response.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

impl WireMessage for HealthResponse {}

/// Machine-readable error classification carried in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Malformed request.
    InvalidRequest,
    /// Requested version is beyond the document's history.
    OutOfRangeVersion,
    /// Unknown route.
    NotFound,
    /// Known route, wrong method.
    MethodNotAllowed,
    /// Body or batch exceeds the configured limits.
    PayloadTooLarge,
    /// Store-level failure; retry later.
    StorageUnavailable,
    /// Anything else.
    Internal,
}

impl ErrorCode {
    /// HTTP status used for this code.
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::OutOfRangeVersion => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::StorageUnavailable => 503,
            ErrorCode::Internal => 500,
        }
    }
}

/// Body of every non-2xx response except 409.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message.
    pub error: String,
    /// Classification.
    pub code: ErrorCode,
    /// Server's current version, set for `outOfRangeVersion`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            version: None,
        }
    }

    /// Attaches the server's current version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

impl WireMessage for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(n: u64) -> Step {
        Step::new(json!({ "n": n }))
    }

    #[test]
    fn post_request_field_names() {
        let request = PostStepsRequest::new(4, vec![step(1)], SessionId::new("a"));
        let value: serde_json::Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "baseVersion": 4, "steps": [{ "n": 1 }], "sessionId": "a" })
        );
    }

    #[test]
    fn steps_response_field_names() {
        let response = StepsResponse::new(vec![step(1)], vec![SessionId::new("a")], 1);
        let value: serde_json::Value = serde_json::from_slice(&response.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "steps": [{ "n": 1 }], "originIds": ["a"], "version": 1 })
        );

        let conflict = response.into_conflict();
        let value: serde_json::Value = serde_json::from_slice(&conflict.encode().unwrap()).unwrap();
        assert_eq!(value["error"], json!(CONFLICT_ERROR));
    }

    #[test]
    fn base_version_of_tail() {
        let response = StepsResponse::new(
            vec![step(1), step(2)],
            vec![SessionId::new("a"), SessionId::new("b")],
            7,
        );
        assert_eq!(response.base_version(), 5);
        assert!(!response.is_empty());
    }

    #[test]
    fn resolved_origins() {
        let mut request =
            PostStepsRequest::new(0, vec![step(1), step(2)], SessionId::new("self"));
        assert_eq!(
            request.resolved_origins().unwrap(),
            vec![SessionId::new("self"), SessionId::new("self")]
        );

        request.origin_ids = Some(vec![SessionId::new("x"), SessionId::new("y")]);
        assert_eq!(
            request.resolved_origins().unwrap(),
            vec![SessionId::new("x"), SessionId::new("y")]
        );

        request.origin_ids = Some(vec![SessionId::new("x")]);
        assert!(request.resolved_origins().is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(PostStepsRequest::decode(b"not json").is_err());
        assert!(PostStepsRequest::decode(br#"{"steps": []}"#).is_err());
    }

    #[test]
    fn error_codes_map_to_statuses() {
        assert_eq!(ErrorCode::OutOfRangeVersion.status(), 400);
        assert_eq!(ErrorCode::StorageUnavailable.status(), 503);

        let body = ErrorResponse::new(ErrorCode::OutOfRangeVersion, "too far").with_version(2);
        let value: serde_json::Value = serde_json::from_slice(&body.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "error": "too far", "code": "outOfRangeVersion", "version": 2 })
        );
    }
}
