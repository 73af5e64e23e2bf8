//! Document and session identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest document id accepted, in bytes.
pub const MAX_DOC_ID_LEN: usize = 256;

/// Identifier of a shared document.
///
/// Document ids appear verbatim as a URL path segment, so they may not be
/// empty and may not contain `/`, `?`, `#`, `%`, whitespace or control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(String);

impl DocId {
    /// Creates a document id, validating it.
    pub fn new(id: impl Into<String>) -> ProtocolResult<Self> {
        let id = id.into();
        if let Some(reason) = Self::rejection(&id) {
            return Err(ProtocolError::InvalidDocId { id, reason });
        }
        Ok(Self(id))
    }

    fn rejection(id: &str) -> Option<&'static str> {
        if id.is_empty() {
            return Some("empty");
        }
        if id.len() > MAX_DOC_ID_LEN {
            return Some("too long");
        }
        if id
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
        {
            return Some("contains a reserved character");
        }
        None
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DocId {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> Self {
        id.0
    }
}

/// Identifier of an editing session, attached to every step it produces.
///
/// Stable for the lifetime of a session; a reopened document gets a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random (UUID v4) session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_validation() {
        assert!(DocId::new("doc1").is_ok());
        assert!(DocId::new("notes_2024-01.draft~v2").is_ok());

        assert!(DocId::new("").is_err());
        assert!(DocId::new("a/b").is_err());
        assert!(DocId::new("a?b").is_err());
        assert!(DocId::new("a b").is_err());
        assert!(DocId::new("x".repeat(MAX_DOC_ID_LEN + 1)).is_err());
    }

    #[test]
    fn doc_id_rejects_on_deserialize() {
        let ok: DocId = serde_json::from_str("\"doc1\"").unwrap();
        assert_eq!(ok.as_str(), "doc1");
        assert!(serde_json::from_str::<DocId>("\"a/b\"").is_err());
    }

    #[test]
    fn generated_session_ids_differ() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn session_id_is_a_plain_json_string() {
        let id = SessionId::new("s-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s-1\"");
    }
}
