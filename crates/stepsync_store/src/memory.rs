//! In-memory step store.

use crate::backend::StepStore;
use crate::error::StoreResult;
use crate::log::{CommitOutcome, DocumentLog, StepLog};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use stepsync_protocol::{DocId, SessionId, Step};
use tracing::debug;

/// An in-memory step store.
///
/// Each document has its own lock, so commits to different documents never
/// contend. Reads take the document's read lock and therefore observe either
/// the pre- or the post-commit log, never a partial append.
///
/// # Example
///
/// ```rust
/// use stepsync_protocol::DocId;
/// use stepsync_store::{MemoryStepStore, StepStore};
///
/// let store = MemoryStepStore::new();
/// let doc = DocId::new("fresh").unwrap();
/// assert_eq!(store.read(&doc, 0).unwrap().version, 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStepStore {
    docs: RwLock<HashMap<DocId, Arc<RwLock<DocumentLog>>>>,
}

impl MemoryStepStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the document's log if it was ever written.
    fn existing(&self, doc: &DocId) -> Option<Arc<RwLock<DocumentLog>>> {
        self.docs.read().get(doc).cloned()
    }

    /// Returns the document's log, creating it on first use.
    fn document(&self, doc: &DocId) -> Arc<RwLock<DocumentLog>> {
        if let Some(log) = self.existing(doc) {
            return log;
        }
        Arc::clone(self.docs.write().entry(doc.clone()).or_default())
    }

    /// Number of documents that have been written to.
    pub fn document_count(&self) -> usize {
        self.docs.read().len()
    }
}

impl StepStore for MemoryStepStore {
    fn read(&self, doc: &DocId, since: u64) -> StoreResult<StepLog> {
        match self.existing(doc) {
            Some(log) => log.read().read(since),
            None => DocumentLog::new().read(since),
        }
    }

    fn commit_if_version_matches(
        &self,
        doc: &DocId,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome> {
        let log = self.document(doc);
        let mut log = log.write();
        let count = steps.len();
        let outcome = log.commit(expected, steps, origins)?;
        match &outcome {
            CommitOutcome::Committed { version } => {
                debug!(%doc, count, version, "committed steps");
            }
            CommitOutcome::Conflict(tail) => {
                debug!(%doc, expected, current = tail.version, "commit rejected");
            }
        }
        Ok(outcome)
    }

    fn reset(&self, doc: &DocId) -> StoreResult<()> {
        self.document(doc).write().clear();
        debug!(%doc, "document reset");
        Ok(())
    }

    fn version(&self, doc: &DocId) -> StoreResult<u64> {
        Ok(self.existing(doc).map_or(0, |log| log.read().version()))
    }
}
