//! Step store trait definition.

use crate::error::StoreResult;
use crate::log::{CommitOutcome, StepLog};
use stepsync_protocol::{DocId, SessionId, Step};

/// A keyed collection of per-document step logs.
///
/// Stores are **opaque ledgers**: they order and version steps but never
/// interpret them. Rebasing is entirely the client's job.
///
/// # Invariants
///
/// - A document that was never written reads as empty at version 0
/// - `version` equals the number of committed steps and only grows, except
///   through [`reset`](StepStore::reset)
/// - `commit_if_version_matches` is atomic per document: of any number of
///   concurrent commits against the same expected version, at most one
///   succeeds
/// - A commit that fails with an error leaves the log untouched
/// - Implementations must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::MemoryStepStore`] - For testing
/// - [`super::FileStepStore`] - For persistent storage
pub trait StepStore: Send + Sync {
    /// Returns the steps committed after `since`, their origins and the
    /// current version.
    ///
    /// # Errors
    ///
    /// - `OutOfRangeVersion` if `since` is past the current version
    /// - `Unavailable`/`Io` on storage failure
    fn read(&self, doc: &DocId, since: u64) -> StoreResult<StepLog>;

    /// Appends `steps` iff the document is at `expected`.
    ///
    /// On a version mismatch returns [`CommitOutcome::Conflict`] with the
    /// steps committed since `expected`.
    ///
    /// # Errors
    ///
    /// - `InvalidBatch` if `steps` and `origins` differ in length
    /// - `Unavailable`/`Io` on storage failure (nothing is appended)
    fn commit_if_version_matches(
        &self,
        doc: &DocId,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome>;

    /// Truncates the document to version 0. Unconditional and idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn reset(&self, doc: &DocId) -> StoreResult<()>;

    /// Returns the current version of a document.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn version(&self, doc: &DocId) -> StoreResult<u64>;
}

impl<S: StepStore + ?Sized> StepStore for std::sync::Arc<S> {
    fn read(&self, doc: &DocId, since: u64) -> StoreResult<StepLog> {
        (**self).read(doc, since)
    }

    fn commit_if_version_matches(
        &self,
        doc: &DocId,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome> {
        (**self).commit_if_version_matches(doc, expected, steps, origins)
    }

    fn reset(&self, doc: &DocId) -> StoreResult<()> {
        (**self).reset(doc)
    }

    fn version(&self, doc: &DocId) -> StoreResult<u64> {
        (**self).version(doc)
    }
}
