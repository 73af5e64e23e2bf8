//! In-memory representation of one document's step log.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use stepsync_protocol::{SessionId, Step, StepsResponse};

/// A step together with the session that produced it.
///
/// Its position in the log is the version at which it was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedStep {
    /// The step payload.
    pub step: Step,
    /// Session that produced the step.
    pub origin: SessionId,
}

/// A slice of a log, starting at some version and running to the end.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepLog {
    /// Steps in commit order.
    pub steps: Vec<Step>,
    /// Origins, parallel to `steps`.
    pub origin_ids: Vec<SessionId>,
    /// Document version after the last step.
    pub version: u64,
}

impl From<StepLog> for StepsResponse {
    fn from(log: StepLog) -> Self {
        StepsResponse::new(log.steps, log.origin_ids, log.version)
    }
}

/// Result of a guarded commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The batch was appended.
    Committed {
        /// Version after the append.
        version: u64,
    },
    /// The expected version was stale. Carries everything committed since
    /// the expected version (or the whole log if the expected version is
    /// past the end).
    Conflict(StepLog),
}

/// The ordered steps of one document.
///
/// Invariant: `version() == entries.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLog {
    entries: Vec<CommittedStep>,
}

impl DocumentLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a log from already committed entries.
    pub fn from_entries(entries: Vec<CommittedStep>) -> Self {
        Self { entries }
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.entries.len() as u64
    }

    /// All committed entries.
    pub fn entries(&self) -> &[CommittedStep] {
        &self.entries
    }

    /// Returns everything committed after `since`.
    pub fn read(&self, since: u64) -> StoreResult<StepLog> {
        let current = self.version();
        if since > current {
            return Err(StoreError::OutOfRangeVersion {
                requested: since,
                current,
            });
        }
        Ok(self.tail(since))
    }

    fn tail(&self, since: u64) -> StepLog {
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(self.entries.len());
        let tail = &self.entries[start..];
        StepLog {
            steps: tail.iter().map(|e| e.step.clone()).collect(),
            origin_ids: tail.iter().map(|e| e.origin.clone()).collect(),
            version: self.version(),
        }
    }

    /// Decides whether a batch may be appended at `expected`.
    ///
    /// Returns `Ok(None)` when the batch may go ahead, or the conflict tail.
    pub fn check(
        &self,
        expected: u64,
        steps: &[Step],
        origins: &[SessionId],
    ) -> StoreResult<Option<StepLog>> {
        if steps.len() != origins.len() {
            return Err(StoreError::InvalidBatch {
                steps: steps.len(),
                origins: origins.len(),
            });
        }
        if expected != self.version() {
            return Ok(Some(self.tail(expected)));
        }
        Ok(None)
    }

    /// Appends a batch that already passed [`check`](Self::check).
    pub fn append(&mut self, steps: Vec<Step>, origins: Vec<SessionId>) -> u64 {
        self.entries.extend(
            steps
                .into_iter()
                .zip(origins)
                .map(|(step, origin)| CommittedStep { step, origin }),
        );
        self.version()
    }

    /// Check-and-append in one call.
    pub fn commit(
        &mut self,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome> {
        if let Some(tail) = self.check(expected, &steps, &origins)? {
            return Ok(CommitOutcome::Conflict(tail));
        }
        let version = self.append(steps, origins);
        Ok(CommitOutcome::Committed { version })
    }

    /// Truncates to version 0.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(n: u64) -> Step {
        Step::new(json!({ "n": n }))
    }

    fn origin(name: &str) -> SessionId {
        SessionId::new(name)
    }

    #[test]
    fn empty_log() {
        let log = DocumentLog::new();
        assert_eq!(log.version(), 0);
        let read = log.read(0).unwrap();
        assert!(read.steps.is_empty());
        assert_eq!(read.version, 0);
    }

    #[test]
    fn commit_and_read_tail() {
        let mut log = DocumentLog::new();
        log.commit(0, vec![step(1), step(2)], vec![origin("a"), origin("a")])
            .unwrap();
        log.commit(2, vec![step(3)], vec![origin("b")]).unwrap();

        let tail = log.read(1).unwrap();
        assert_eq!(tail.steps, vec![step(2), step(3)]);
        assert_eq!(tail.origin_ids, vec![origin("a"), origin("b")]);
        assert_eq!(tail.version, 3);

        let at_end = log.read(3).unwrap();
        assert!(at_end.steps.is_empty());
        assert_eq!(at_end.version, 3);
    }

    #[test]
    fn read_past_end_fails() {
        let mut log = DocumentLog::new();
        log.commit(0, vec![step(1), step(2)], vec![origin("a"), origin("a")])
            .unwrap();
        assert!(matches!(
            log.read(5),
            Err(StoreError::OutOfRangeVersion {
                requested: 5,
                current: 2
            })
        ));
    }

    #[test]
    fn stale_commit_returns_tail_and_leaves_log_alone() {
        let mut log = DocumentLog::new();
        log.commit(0, vec![step(1)], vec![origin("a")]).unwrap();
        let before = log.clone();

        let outcome = log.commit(0, vec![step(2)], vec![origin("b")]).unwrap();
        match outcome {
            CommitOutcome::Conflict(tail) => {
                assert_eq!(tail.steps, vec![step(1)]);
                assert_eq!(tail.origin_ids, vec![origin("a")]);
                assert_eq!(tail.version, 1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(log, before);
    }

    #[test]
    fn future_expected_version_conflicts_with_empty_tail() {
        let mut log = DocumentLog::new();
        let outcome = log.commit(4, vec![step(1)], vec![origin("a")]).unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Conflict(StepLog {
                steps: vec![],
                origin_ids: vec![],
                version: 0
            })
        );
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let mut log = DocumentLog::new();
        let err = log.commit(0, vec![step(1), step(2)], vec![origin("a")]);
        assert!(matches!(err, Err(StoreError::InvalidBatch { .. })));
        assert_eq!(log.version(), 0);
    }

    #[test]
    fn empty_batch_is_a_no_op_commit() {
        let mut log = DocumentLog::new();
        let outcome = log.commit(0, vec![], vec![]).unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { version: 0 });
    }
}
