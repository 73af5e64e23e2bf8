//! Fault injection for step stores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stepsync_protocol::{DocId, SessionId, Step};
use stepsync_store::{CommitOutcome, StepLog, StepStore, StoreError, StoreResult};

/// A store wrapper that fails on demand.
///
/// While failing, every operation returns [`StoreError::Unavailable`]
/// without touching the inner store.
pub struct FaultyStore<S> {
    inner: S,
    failing: AtomicBool,
    fail_next: AtomicUsize,
    faults: AtomicUsize,
}

impl<S: StepStore> FaultyStore<S> {
    /// Wraps `inner`; initially healthy.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            faults: AtomicUsize::new(0),
        }
    }

    /// Fails every operation until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fails the next `n` operations.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of injected faults so far.
    pub fn faults(&self) -> usize {
        self.faults.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self) -> StoreResult<()> {
        let injected = self.failing.load(Ordering::SeqCst)
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if injected {
            self.faults.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::unavailable("injected fault"));
        }
        Ok(())
    }
}

impl<S: StepStore> StepStore for FaultyStore<S> {
    fn read(&self, doc: &DocId, since: u64) -> StoreResult<StepLog> {
        self.check()?;
        self.inner.read(doc, since)
    }

    fn commit_if_version_matches(
        &self,
        doc: &DocId,
        expected: u64,
        steps: Vec<Step>,
        origins: Vec<SessionId>,
    ) -> StoreResult<CommitOutcome> {
        self.check()?;
        self.inner
            .commit_if_version_matches(doc, expected, steps, origins)
    }

    fn reset(&self, doc: &DocId) -> StoreResult<()> {
        self.check()?;
        self.inner.reset(doc)
    }

    fn version(&self, doc: &DocId) -> StoreResult<u64> {
        self.check()?;
        self.inner.version(doc)
    }
}
