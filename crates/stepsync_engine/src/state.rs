//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::session::{ClientSession, Received};
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use stepsync_protocol::{
    DocId, PostStepsResponse, ResetResponse, SessionId, Step, StepTransform, StepsResponse,
};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// Requesting steps since the confirmed version.
    Fetching,
    /// Merging a fetched or conflict tail into local state.
    Rebasing,
    /// Submitting unconfirmed steps.
    Pushing,
    /// The session was closed.
    Closed,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Fetching | SyncState::Rebasing | SyncState::Pushing
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that finished without error.
    pub cycles_completed: u64,
    /// Cycles that ended in an error.
    pub cycles_failed: u64,
    /// Foreign steps applied.
    pub steps_fetched: u64,
    /// Own steps committed.
    pub steps_pushed: u64,
    /// Own steps acknowledged from a fetched tail.
    pub steps_acknowledged: u64,
    /// Pushes rejected with a version conflict.
    pub conflicts: u64,
    /// Local resets caused by the server's history shrinking.
    pub resets: u64,
    /// Last cycle that finished without error.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCycleResult {
    /// Foreign steps applied (fetch and conflict tail).
    pub fetched: usize,
    /// Own steps acknowledged from a tail.
    pub acknowledged: usize,
    /// Own steps committed by the push.
    pub pushed: usize,
    /// Whether the push was rejected with a conflict.
    pub conflict: bool,
    /// Whether local state was reset because the server's history shrank.
    pub reset: bool,
    /// Confirmed version at the end of the cycle.
    pub version: u64,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    fn absorb(&mut self, received: Received) {
        self.fetched += received.applied;
        self.acknowledged += received.acknowledged;
    }
}

/// Releases the single-flight flag on drop.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The sync engine keeps one document session in step with the server.
///
/// Local edits are applied synchronously and buffered. [`sync_cycle`]
/// fetches what others committed, rebases the buffer over it and pushes the
/// buffer. At most one cycle runs at a time; a second caller gets
/// [`SyncError::CycleInProgress`].
///
/// [`sync_cycle`]: SyncEngine::sync_cycle
pub struct SyncEngine<T: StepTransform, X: SyncTransport> {
    config: SyncConfig,
    transport: X,
    session: Mutex<ClientSession<T>>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
    closed: AtomicBool,
}

impl<T: StepTransform, X: SyncTransport> SyncEngine<T, X> {
    /// Creates a new sync engine for an empty document at version 0.
    pub fn new(config: SyncConfig, transform: T, transport: X) -> Self {
        let session = ClientSession::new(transform, config.session_id.clone());
        Self {
            config,
            transport,
            session: Mutex::new(session),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Document this engine syncs.
    pub fn doc_id(&self) -> &DocId {
        &self.config.doc_id
    }

    /// Origin id of this session.
    pub fn session_id(&self) -> &SessionId {
        &self.config.session_id
    }

    /// Snapshot of the local document.
    pub fn document(&self) -> T::Doc {
        self.session.lock().document().clone()
    }

    /// Last server version fully incorporated.
    pub fn confirmed_version(&self) -> u64 {
        self.session.lock().confirmed_version()
    }

    /// Number of local steps waiting for acknowledgement.
    pub fn unconfirmed_len(&self) -> usize {
        self.session.lock().unconfirmed().len()
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Applies a local edit immediately and buffers it. Never touches the
    /// network.
    pub fn local_edit(&self, step: Step) -> SyncResult<()> {
        self.check_open()?;
        self.session.lock().apply_local(step)?;
        Ok(())
    }

    /// Runs one fetch-then-push cycle.
    ///
    /// A push conflict merges the returned tail and keeps the local steps
    /// for the next cycle; there is no retry within a cycle.
    pub async fn sync_cycle(&self) -> SyncResult<SyncCycleResult> {
        self.check_open()?;
        let _guard = CycleGuard::acquire(&self.in_flight).ok_or(SyncError::CycleInProgress)?;
        let start = Instant::now();

        let outcome = self.run_cycle().await;
        if !self.is_closed() {
            self.set_state(SyncState::Idle);
        }

        let mut stats = self.stats.write();
        match outcome {
            Ok(mut result) => {
                result.duration = start.elapsed();
                stats.cycles_completed += 1;
                stats.steps_fetched += result.fetched as u64;
                stats.steps_acknowledged += result.acknowledged as u64;
                stats.steps_pushed += result.pushed as u64;
                stats.conflicts += u64::from(result.conflict);
                stats.resets += u64::from(result.reset);
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                debug!(doc = %self.config.doc_id, ?result, "sync cycle finished");
                Ok(result)
            }
            Err(e) => {
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_cycle(&self) -> SyncResult<SyncCycleResult> {
        let mut result = SyncCycleResult::default();
        let doc = &self.config.doc_id;

        self.set_state(SyncState::Fetching);
        let since = self.session.lock().confirmed_version();
        let fetched = match self.call(self.transport.get_steps(doc, since)).await {
            Err(SyncError::OutOfRangeVersion { requested, current }) => {
                self.check_open()?;
                warn!(%doc, requested, current, "server history shrank, refetching from 0");
                self.session.lock().reset();
                result.reset = true;
                self.call(self.transport.get_steps(doc, 0)).await?
            }
            other => other?,
        };
        self.check_open()?;
        if !fetched.is_empty() {
            self.set_state(SyncState::Rebasing);
        }
        result.absorb(self.incorporate(&fetched)?);

        let sendable = self.session.lock().sendable();
        let Some(request) = sendable else {
            result.version = self.confirmed_version();
            return Ok(result);
        };

        self.set_state(SyncState::Pushing);
        let count = request.steps.len();
        let response = self.call(self.transport.post_steps(doc, &request)).await?;
        self.check_open()?;
        match response {
            PostStepsResponse::Accepted { version } => {
                self.session.lock().confirm(count, version)?;
                result.pushed = count;
                debug!(%doc, count, version, "push accepted");
            }
            PostStepsResponse::Conflict(tail) => {
                result.conflict = true;
                self.set_state(SyncState::Rebasing);
                if tail.version < request.base_version {
                    warn!(%doc, base = request.base_version, current = tail.version, "server history shrank during push");
                    self.session.lock().reset();
                    result.reset = true;
                } else {
                    result.absorb(self.incorporate(&tail)?);
                }
                info!(%doc, base = request.base_version, current = tail.version, "push conflict, rebased");
            }
        }

        result.version = self.confirmed_version();
        Ok(result)
    }

    /// Merges a tail that must start at the confirmed version.
    fn incorporate(&self, tail: &StepsResponse) -> SyncResult<Received> {
        let mut session = self.session.lock();
        if tail.base_version() != session.confirmed_version() {
            return Err(SyncError::Protocol(format!(
                "tail of {} steps ending at {} does not start at confirmed version {}",
                tail.steps.len(),
                tail.version,
                session.confirmed_version()
            )));
        }
        Ok(session.receive(&tail.steps, &tail.origin_ids, tail.version)?)
    }

    /// Resets the document on the server and locally.
    ///
    /// Unconfirmed local steps are discarded, as are concurrent edits of
    /// every other session.
    pub async fn reset_document(&self) -> SyncResult<ResetResponse> {
        self.check_open()?;
        let _guard = CycleGuard::acquire(&self.in_flight).ok_or(SyncError::CycleInProgress)?;

        let response = self
            .call(self.transport.reset(&self.config.doc_id))
            .await?;
        self.check_open()?;
        self.session.lock().reset();
        info!(doc = %self.config.doc_id, "document reset");
        Ok(response)
    }

    /// Closes the session and discards unconfirmed state.
    ///
    /// A cycle still in flight finishes its network call and then drops the
    /// result.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.session.lock().reset();
        self.set_state(SyncState::Closed);
        info!(doc = %self.config.doc_id, "session closed");
    }

    fn check_open(&self) -> SyncResult<()> {
        if self.is_closed() {
            Err(SyncError::Closed)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    async fn call<F, R>(&self, request: F) -> SyncResult<R>
    where
        F: Future<Output = SyncResult<R>>,
    {
        tokio::time::timeout(self.config.request_timeout, request)
            .await
            .map_err(|_| SyncError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::Arc;
    use stepsync_testkit::PlainText;

    fn engine(transport: Arc<MockTransport>) -> SyncEngine<PlainText, Arc<MockTransport>> {
        let config = SyncConfig::new(DocId::new("doc1").unwrap())
            .with_session_id(SessionId::new("me"))
            .with_request_timeout(Duration::from_secs(1));
        SyncEngine::new(config, PlainText, transport)
    }

    fn tail(steps: Vec<Step>, origin: &str, version: u64) -> StepsResponse {
        let origins = vec![SessionId::new(origin); steps.len()];
        StepsResponse::new(steps, origins, version)
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Fetching.is_active());
        assert!(SyncState::Pushing.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Closed.is_active());
    }

    #[tokio::test]
    async fn empty_cycle_is_a_no_op() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_get(Ok(tail(vec![], "x", 0)));
        let engine = engine(Arc::clone(&transport));

        let result = engine.sync_cycle().await.unwrap();
        assert_eq!(result.fetched, 0);
        assert_eq!(result.pushed, 0);
        assert!(transport.posts().is_empty());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 1);
    }

    #[tokio::test]
    async fn fetch_then_push() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_get(Ok(tail(vec![PlainText::insert(0, "a")], "other", 1)));
        transport.queue_post(Ok(PostStepsResponse::Accepted { version: 2 }));
        let engine = engine(Arc::clone(&transport));
        engine.local_edit(PlainText::insert(0, "b")).unwrap();

        let result = engine.sync_cycle().await.unwrap();
        assert_eq!(result.fetched, 1);
        assert_eq!(result.pushed, 1);
        assert_eq!(result.version, 2);

        let posts = transport.posts();
        assert_eq!(posts[0].base_version, 1);
        assert_eq!(posts[0].steps, vec![PlainText::insert(1, "b")]);
        assert_eq!(engine.document(), "ab");
        assert_eq!(engine.unconfirmed_len(), 0);
    }

    #[tokio::test]
    async fn conflict_keeps_steps_for_next_cycle() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_get(Ok(tail(vec![], "x", 0)));
        transport.queue_post(Ok(PostStepsResponse::Conflict(
            tail(vec![PlainText::insert(0, "a")], "other", 1).into_conflict(),
        )));
        let engine = engine(Arc::clone(&transport));
        engine.local_edit(PlainText::insert(0, "b")).unwrap();

        let result = engine.sync_cycle().await.unwrap();
        assert!(result.conflict);
        assert_eq!(result.pushed, 0);
        assert_eq!(engine.confirmed_version(), 1);
        assert_eq!(engine.unconfirmed_len(), 1);
        assert_eq!(engine.document(), "ab");
        assert_eq!(transport.posts().len(), 1);
        assert_eq!(engine.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn out_of_range_resets_and_refetches() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_get(Ok(tail(vec![PlainText::insert(0, "abc")], "other", 1)));
        let engine = engine(Arc::clone(&transport));
        engine.sync_cycle().await.unwrap();
        engine.local_edit(PlainText::insert(0, "local")).unwrap();

        transport.queue_get(Err(SyncError::OutOfRangeVersion {
            requested: 1,
            current: 0,
        }));
        transport.queue_get(Ok(tail(vec![], "x", 0)));

        let result = engine.sync_cycle().await.unwrap();
        assert!(result.reset);
        assert_eq!(transport.fetches(), vec![0, 1, 0]);
        assert_eq!(engine.document(), "");
        assert_eq!(engine.unconfirmed_len(), 0);
        assert_eq!(engine.confirmed_version(), 0);
    }

    #[tokio::test]
    async fn network_failure_is_not_fatal() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let engine = engine(Arc::clone(&transport));
        engine.local_edit(PlainText::insert(0, "x")).unwrap();

        let err = engine.sync_cycle().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.unconfirmed_len(), 1);
        assert_eq!(engine.stats().cycles_failed, 1);

        transport.set_connected(true);
        transport.queue_get(Ok(tail(vec![], "x", 0)));
        transport.queue_post(Ok(PostStepsResponse::Accepted { version: 1 }));
        engine.sync_cycle().await.unwrap();
        assert_eq!(engine.unconfirmed_len(), 0);
        assert!(engine.stats().last_error.is_none());
    }

    #[tokio::test]
    async fn misaligned_tail_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_get(Ok(tail(vec![PlainText::insert(0, "a")], "other", 5)));
        let engine = engine(Arc::clone(&transport));

        let err = engine.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert_eq!(engine.confirmed_version(), 0);
    }

    #[tokio::test]
    async fn unmergeable_tail_preserves_local_edits() {
        let transport = Arc::new(MockTransport::new());
        let bad = Step::new(serde_json::json!({ "op": "bogus" }));
        transport.queue_get(Ok(tail(vec![bad], "other", 1)));
        let engine = engine(Arc::clone(&transport));
        engine.local_edit(PlainText::insert(0, "keep")).unwrap();

        let err = engine.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::Transform(_)));
        assert!(err.to_string().starts_with("edit could not be merged"));
        assert_eq!(engine.document(), "keep");
        assert_eq!(engine.unconfirmed_len(), 1);
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn closed_engine_refuses_work() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(Arc::clone(&transport));
        engine.local_edit(PlainText::insert(0, "x")).unwrap();
        engine.close();

        assert_eq!(engine.state(), SyncState::Closed);
        assert_eq!(engine.unconfirmed_len(), 0);
        assert!(matches!(engine.sync_cycle().await, Err(SyncError::Closed)));
        assert!(matches!(
            engine.local_edit(PlainText::insert(0, "y")),
            Err(SyncError::Closed)
        ));
    }

    #[tokio::test]
    async fn reset_document_clears_local_state() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(Arc::clone(&transport));
        engine.local_edit(PlainText::insert(0, "x")).unwrap();

        let response = engine.reset_document().await.unwrap();
        assert_eq!(response, ResetResponse::default());
        assert_eq!(transport.resets(), 1);
        assert_eq!(engine.document(), "");
        assert_eq!(engine.unconfirmed_len(), 0);
    }
}
