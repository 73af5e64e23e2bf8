//! Transport layer abstraction for the collab endpoints.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stepsync_protocol::{
    DocId, PostStepsRequest, PostStepsResponse, ResetResponse, StepsResponse,
};

/// A sync transport carries the three protocol calls to a server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing). The
/// engine wraps every call in its own timeout, so implementations do not
/// need one.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetches the steps committed after `since`.
    async fn get_steps(&self, doc: &DocId, since: u64) -> SyncResult<StepsResponse>;

    /// Pushes a batch; a stale base comes back as
    /// [`PostStepsResponse::Conflict`], not as an error.
    async fn post_steps(
        &self,
        doc: &DocId,
        request: &PostStepsRequest,
    ) -> SyncResult<PostStepsResponse>;

    /// Truncates the document on the server.
    async fn reset(&self, doc: &DocId) -> SyncResult<ResetResponse>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn get_steps(&self, doc: &DocId, since: u64) -> SyncResult<StepsResponse> {
        (**self).get_steps(doc, since).await
    }

    async fn post_steps(
        &self,
        doc: &DocId,
        request: &PostStepsRequest,
    ) -> SyncResult<PostStepsResponse> {
        (**self).post_steps(doc, request).await
    }

    async fn reset(&self, doc: &DocId) -> SyncResult<ResetResponse> {
        (**self).reset(doc).await
    }
}

/// A scripted transport for testing.
///
/// Responses are queued per endpoint and consumed in order. Every request
/// is recorded.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    delay: Mutex<Option<Duration>>,
    get_responses: Mutex<VecDeque<SyncResult<StepsResponse>>>,
    post_responses: Mutex<VecDeque<SyncResult<PostStepsResponse>>>,
    fetches: Mutex<Vec<u64>>,
    posts: Mutex<Vec<PostStepsRequest>>,
    resets: Mutex<usize>,
}

impl MockTransport {
    /// Creates a connected mock with nothing queued.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues the result of the next `get_steps`.
    pub fn queue_get(&self, response: SyncResult<StepsResponse>) {
        self.get_responses.lock().push_back(response);
    }

    /// Queues the result of the next `post_steps`.
    pub fn queue_post(&self, response: SyncResult<PostStepsResponse>) {
        self.post_responses.lock().push_back(response);
    }

    /// Delays every call by `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Sets the connected state; a disconnected mock fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Versions requested by `get_steps`, in order.
    pub fn fetches(&self) -> Vec<u64> {
        self.fetches.lock().clone()
    }

    /// Requests received by `post_steps`, in order.
    pub fn posts(&self) -> Vec<PostStepsRequest> {
        self.posts.lock().clone()
    }

    /// Number of resets received.
    pub fn resets(&self) -> usize {
        *self.resets.lock()
    }

    async fn enter(&self) -> SyncResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn get_steps(&self, _doc: &DocId, since: u64) -> SyncResult<StepsResponse> {
        self.fetches.lock().push(since);
        self.enter().await?;
        self.get_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock get response queued".into())))
    }

    async fn post_steps(
        &self,
        _doc: &DocId,
        request: &PostStepsRequest,
    ) -> SyncResult<PostStepsResponse> {
        self.posts.lock().push(request.clone());
        self.enter().await?;
        self.post_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock post response queued".into())))
    }

    async fn reset(&self, _doc: &DocId) -> SyncResult<ResetResponse> {
        *self.resets.lock() += 1;
        self.enter().await?;
        Ok(ResetResponse::default())
    }
}
